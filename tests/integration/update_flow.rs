use crate::common::{
    TestInstall, config_for, mount_release, publish, serve_truncated, serve_without_length,
    zip_package,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use updraft::test_utils::{RecordingReporter, init_test_logging, snapshot};
use updraft::upgrade::{
    InstallLayout, Progress, UpdateOrchestrator, UpdateReporter, UpdateState, Version,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn release_package() -> Vec<u8> {
    let helper = vec![0x5a_u8; 300 * 1024];
    zip_package(&[
        ("app.exe", b"app v1.1"),
        ("app.dll", b"app library v1.1"),
        ("lib/", b""),
        ("lib/helper.dll", &helper),
    ])
}

fn seed_install(install: &TestInstall) {
    install.write("version.txt", "1.0.0.0\n");
    install.write("app.exe", "app v1.0");
    install.write("app.dll", "app library v1.0");
    install.write("lib/helper.dll", "helper v1.0");
    install.write("old.dll", "obsolete");
    install.write("config.json", "{\"server\":\"prod\"}");
    install.write("backup/2024-01-01.bak", "operator backup");
    install.write("downloads/cache.bin", "cached");
}

#[tokio::test]
async fn test_update_replaces_files_and_preserves_protected_data() {
    init_test_logging(None);
    let install = TestInstall::new();
    seed_install(&install);
    let server = MockServer::start().await;
    publish(&server, "v1.1.0", "app-1.1.0.zip", release_package()).await;

    let (orchestrator, reporter) = install.orchestrator();

    let outcome = orchestrator
        .perform_update(&config_for(&server.uri()), &CancellationToken::new())
        .await;

    assert!(outcome.succeeded, "statuses: {:?}", reporter.statuses());
    assert_eq!(outcome.old_version, Version::new(1, 0, 0, 0));
    assert_eq!(outcome.new_version, Version::new(1, 1, 0, 0));

    assert_eq!(install.read("app.exe"), "app v1.1");
    assert_eq!(install.read("app.dll"), "app library v1.1");
    assert_eq!(std::fs::read(install.path("lib/helper.dll")).unwrap().len(), 300 * 1024);
    assert!(!install.path("old.dll").exists());

    assert_eq!(install.read("config.json"), "{\"server\":\"prod\"}");
    assert_eq!(install.read("backup/2024-01-01.bak"), "operator backup");
    assert_eq!(install.read("downloads/cache.bin"), "cached");
    assert_eq!(install.read("updater/updraft"), "updater binary");

    assert_eq!(install.leftover_workspaces(), 0);
    assert_eq!(reporter.states().last(), Some(&UpdateState::Succeeded));
}

#[tokio::test]
async fn test_interrupted_download_restores_install_byte_identical() {
    let install = TestInstall::new();
    seed_install(&install);
    let before = snapshot(&install.install);

    let package = release_package();
    let download_url = serve_truncated(&package).await;
    let server = MockServer::start().await;
    mount_release(&server, "v1.1.0", "app-1.1.0.zip", &download_url, package.len()).await;

    let (orchestrator, reporter) = install.orchestrator();
    let outcome = orchestrator
        .perform_update(&config_for(&server.uri()), &CancellationToken::new())
        .await;

    assert!(!outcome.succeeded);
    assert_eq!(outcome.old_version, Version::new(1, 0, 0, 0));
    assert_eq!(outcome.new_version, Version::new(1, 1, 0, 0));
    assert_eq!(snapshot(&install.install), before);
    assert_eq!(install.leftover_workspaces(), 0);

    let states = reporter.states();
    assert!(states.contains(&UpdateState::Downloading));
    assert_eq!(&states[states.len() - 2..], &[UpdateState::RollingBack, UpdateState::Failed]);
}

#[tokio::test]
async fn test_download_without_content_length_is_indeterminate() {
    let install = TestInstall::new();
    seed_install(&install);

    let package = release_package();
    let download_url = serve_without_length(&package).await;
    let server = MockServer::start().await;
    mount_release(&server, "v1.1.0", "app-1.1.0.zip", &download_url, package.len()).await;

    let (orchestrator, reporter) = install.orchestrator();
    let outcome = orchestrator
        .perform_update(&config_for(&server.uri()), &CancellationToken::new())
        .await;
    assert!(outcome.succeeded, "statuses: {:?}", reporter.statuses());

    let progress = reporter.progress_reports();
    let indeterminate: Vec<&Progress> = progress.iter().filter(|p| p.is_indeterminate()).collect();
    assert!(!indeterminate.is_empty());
    for report in &indeterminate {
        let detail = report.detail.as_deref().unwrap_or_default();
        assert!(detail.ends_with("downloaded"), "unexpected detail {detail:?}");
    }
    // Nothing in the download range: without a total there is no percentage.
    assert!(
        progress
            .iter()
            .all(|p| p.is_indeterminate() || p.percent < 15.0 || p.percent > 75.0)
    );
}

#[tokio::test]
async fn test_known_length_download_reports_byte_counts() {
    let install = TestInstall::new();
    seed_install(&install);
    let server = MockServer::start().await;
    publish(&server, "v1.1.0", "app-1.1.0.zip", release_package()).await;

    let (orchestrator, reporter) = install.orchestrator();
    let outcome = orchestrator
        .perform_update(&config_for(&server.uri()), &CancellationToken::new())
        .await;
    assert!(outcome.succeeded);

    let downloads: Vec<Progress> = reporter
        .progress_reports()
        .into_iter()
        .filter(|p| (15.0..=75.0).contains(&p.percent))
        .collect();
    assert!(downloads.len() >= 2, "package spans several chunks");
    assert!(downloads.iter().all(|p| p.detail.as_deref().is_some_and(|d| d.contains(" / "))));
    assert!((downloads.last().unwrap().percent - 75.0).abs() < f64::EPSILON);
}

/// Cancels the run as soon as the orchestrator reaches `at`.
struct CancelAt {
    at: UpdateState,
    token: CancellationToken,
    inner: RecordingReporter,
}

impl UpdateReporter for CancelAt {
    fn log(&self, message: &str) {
        self.inner.log(message);
    }

    fn status(&self, message: &str) {
        self.inner.status(message);
    }

    fn progress(&self, progress: Progress) {
        self.inner.progress(progress);
    }

    fn state(&self, state: UpdateState) {
        if state == self.at {
            self.token.cancel();
        }
        self.inner.state(state);
    }
}

fn cancelling_orchestrator(
    install: &TestInstall,
    at: UpdateState,
) -> (UpdateOrchestrator, Arc<CancelAt>, CancellationToken) {
    let token = CancellationToken::new();
    let reporter = Arc::new(CancelAt {
        at,
        token: token.clone(),
        inner: RecordingReporter::default(),
    });
    let layout = InstallLayout::new(&install.install, &install.path("updater/updraft"));
    let orchestrator =
        UpdateOrchestrator::new(layout, reporter.clone()).with_workspace_parent(&install.scratch);
    (orchestrator, reporter, token)
}

#[tokio::test]
async fn test_cancellation_during_download_restores_backup() {
    let install = TestInstall::new();
    seed_install(&install);
    let before = snapshot(&install.install);
    let server = MockServer::start().await;
    publish(&server, "v1.1.0", "app-1.1.0.zip", release_package()).await;

    let (orchestrator, reporter, token) =
        cancelling_orchestrator(&install, UpdateState::Downloading);
    let outcome = orchestrator.perform_update(&config_for(&server.uri()), &token).await;

    assert!(!outcome.succeeded);
    assert_eq!(snapshot(&install.install), before);
    assert_eq!(install.leftover_workspaces(), 0);
    assert!(reporter.inner.statuses().iter().any(|s| s == "Update cancelled"));
    assert!(reporter.inner.states().contains(&UpdateState::RollingBack));
}

#[tokio::test]
async fn test_cancellation_interrupts_apply_and_restores_backup() {
    let install = TestInstall::new();
    seed_install(&install);
    let before = snapshot(&install.install);
    let server = MockServer::start().await;
    publish(&server, "v1.1.0", "app-1.1.0.zip", release_package()).await;

    let (orchestrator, reporter, token) = cancelling_orchestrator(&install, UpdateState::Applying);
    let outcome = orchestrator.perform_update(&config_for(&server.uri()), &token).await;

    assert!(!outcome.succeeded);
    assert_eq!(snapshot(&install.install), before);
    let logs = reporter.inner.logs();
    assert!(!logs.iter().any(|l| l.starts_with("Installed")), "apply finished: {logs:?}");
    assert!(logs.iter().any(|l| l.starts_with("Restored")));
    assert!(!reporter.inner.states().contains(&UpdateState::Purging));
}

#[tokio::test]
async fn test_cancellation_during_backup_leaves_install_untouched() {
    let install = TestInstall::new();
    seed_install(&install);
    let before = snapshot(&install.install);
    let server = MockServer::start().await;
    publish(&server, "v1.1.0", "app-1.1.0.zip", release_package()).await;

    let (orchestrator, reporter, token) = cancelling_orchestrator(&install, UpdateState::BackingUp);
    let outcome = orchestrator.perform_update(&config_for(&server.uri()), &token).await;

    assert!(!outcome.succeeded);
    assert_eq!(snapshot(&install.install), before);
    assert_eq!(install.leftover_workspaces(), 0);
    assert!(!reporter.inner.logs().iter().any(|l| l.starts_with("Backed up")));
    assert!(!reporter.inner.states().contains(&UpdateState::Cleaning));
    assert!(!reporter.inner.states().contains(&UpdateState::RollingBack));
}

#[tokio::test]
async fn test_package_escaping_install_dir_is_rejected() {
    let install = TestInstall::new();
    seed_install(&install);
    let before = snapshot(&install.install);
    let server = MockServer::start().await;
    publish(
        &server,
        "v1.1.0",
        "app-1.1.0.zip",
        zip_package(&[("app.exe", b"v1.1"), ("../../escaped.txt", b"outside")]),
    )
    .await;

    let (orchestrator, reporter) = install.orchestrator();
    let outcome = orchestrator
        .perform_update(&config_for(&server.uri()), &CancellationToken::new())
        .await;

    assert!(!outcome.succeeded);
    assert_eq!(snapshot(&install.install), before);
    assert!(!install.scratch.join("escaped.txt").exists());
    assert!(reporter.statuses().iter().any(|s| s.contains("escapes")));
}

#[tokio::test]
async fn test_failed_check_touches_nothing() {
    let install = TestInstall::new();
    seed_install(&install);
    let before = snapshot(&install.install);
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/releases/latest"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (orchestrator, reporter) = install.orchestrator();
    let outcome = orchestrator
        .perform_update(&config_for(&server.uri()), &CancellationToken::new())
        .await;

    assert!(!outcome.succeeded);
    assert_eq!(outcome.old_version, Version::new(1, 0, 0, 0));
    assert_eq!(outcome.new_version, Version::ZERO);
    assert_eq!(snapshot(&install.install), before);
    assert_eq!(install.leftover_workspaces(), 0);
    assert_eq!(reporter.states(), vec![UpdateState::Checking, UpdateState::Failed]);
}

#[tokio::test]
async fn test_config_changes_apply_on_next_call() {
    let install = TestInstall::new();
    seed_install(&install);
    let server = MockServer::start().await;
    publish(&server, "v1.1.0", "app-1.1.0.zip", release_package()).await;
    let (orchestrator, _reporter) = install.orchestrator();

    let mut config = config_for(&server.uri());
    config.repository.asset_filter = "linux".into();
    assert!(!orchestrator.check_for_updates(&config).await.succeeded);

    config.repository.asset_filter = "APP-1.1".into();
    let result = orchestrator.check_for_updates(&config).await;
    assert!(result.update_available());
    assert_eq!(result.asset_name.as_deref(), Some("app-1.1.0.zip"));
    assert_eq!(result.expected_size_bytes, release_package().len() as u64);
}
