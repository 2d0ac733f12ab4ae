//! Shared helpers for the integration suite: install directory fixtures,
//! package builders, and release servers.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use updraft::config::UpdaterConfig;
use updraft::test_utils::{RecordingReporter, write_file};
use updraft::upgrade::{InstallLayout, UpdateOrchestrator};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const OWNER: &str = "acme";
pub const REPO: &str = "widget";

/// An install directory with updraft in its `updater/` subdirectory, plus a
/// scratch directory that receives the per-run workspaces.
pub struct TestInstall {
    _root: TempDir,
    pub install: PathBuf,
    pub scratch: PathBuf,
}

impl TestInstall {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let install = root.path().join("install");
        let scratch = root.path().join("scratch");
        std::fs::create_dir_all(&scratch).unwrap();
        write_file(&install, "updater/updraft", "updater binary");
        write_file(&install, "updater/updraft.toml", "[repository]\n");
        Self {
            _root: root,
            install,
            scratch,
        }
    }

    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) {
        write_file(&self.install, relative, content);
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.install.join(relative)
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path(relative)).unwrap()
    }

    pub fn orchestrator(&self) -> (UpdateOrchestrator, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        let layout = InstallLayout::new(&self.install, &self.install.join("updater/updraft"));
        let orchestrator =
            UpdateOrchestrator::new(layout, reporter.clone()).with_workspace_parent(&self.scratch);
        (orchestrator, reporter)
    }

    /// Workspaces left behind in the scratch directory.
    pub fn leftover_workspaces(&self) -> usize {
        std::fs::read_dir(&self.scratch).unwrap().count()
    }
}

/// Config pointing at `api_url` for `acme/widget`.
pub fn config_for(api_url: &str) -> UpdaterConfig {
    let mut config = UpdaterConfig::default();
    config.repository.owner = OWNER.into();
    config.repository.name = REPO.into();
    config.repository.api_url = api_url.to_string();
    config.target.executable = "app.exe".into();
    config
}

/// Builds an uncompressed zip in memory, so package size tracks content size.
/// Names ending in `/` become directory entries.
pub fn zip_package(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Publishes `tag` with one asset whose download URL is `download_url`.
pub async fn mount_release(
    server: &MockServer,
    tag: &str,
    asset_name: &str,
    download_url: &str,
    size: usize,
) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/{OWNER}/{REPO}/releases/latest")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tag_name": tag,
            "assets": [
                {"name": "release-notes.md", "browser_download_url": format!("{}/notes", server.uri()), "size": 12},
                {"name": asset_name, "browser_download_url": download_url, "size": size}
            ]
        })))
        .mount(server)
        .await;
}

/// Publishes `tag` with `package` served by the same mock server.
pub async fn publish(server: &MockServer, tag: &str, asset_name: &str, package: Vec<u8>) {
    let url = format!("{}/download/{asset_name}", server.uri());
    mount_release(server, tag, asset_name, &url, package.len()).await;
    Mock::given(method("GET"))
        .and(path(format!("/download/{asset_name}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(package))
        .mount(server)
        .await;
}

/// Serves `head` followed by `body` to every connection, then closes it.
///
/// Lets tests send responses a well-behaved server never would: bodies cut
/// short of their `Content-Length`, or bodies with no length at all.
pub async fn serve_raw(head: String, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = Arc::new(body);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let head = head.clone();
            let body = Arc::clone(&body);
            tokio::spawn(async move {
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.flush().await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}/package.zip")
}

/// Declares the full length of `package` but sends only its first half.
pub async fn serve_truncated(package: &[u8]) -> String {
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        package.len()
    );
    serve_raw(head, package[..package.len() / 2].to_vec()).await
}

/// Sends `package` with no `Content-Length`, delimited by connection close.
pub async fn serve_without_length(package: &[u8]) -> String {
    let head =
        "HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nConnection: close\r\n\r\n".to_string();
    serve_raw(head, package.to_vec()).await
}

/// Writes an `updraft.toml` for `api_url` into `dir`.
pub fn write_config(dir: &Path, api_url: &str, extra: &str) -> PathBuf {
    let path = dir.join("test-updraft.toml");
    let content = format!(
        "[repository]\nowner = \"{OWNER}\"\nname = \"{REPO}\"\napi_url = \"{api_url}\"\n\n[target]\nexecutable = \"app.exe\"\n{extra}"
    );
    std::fs::write(&path, content).unwrap();
    path
}
