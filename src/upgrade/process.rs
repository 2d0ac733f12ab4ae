//! Stopping the target application before its files are replaced, and starting
//! it again afterwards.
//!
//! Nothing here can fail an update: a process that refuses to die only shows up
//! later as a locked file, which the orchestrator already rolls back from.

use std::collections::HashSet;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use sysinfo::{Pid, Process, Signal, System};
use tracing::{debug, info, warn};

/// How long a process gets to exit after a graceful shutdown request.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Whether a running process' name matches the configured process name.
///
/// `App` matches `App`, `app` and `App.exe`.
fn name_matches(process_name: &str, wanted: &str) -> bool {
    let candidate = process_name.to_lowercase();
    let wanted = wanted.to_lowercase();
    candidate == wanted || candidate.strip_suffix(".exe") == Some(wanted.as_str())
}

/// Every descendant of `root`, children before grandchildren.
fn descendants(system: &System, root: Pid) -> Vec<Pid> {
    let mut found = Vec::new();
    let mut frontier = vec![root];
    let mut seen: HashSet<Pid> = HashSet::from([root]);

    while let Some(parent) = frontier.pop() {
        for (pid, process) in system.processes() {
            if process.parent() == Some(parent) && seen.insert(*pid) {
                found.push(*pid);
                frontier.push(*pid);
            }
        }
    }
    found
}

fn request_shutdown(process: &Process) -> bool {
    // Windows has no SIGTERM; kill_with returns None there and we go straight
    // to the forced path after the wait.
    process.kill_with(Signal::Term).unwrap_or(false)
}

async fn wait_for_exit(system: &mut System, pid: Pid, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if !system.refresh_process(pid) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Stops every process called `process_name`, together with its child processes.
///
/// Each match is first asked to terminate, given [`SHUTDOWN_TIMEOUT`] to exit,
/// and then killed along with its descendants. The updater's own process is
/// never touched. Returns how many matching processes were found.
pub async fn stop_by_name(process_name: &str) -> usize {
    stop_by_name_with_timeout(process_name, SHUTDOWN_TIMEOUT).await
}

pub async fn stop_by_name_with_timeout(process_name: &str, timeout: Duration) -> usize {
    let name = process_name.trim();
    if name.is_empty() {
        debug!("No target process configured, nothing to stop");
        return 0;
    }

    let mut system = System::new();
    system.refresh_processes();

    let own_pid = Pid::from_u32(std::process::id());
    let targets: Vec<Pid> = system
        .processes()
        .iter()
        .filter(|(pid, process)| **pid != own_pid && name_matches(process.name(), name))
        .map(|(pid, _)| *pid)
        .collect();

    if targets.is_empty() {
        debug!("No running process named '{}'", name);
        return 0;
    }

    info!("Stopping {} instance(s) of '{}'", targets.len(), name);
    for pid in &targets {
        let Some(process) = system.process(*pid) else {
            continue;
        };
        let graceful = request_shutdown(process);
        debug!("Shutdown request to {} accepted: {}", pid, graceful);

        if wait_for_exit(&mut system, *pid, timeout).await {
            debug!("Process {} exited", pid);
            continue;
        }

        warn!("Process {} did not exit within {:?}, killing its tree", pid, timeout);
        system.refresh_processes();
        let mut tree = descendants(&system, *pid);
        tree.reverse();
        tree.push(*pid);
        for member in tree {
            if let Some(process) = system.process(member)
                && !process.kill()
            {
                warn!("Failed to kill process {}", member);
            }
        }
    }

    targets.len()
}

/// Starts `executable` from `install_dir`, detached from the updater.
///
/// Returns `false`, after logging why, when the file is missing or the launch fails.
pub fn launch_target(install_dir: &Path, executable: &str) -> bool {
    if executable.trim().is_empty() {
        warn!("No target executable configured");
        return false;
    }

    let path = install_dir.join(executable);
    if !path.is_file() {
        warn!("Target executable {} not found", path.display());
        return false;
    }

    let mut command = Command::new(&path);
    command
        .current_dir(install_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    match command.spawn() {
        Ok(child) => {
            info!("Launched {} (pid {})", path.display(), child.id());
            true
        }
        Err(e) => {
            warn!("Failed to launch {}: {}", path.display(), e);
            false
        }
    }
}
