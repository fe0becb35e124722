//! Child process plumbing: spawn, output forwarding, monitoring, shutdown.

use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use switchyard_envelope::DomainName;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use super::{WorkerSpec, WorkerState};

pub const CONTROL_PLANE_URL_ENV: &str = "SWITCHYARD_CONTROL_PLANE_URL";
pub const DOMAIN_ENV: &str = "SWITCHYARD_DOMAIN";
pub const WORKER_PORT_ENV: &str = "SWITCHYARD_WORKER_PORT";

/// Launches a worker with its output piped and connection details injected.
pub(crate) fn spawn(spec: &WorkerSpec, control_plane_url: &str) -> std::io::Result<Child> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(&spec.env)
        .env(CONTROL_PLANE_URL_ENV, control_plane_url)
        .env(DOMAIN_ENV, spec.name.as_str())
        .env(WORKER_PORT_ENV, spec.port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &spec.working_dir {
        command.current_dir(dir);
    }

    let mut child = command.spawn()?;

    if let Some(stdout) = child.stdout.take() {
        forward_output(spec.name.clone(), "stdout", stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        forward_output(spec.name.clone(), "stderr", stderr);
    }

    Ok(child)
}

/// Re-emits each line a worker writes as a tracing event.
fn forward_output<R>(worker: DomainName, stream: &'static str, output: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(output).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => info!(worker = %worker, stream, "{line}"),
                Ok(None) => break,
                Err(e) => {
                    debug!(worker = %worker, stream, error = %e, "Output stream read failed");
                    break;
                }
            }
        }
    });
}

/// Owns a running child until it exits or is told to stop.
///
/// A natural exit is published as [`WorkerState::Exited`]. A stop request
/// terminates the child and publishes [`WorkerState::Stopped`], unless the
/// worker was already marked failed.
pub(crate) async fn monitor(
    worker: DomainName,
    mut child: Child,
    stop: oneshot::Receiver<()>,
    state: watch::Sender<WorkerState>,
    grace: Duration,
) {
    tokio::select! {
        status = child.wait() => {
            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(worker = %worker, error = %e, "Failed to wait on worker process");
                    None
                }
            };
            warn!(worker = %worker, code = ?code, "Worker process exited");
            state.send_replace(WorkerState::Exited { code });
        }
        _ = stop => {
            terminate(&worker, &mut child, grace).await;
            state.send_modify(|current| {
                if !matches!(current, WorkerState::Failed { .. }) {
                    *current = WorkerState::Stopped;
                }
            });
        }
    }
}

/// SIGINT, then a hard kill once `grace` has passed.
async fn terminate(worker: &DomainName, child: &mut Child, grace: Duration) {
    if let Some(pid) = child.id() {
        debug!(worker = %worker, pid, "Sending SIGINT to worker");
        match i32::try_from(pid) {
            Ok(raw) => {
                if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGINT) {
                    warn!(worker = %worker, pid, error = %e, "Failed to signal worker");
                }
            }
            Err(_) => warn!(worker = %worker, pid, "Pid out of range; skipping SIGINT"),
        }

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                info!(worker = %worker, code = ?status.code(), "Worker stopped");
                return;
            }
            Ok(Err(e)) => {
                warn!(worker = %worker, error = %e, "Failed to wait on worker process");
            }
            Err(_) => {
                warn!(
                    worker = %worker,
                    grace_ms = grace.as_millis() as u64,
                    "Worker ignored SIGINT; killing"
                );
            }
        }
    }

    if let Err(e) = child.kill().await {
        warn!(worker = %worker, error = %e, "Failed to kill worker process");
    } else {
        info!(worker = %worker, "Worker killed");
    }
}
