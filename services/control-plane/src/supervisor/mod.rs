//! Process supervisor: launches workers and decides when they are ready.
//!
//! Each worker moves through
//! `Stopped -> Spawning -> AwaitingReadiness -> Ready -> Stopped`, with
//! `Failed` reachable from the two startup states and `Exited` when a
//! ready worker's process ends on its own.
//!
//! Process lifecycle and domain registration are separate. The supervisor
//! never registers a domain; a worker registers itself by connecting. The
//! only join point is the optional `await_registration` readiness check.

mod probe;
mod process;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use switchyard_envelope::DomainName;
use switchyard_id::WorkerRunId;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::SupervisorError;
use crate::registry::DomainRegistry;

pub use probe::{HttpProbe, LivenessProbe};
pub use process::{CONTROL_PLANE_URL_ENV, DOMAIN_ENV, WORKER_PORT_ENV};

/// Launch descriptor for one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSpec {
    /// Domain name the worker serves.
    pub name: DomainName,
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Port of the worker's liveness endpoint.
    pub port: u16,
    /// Also require the domain to be registered before reporting ready.
    #[serde(default)]
    pub await_registration: bool,
}

impl WorkerSpec {
    pub fn new(name: DomainName, program: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            name,
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            port,
            await_registration: false,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn await_registration(mut self, enabled: bool) -> Self {
        self.await_registration = enabled;
        self
    }
}

/// Lifecycle state of a managed worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkerState {
    Stopped,
    Spawning,
    AwaitingReadiness,
    Ready,
    Failed { reason: String },
    Exited { code: Option<i32> },
}

impl WorkerState {
    /// True while the worker occupies its name (starting or running).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            WorkerState::Spawning | WorkerState::AwaitingReadiness | WorkerState::Ready
        )
    }

    fn is_starting(&self) -> bool {
        matches!(self, WorkerState::Spawning | WorkerState::AwaitingReadiness)
    }
}

/// Snapshot of one managed worker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub name: DomainName,
    pub run_id: WorkerRunId,
    pub pid: Option<u32>,
    pub port: u16,
    #[serde(flatten)]
    pub state: WorkerState,
}

/// Supervisor timing and wiring.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Injected into workers as `SWITCHYARD_CONTROL_PLANE_URL`.
    pub control_plane_url: String,
    pub readiness_timeout: Duration,
    pub readiness_poll_interval: Duration,
    pub shutdown_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            control_plane_url: "ws://127.0.0.1:7400/v1/domains/connect".to_string(),
            readiness_timeout: Duration::from_secs(30),
            readiness_poll_interval: Duration::from_millis(250),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

struct ManagedWorker {
    spec: WorkerSpec,
    run_id: WorkerRunId,
    pid: Option<u32>,
    state: watch::Sender<WorkerState>,
    stop: Option<oneshot::Sender<()>>,
    monitor: Option<JoinHandle<()>>,
}

/// Starts, watches and stops worker processes.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    probe: Arc<dyn LivenessProbe>,
    registry: Arc<DomainRegistry>,
    workers: Mutex<HashMap<DomainName, ManagedWorker>>,
}

impl ProcessSupervisor {
    pub fn new(
        config: SupervisorConfig,
        probe: Arc<dyn LivenessProbe>,
        registry: Arc<DomainRegistry>,
    ) -> Self {
        Self {
            config,
            probe,
            registry,
            workers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Spawns a worker and waits until it is ready.
    ///
    /// Failures are reported, never retried.
    pub async fn start(&self, spec: WorkerSpec) -> Result<(), SupervisorError> {
        let name = spec.name.clone();
        let run_id = WorkerRunId::new();

        let mut state_rx = {
            let mut workers = self.lock();
            if let Some(existing) = workers.get(&name) {
                if existing.state.borrow().is_active() {
                    return Err(SupervisorError::AlreadyRunning {
                        name: name.to_string(),
                    });
                }
            }

            info!(
                worker = %name,
                run_id = %run_id,
                program = %spec.program.display(),
                port = spec.port,
                "Spawning worker"
            );

            let (state_tx, state_rx) = watch::channel(WorkerState::Spawning);

            let child = match process::spawn(&spec, &self.config.control_plane_url) {
                Ok(child) => child,
                Err(source) => {
                    error!(worker = %name, error = %source, "Failed to spawn worker");
                    state_tx.send_replace(WorkerState::Failed {
                        reason: source.to_string(),
                    });
                    workers.insert(
                        name.clone(),
                        ManagedWorker {
                            spec,
                            run_id,
                            pid: None,
                            state: state_tx,
                            stop: None,
                            monitor: None,
                        },
                    );
                    return Err(SupervisorError::SpawnFailure {
                        name: name.to_string(),
                        source,
                    });
                }
            };

            let pid = child.id();
            let (stop_tx, stop_rx) = oneshot::channel();
            let monitor = tokio::spawn(process::monitor(
                name.clone(),
                child,
                stop_rx,
                state_tx.clone(),
                self.config.shutdown_grace,
            ));

            state_tx.send_if_modified(|state| {
                if *state == WorkerState::Spawning {
                    *state = WorkerState::AwaitingReadiness;
                    true
                } else {
                    false
                }
            });

            workers.insert(
                name.clone(),
                ManagedWorker {
                    spec: spec.clone(),
                    run_id,
                    pid,
                    state: state_tx,
                    stop: Some(stop_tx),
                    monitor: Some(monitor),
                },
            );
            state_rx
        };

        self.await_readiness(&spec, &mut state_rx).await
    }

    async fn await_readiness(
        &self,
        spec: &WorkerSpec,
        state_rx: &mut watch::Receiver<WorkerState>,
    ) -> Result<(), SupervisorError> {
        let name = &spec.name;
        let started = Instant::now();
        let deadline = started + self.config.readiness_timeout;

        loop {
            let current = state_rx.borrow_and_update().clone();
            match current {
                WorkerState::Exited { code } => {
                    warn!(worker = %name, code = ?code, "Worker exited before becoming ready");
                    self.set_state(
                        name,
                        WorkerState::Failed {
                            reason: format!("exited during startup with code {code:?}"),
                        },
                    );
                    return Err(SupervisorError::ExitedDuringStartup {
                        name: name.to_string(),
                        code,
                    });
                }
                state if !state.is_starting() => {
                    // Stopped or failed by someone else while starting.
                    return Err(SupervisorError::ExitedDuringStartup {
                        name: name.to_string(),
                        code: None,
                    });
                }
                _ => {}
            }

            if self.is_live(spec).await {
                let promoted = self.promote(name);
                if promoted {
                    info!(
                        worker = %name,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Worker ready"
                    );
                    return Ok(());
                }
                continue;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let nap = self.config.readiness_poll_interval.min(deadline - now);

            tokio::select! {
                _ = tokio::time::sleep(nap) => {}
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let waited = started.elapsed();
        warn!(worker = %name, waited_ms = waited.as_millis() as u64, "Worker readiness timed out");
        self.set_state(
            name,
            WorkerState::Failed {
                reason: "readiness timeout".to_string(),
            },
        );
        self.shutdown(name.as_str()).await;

        Err(SupervisorError::ReadinessTimeout {
            name: name.to_string(),
            waited,
        })
    }

    async fn is_live(&self, spec: &WorkerSpec) -> bool {
        if !self.probe.is_alive(spec.port).await {
            return false;
        }
        !spec.await_registration || self.registry.lookup(spec.name.as_str()).is_some()
    }

    /// Moves a starting worker to Ready. False if it left the startup states.
    fn promote(&self, name: &DomainName) -> bool {
        let workers = self.lock();
        let Some(worker) = workers.get(name) else {
            return false;
        };
        worker.state.send_if_modified(|state| {
            if state.is_starting() {
                *state = WorkerState::Ready;
                true
            } else {
                false
            }
        })
    }

    fn set_state(&self, name: &DomainName, state: WorkerState) {
        if let Some(worker) = self.lock().get(name) {
            worker.state.send_replace(state);
        }
    }

    /// Stops a worker: SIGINT, then kill after the shutdown grace period.
    pub async fn stop(&self, name: &str) -> Result<(), SupervisorError> {
        let known = self.lock().contains_key(name);
        if !known {
            return Err(SupervisorError::UnknownWorker {
                name: name.to_string(),
            });
        }
        self.shutdown(name).await;
        Ok(())
    }

    /// Stops every managed worker concurrently.
    pub async fn stop_all(&self) {
        let names: Vec<DomainName> = self.lock().keys().cloned().collect();
        join_all(names.iter().map(|name| self.shutdown(name.as_str()))).await;
    }

    async fn shutdown(&self, name: &str) {
        let (stop, monitor) = {
            let mut workers = self.lock();
            match workers.get_mut(name) {
                Some(worker) => (worker.stop.take(), worker.monitor.take()),
                None => return,
            }
        };

        if let Some(stop) = stop {
            info!(worker = %name, "Stopping worker");
            let _ = stop.send(());
        }
        if let Some(monitor) = monitor {
            if let Err(e) = monitor.await {
                warn!(worker = %name, error = %e, "Worker monitor task failed");
            }
        }
    }

    /// Returns true if the worker is in the Ready state.
    pub fn is_ready(&self, name: &str) -> bool {
        self.state(name) == Some(WorkerState::Ready)
    }

    pub fn state(&self, name: &str) -> Option<WorkerState> {
        self.lock()
            .get(name)
            .map(|worker| worker.state.borrow().clone())
    }

    /// Waits until the worker leaves its startup states and returns where it
    /// settled.
    pub async fn wait_ready(&self, name: &str) -> Result<WorkerState, SupervisorError> {
        let mut rx = self
            .lock()
            .get(name)
            .map(|worker| worker.state.subscribe())
            .ok_or_else(|| SupervisorError::UnknownWorker {
                name: name.to_string(),
            })?;

        // An error only means the state can no longer change.
        let _ = rx.wait_for(|state| !state.is_starting()).await;
        let settled = rx.borrow().clone();
        Ok(settled)
    }

    /// Snapshot of every managed worker, sorted by name.
    pub fn workers(&self) -> Vec<WorkerStatus> {
        let workers = self.lock();
        let mut statuses: Vec<WorkerStatus> = workers
            .values()
            .map(|worker| WorkerStatus {
                name: worker.spec.name.clone(),
                run_id: worker.run_id,
                pid: worker.pid,
                port: worker.spec.port,
                state: worker.state.borrow().clone(),
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<DomainName, ManagedWorker>> {
        self.workers
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}
