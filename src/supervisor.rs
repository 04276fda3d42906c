//! Per-dome worker threads and failure isolation.
//!
//! ```text
//!              Supervisor::run
//!         ┌──────────┴──────────┐
//!   thread "aqawan1"      thread "aqawan2"
//!   catch_unwind {        catch_unwind {
//!     factory()             factory()
//!     controller.run()      controller.run()
//!   }                     }
//!     │ Err / panic           │
//!     ▼                       ▼
//!   critical alert        (unaffected)
//!   RestartPolicy ──▶ rebuild after delay, or stay stopped
//! ```
//!
//! A failing dome never takes another dome's loop down.  When a loop stays
//! stopped, its heartbeats stop and the hardware closes the enclosure.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use parking_lot::{Condvar, Mutex};

use crate::app::ports::{AlertSink, Clock};
use crate::app::service::DomeController;
use crate::config::RestartPolicy;
use crate::diagnostics::{FailureKind, FailureLog, FailureReport, panic_message};
use crate::error::Error;

// ---------------------------------------------------------------------------
// Shutdown signal
// ---------------------------------------------------------------------------

/// Process-wide stop flag that wakes sleeping loops immediately.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (flag, cv) = &*self.inner;
        *flag.lock() = true;
        cv.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep up to `timeout`.  Returns `true` if shutdown was requested.
    ///
    /// A timeout too large for the monotonic clock waits for the trigger alone.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let (flag, cv) = &*self.inner;
        let deadline = Instant::now().checked_add(timeout);
        let mut triggered = flag.lock();
        while !*triggered {
            match deadline {
                Some(deadline) => {
                    if cv.wait_until(&mut triggered, deadline).timed_out() {
                        break;
                    }
                }
                None => cv.wait(&mut triggered),
            }
        }
        *triggered
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

/// Builds a fresh controller for one dome; called again on every restart.
pub type ControllerFactory = Box<dyn FnMut() -> Result<DomeController, Error> + Send>;

pub struct DomeWorker {
    pub id: String,
    pub factory: ControllerFactory,
}

impl DomeWorker {
    pub fn new(
        id: impl Into<String>,
        factory: impl FnMut() -> Result<DomeController, Error> + Send + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            factory: Box::new(factory),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Stopped by the shutdown signal.
    Shutdown,
    /// Stopped by a failure the restart policy did not cover.
    Failed(FailureReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub dome_id: String,
    pub exit: WorkerExit,
    pub restarts: u32,
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

pub struct Supervisor {
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    policy: RestartPolicy,
    shutdown: ShutdownSignal,
    failures: Arc<Mutex<FailureLog>>,
}

impl Supervisor {
    pub fn new(
        alerts: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
        policy: RestartPolicy,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            alerts,
            clock,
            policy,
            shutdown,
            failures: Arc::new(Mutex::new(FailureLog::new())),
        }
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Recent failures across all domes, oldest first.
    pub fn failures(&self) -> Vec<FailureReport> {
        self.failures.lock().entries().cloned().collect()
    }

    /// Run one thread per worker and block until all of them have ended.
    /// Returns one report per worker, in input order.
    pub fn run(&self, workers: Vec<DomeWorker>) -> Vec<WorkerReport> {
        let mut handles: Vec<(String, Option<JoinHandle<WorkerReport>>)> = Vec::new();

        for worker in workers {
            let id = worker.id.clone();
            let ctx = WorkerContext {
                alerts: self.alerts.clone(),
                clock: self.clock.clone(),
                policy: self.policy,
                shutdown: self.shutdown.clone(),
                failures: self.failures.clone(),
            };
            let spawned = std::thread::Builder::new()
                .name(id.clone())
                .spawn(move || ctx.run_worker(worker));
            match spawned {
                Ok(handle) => {
                    info!("{id}: worker thread started");
                    handles.push((id, Some(handle)));
                }
                Err(e) => {
                    let report = self.report_failure(&id, FailureKind::Startup, &e.to_string());
                    self.alerts.send(&report.to_alert(false));
                    handles.push((id, None));
                }
            }
        }

        handles
            .into_iter()
            .map(|(id, handle)| {
                let joined = handle.map(JoinHandle::join);
                match joined {
                    Some(Ok(report)) => report,
                    Some(Err(payload)) => {
                        let msg = panic_message(payload.as_ref());
                        WorkerReport {
                            exit: WorkerExit::Failed(self.report_failure(
                                &id,
                                FailureKind::Panic,
                                &msg,
                            )),
                            dome_id: id,
                            restarts: 0,
                        }
                    }
                    None => WorkerReport {
                        exit: WorkerExit::Failed(FailureReport::new(
                            &id,
                            FailureKind::Startup,
                            "worker thread could not be spawned",
                            self.clock.now(),
                        )),
                        dome_id: id,
                        restarts: 0,
                    },
                }
            })
            .collect()
    }

    fn report_failure(&self, id: &str, kind: FailureKind, msg: &str) -> FailureReport {
        error!("{id}: worker {kind}: {msg}");
        let report = FailureReport::new(id, kind, msg, self.clock.now());
        self.failures.lock().record(report.clone());
        report
    }
}

/// What each worker thread shares with the supervisor.
struct WorkerContext {
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    policy: RestartPolicy,
    shutdown: ShutdownSignal,
    failures: Arc<Mutex<FailureLog>>,
}

impl WorkerContext {
    fn run_worker(self, mut worker: DomeWorker) -> WorkerReport {
        let id = worker.id.clone();
        let mut restarts = 0;

        loop {
            let shutdown = &self.shutdown;
            let factory = &mut worker.factory;
            let outcome = catch_unwind(AssertUnwindSafe(|| -> Result<(), (FailureKind, String)> {
                let mut controller =
                    factory().map_err(|e| (FailureKind::Startup, e.to_string()))?;
                controller
                    .run(shutdown)
                    .map_err(|e| (FailureKind::Error, e.to_string()))
            }));

            let (kind, message) = match outcome {
                Ok(Ok(())) => {
                    return WorkerReport {
                        dome_id: id,
                        exit: WorkerExit::Shutdown,
                        restarts,
                    };
                }
                Ok(Err(failure)) => failure,
                Err(payload) => (FailureKind::Panic, panic_message(payload.as_ref())),
            };

            let delay = if self.shutdown.is_triggered() {
                None
            } else {
                self.policy.next_delay(restarts)
            };
            error!("{id}: control loop {kind}: {message}");
            let report = FailureReport::new(&id, kind, &message, self.clock.now());
            self.alerts.send(&report.to_alert(delay.is_some()));
            self.failures.lock().record(report.clone());

            let Some(delay) = delay else {
                warn!("{id}: control loop stays stopped; hardware watchdog will close the enclosure");
                return WorkerReport {
                    dome_id: id,
                    exit: WorkerExit::Failed(report),
                    restarts,
                };
            };
            if self.shutdown.wait_for(delay) {
                return WorkerReport {
                    dome_id: id,
                    exit: WorkerExit::Failed(report),
                    restarts,
                };
            }
            restarts += 1;
            warn!("{id}: restarting control loop (restart {restarts})");
        }
    }
}
