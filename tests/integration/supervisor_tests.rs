//! Integration tests for the supervisor: fault isolation, restart policy,
//! shutdown and heartbeat cadence, with real threads and mock adapters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::mock_hw::{HwCall, MockHardware, Rig};
use domewatch::app::events::Severity;
use domewatch::app::ports::DomePorts;
use domewatch::app::service::DomeController;
use domewatch::config::{DomeConfig, RestartPolicy};
use domewatch::diagnostics::FailureKind;
use domewatch::error::{Error, HardwareError};
use domewatch::supervisor::{DomeWorker, ShutdownSignal, Supervisor, WorkerExit, WorkerReport};

fn fast_rig() -> Rig {
    let mut rig = Rig::new();
    rig.site.cycle_period_ms = 10;
    rig.site.heartbeat_timeout_ms = 100;
    rig
}

fn worker(rig: &Rig, dome: DomeConfig, hw: Arc<MockHardware>) -> DomeWorker {
    let site = rig.site.clone();
    let ports = DomePorts {
        hardware: hw,
        ..rig.ports()
    };
    DomeWorker::new(dome.id.clone(), move || {
        Ok(DomeController::new(&site, dome.clone(), ports.clone()))
    })
}

/// Run the supervisor on its own thread and stop it after `for_how_long`.
fn run_for(
    rig: &Rig,
    policy: RestartPolicy,
    workers: Vec<DomeWorker>,
    for_how_long: Duration,
) -> Vec<WorkerReport> {
    let shutdown = ShutdownSignal::new();
    let supervisor = Supervisor::new(rig.alerts.clone(), rig.clock.clone(), policy, shutdown.clone());
    let runner = std::thread::spawn(move || supervisor.run(workers));
    std::thread::sleep(for_how_long);
    shutdown.trigger();
    runner.join().expect("supervisor thread")
}

#[test]
fn panicking_dome_does_not_stop_its_neighbour() {
    let rig = fast_rig();
    let bad = Arc::new(MockHardware::new());
    bad.panic_on_status();
    let good = Arc::new(MockHardware::new());

    let workers = vec![
        worker(&rig, DomeConfig::simulated("aqawan1"), bad),
        worker(&rig, DomeConfig::simulated("aqawan2"), good.clone()),
    ];
    let shutdown = ShutdownSignal::new();
    let supervisor = Supervisor::new(
        rig.alerts.clone(),
        rig.clock.clone(),
        RestartPolicy::Never,
        shutdown.clone(),
    );
    let runner = std::thread::spawn(move || supervisor.run(workers));

    // Wait for the crash alert, then check the neighbour keeps publishing.
    let deadline = Instant::now() + Duration::from_secs(5);
    while rig.alerts.all().is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(rig.alerts.all().len(), 1, "aqawan1 crash was reported");
    let published_after_crash = rig.status.count_for("aqawan2");
    std::thread::sleep(Duration::from_millis(150));
    assert!(
        rig.status.count_for("aqawan2") > published_after_crash,
        "aqawan2 kept publishing after aqawan1 crashed"
    );

    shutdown.trigger();
    let reports = runner.join().expect("supervisor thread");

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].dome_id, "aqawan1");
    match &reports[0].exit {
        WorkerExit::Failed(f) => {
            assert_eq!(f.kind, FailureKind::Panic);
            assert!(f.message.contains("mock hardware exploded"));
        }
        other => panic!("aqawan1 should have failed, got {other:?}"),
    }
    assert_eq!(reports[1].exit, WorkerExit::Shutdown);
    assert!(good.count(HwCall::Heartbeat) > 3, "healthy dome kept running");
    assert!(rig.status.last("aqawan2").is_some());
    assert!(rig.status.last("aqawan1").is_none());

    let alerts = rig.alerts.all();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::Critical);
    assert!(alerts[0].subject.contains("aqawan1"));
    assert!(alerts[0].body.contains("aqawan1"));
}

#[test]
fn lost_session_stops_the_loop_with_an_alert() {
    let rig = fast_rig();
    let hw = Arc::new(MockHardware::new());
    hw.lose_session();
    let workers = vec![worker(&rig, DomeConfig::simulated("aqawan1"), hw)];
    let reports = run_for(&rig, RestartPolicy::Never, workers, Duration::from_millis(50));

    match &reports[0].exit {
        WorkerExit::Failed(f) => assert_eq!(f.kind, FailureKind::Error),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(reports[0].restarts, 0);
    assert_eq!(rig.alerts.with_subject("aqawan1 has crashed"), 1);
}

#[test]
fn restart_policy_limits_rebuilds() {
    let rig = fast_rig();
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let workers = vec![DomeWorker::new("aqawan1", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(Error::Hardware(HardwareError::Unreachable(
            "controller offline".into(),
        )))
    })];

    let shutdown = ShutdownSignal::new();
    let supervisor = Supervisor::new(
        rig.alerts.clone(),
        rig.clock.clone(),
        RestartPolicy::After {
            delay_secs: 0,
            max_restarts: 2,
        },
        shutdown,
    );
    let reports = supervisor.run(workers);

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(reports[0].restarts, 2);
    assert!(matches!(
        &reports[0].exit,
        WorkerExit::Failed(f) if f.kind == FailureKind::Startup
    ));
    assert_eq!(rig.alerts.with_subject("aqawan1 has crashed"), 3);
    assert_eq!(supervisor.failures().len(), 3);
}

#[test]
fn shutdown_stops_every_loop_cleanly() {
    let rig = fast_rig();
    let workers = vec![
        worker(&rig, DomeConfig::simulated("aqawan1"), Arc::new(MockHardware::new())),
        worker(&rig, DomeConfig::simulated("aqawan2"), Arc::new(MockHardware::new())),
    ];
    let started = Instant::now();
    let reports = run_for(&rig, RestartPolicy::Never, workers, Duration::from_millis(60));

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(reports.iter().all(|r| r.exit == WorkerExit::Shutdown));
    assert!(rig.alerts.all().is_empty());
}

#[test]
fn open_dome_gets_several_heartbeats_per_timeout() {
    let rig = fast_rig();
    let hw = Arc::new(MockHardware::new());
    let workers = vec![worker(&rig, DomeConfig::simulated("aqawan1"), hw.clone())];
    let window = Duration::from_millis(300);
    run_for(&rig, RestartPolicy::Never, workers, window);

    // 100 ms timeout, 10 ms cycle: at least four heartbeats per timeout
    // window even on a slow machine.
    let windows = (window.as_millis() / 100) as usize;
    assert!(
        hw.count(HwCall::Heartbeat) >= 4 * windows,
        "only {} heartbeats in {window:?}",
        hw.count(HwCall::Heartbeat)
    );
}
