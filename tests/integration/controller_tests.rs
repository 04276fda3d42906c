//! Integration tests for the DomeController → evaluator → hardware pipeline.
//!
//! Time is driven by `ManualClock`; the mock enclosure opens instantly, so
//! each step joins the background open before the next cycle.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::mock_hw::{HwCall, Rig, clear_night};
use domewatch::adapters::simulated::SimulatedDome;
use domewatch::app::commands::{CloseCause, ControlAction};
use domewatch::app::events::Alert;
use domewatch::app::ports::{Clock, DomePorts, OverrideFlags, ShutterState};
use domewatch::app::service::{CycleReport, DomeController};
use domewatch::error::{Error, HardwareError};
use domewatch::fsm::DomePhase;
use domewatch::safety::Violation;

const OPEN_BOTH: ControlAction = ControlAction::Open {
    reverse: false,
    single_shutter: false,
};

fn controller(rig: &Rig) -> DomeController {
    DomeController::new(&rig.site, rig.dome.clone(), rig.ports())
}

fn step(ctl: &mut DomeController) -> CycleReport {
    let report = ctl.cycle().expect("cycle must not fail");
    ctl.join_pending_open();
    report
}

fn is_close(action: ControlAction) -> bool {
    matches!(action, ControlAction::Close { .. })
}

// ── Opening and closing ───────────────────────────────────────

#[test]
fn clear_night_with_request_opens_and_heartbeats() {
    let rig = Rig::new();
    let mut ctl = controller(&rig);

    let first = step(&mut ctl);
    assert_eq!(first.action, OPEN_BOTH);
    assert!(first.decision.ok);
    assert_eq!(rig.hw.opens(), vec![HwCall::Open {
        reverse: false,
        single_shutter: false
    }]);

    for _ in 0..3 {
        rig.clock.advance(Duration::seconds(14));
        step(&mut ctl);
    }
    assert_eq!(rig.hw.opens().len(), 1, "no second open while already open");
    assert_eq!(rig.hw.count(HwCall::Heartbeat), 4, "one heartbeat per open cycle");
    assert_eq!(ctl.phase(), DomePhase::Open);
    assert!(rig.status.last("aqawan1").unwrap().is_open);
}

#[test]
fn close_is_sent_every_cycle_without_heartbeats() {
    let rig = Rig::new();
    rig.overrides.set_flags(OverrideFlags::default());
    let mut ctl = controller(&rig);

    for _ in 0..3 {
        let report = step(&mut ctl);
        assert_eq!(report.action, ControlAction::Close {
            cause: CloseCause::NotRequested
        });
        rig.clock.advance(Duration::seconds(14));
    }
    assert_eq!(rig.hw.count(HwCall::Close), 3);
    assert_eq!(rig.hw.count(HwCall::Heartbeat), 0);
    assert!(rig.hw.opens().is_empty());
    assert_eq!(ctl.phase(), DomePhase::Closed);
    assert!(!rig.status.last("aqawan1").unwrap().is_open);
}

#[test]
fn unsafe_weather_closes_an_open_dome() {
    let rig = Rig::new();
    let mut ctl = controller(&rig);
    step(&mut ctl);
    rig.clock.advance(Duration::seconds(14));
    step(&mut ctl);
    assert_eq!(rig.hw.shutters(), [ShutterState::Open; 2]);

    rig.weather.set(clear_night().with_value("windSpeed", 50.0));
    rig.clock.advance(Duration::seconds(14));
    let report = step(&mut ctl);

    assert_eq!(report.action, ControlAction::Close {
        cause: CloseCause::Weather { sun_only: false }
    });
    assert_eq!(rig.hw.shutters(), [ShutterState::Closed; 2]);
    assert!(!rig.status.last("aqawan1").unwrap().is_open);
}

// ── Hysteresis ────────────────────────────────────────────────

#[test]
fn hysteresis_holds_the_dome_closed_for_thirty_minutes() {
    let rig = Rig::new();
    rig.weather.set(clear_night().with_value("windSpeed", 50.0));
    let mut ctl = controller(&rig);
    assert!(is_close(step(&mut ctl).action));

    rig.weather.set(clear_night());
    rig.clock.advance(Duration::minutes(29));
    let held = step(&mut ctl);
    assert!(held.decision.ok);
    assert!(matches!(
        held.action,
        ControlAction::Close {
            cause: CloseCause::Hysteresis { .. }
        }
    ));

    rig.clock.advance(Duration::minutes(2));
    assert_eq!(step(&mut ctl).action, OPEN_BOTH);
}

#[test]
fn timeout_override_skips_hysteresis() {
    let rig = Rig::new();
    rig.weather.set(clear_night().with_value("outsideHumidity", 95.0));
    let mut ctl = controller(&rig);
    assert!(is_close(step(&mut ctl).action));

    rig.weather.set(clear_night());
    rig.overrides.set_flags(OverrideFlags {
        timeout: true,
        open_requested: true,
        ..OverrideFlags::default()
    });
    rig.clock.advance(Duration::minutes(1));
    assert_eq!(step(&mut ctl).action, OPEN_BOTH);
}

#[test]
fn sun_alone_does_not_start_hysteresis() {
    let rig = Rig::new();
    let mut daytime = clear_night();
    daytime.sun_altitude = 10.0;
    rig.weather.set(daytime);
    let mut ctl = controller(&rig);

    let report = step(&mut ctl);
    assert_eq!(report.action, ControlAction::Close {
        cause: CloseCause::Weather { sun_only: true }
    });
    assert!(report.decision.ok_ignoring_sun);

    rig.weather.set(clear_night());
    rig.clock.advance(Duration::minutes(1));
    assert_eq!(step(&mut ctl).action, OPEN_BOTH);
}

// ── Sun override and shutter selection ────────────────────────

#[test]
fn sun_override_opens_a_single_shutter() {
    let rig = Rig::new();
    let mut daytime = clear_night();
    daytime.sun_altitude = 30.0;
    rig.weather.set(daytime);
    rig.overrides.set_flags(OverrideFlags {
        sun: true,
        open_requested: true,
        ..OverrideFlags::default()
    });
    let mut ctl = controller(&rig);

    let report = step(&mut ctl);
    assert_eq!(report.action, ControlAction::Open {
        reverse: false,
        single_shutter: true
    });
    assert_eq!(rig.hw.shutters(), [ShutterState::Open, ShutterState::Closed]);

    rig.clock.advance(Duration::seconds(14));
    step(&mut ctl);
    assert_eq!(rig.hw.opens().len(), 1, "one open shutter counts as open");
}

#[test]
fn reverse_dome_opens_second_shutter_first() {
    let mut rig = Rig::new();
    rig.dome.reverse = true;
    rig.overrides.set_flags(OverrideFlags {
        sun: true,
        open_requested: true,
        ..OverrideFlags::default()
    });
    let mut ctl = controller(&rig);

    step(&mut ctl);
    assert_eq!(rig.hw.opens(), vec![HwCall::Open {
        reverse: true,
        single_shutter: true
    }]);
    assert_eq!(rig.hw.shutters(), [ShutterState::Closed, ShutterState::Open]);
}

#[test]
fn single_shutter_needs_partial_open_support() {
    let mut rig = Rig::new();
    rig.dome.partial_open = false;
    rig.overrides.set_flags(OverrideFlags {
        sun: true,
        open_requested: true,
        ..OverrideFlags::default()
    });
    let mut ctl = controller(&rig);
    assert_eq!(step(&mut ctl).action, OPEN_BOTH);
}

// ── Manual decision gate ──────────────────────────────────────

#[test]
fn expiring_gate_requests_one_inspection_and_resumes_when_cleared() {
    let rig = Rig::new();
    let now = rig.clock.now();
    rig.overrides.set_gate(Some(now - Duration::hours(23)));
    let mut ctl = controller(&rig);

    let active = step(&mut ctl);
    assert!(active.decision.reasons.contains(&Violation::ManualInspectionRequired));
    assert!(is_close(active.action));
    assert!(rig.alerts.all().is_empty());
    assert!(rig.overrides.gate_writes().is_empty());

    rig.clock.advance(Duration::hours(2));
    assert!(is_close(step(&mut ctl).action));
    let reset_to = rig.clock.now() - Duration::days(1);
    assert_eq!(rig.overrides.gate_writes(), vec![reset_to]);
    assert_eq!(rig.alerts.count(&Alert::inspection_required("aqawan1")), 1);

    for _ in 0..5 {
        rig.clock.advance(Duration::minutes(10));
        assert!(is_close(step(&mut ctl).action));
    }
    assert_eq!(rig.alerts.count(&Alert::inspection_required("aqawan1")), 1);
    assert_eq!(rig.overrides.gate_writes().len(), 1);

    rig.overrides.set_gate(None);
    rig.clock.advance(Duration::minutes(1));
    step(&mut ctl);
    assert_eq!(rig.alerts.count(&Alert::inspection_done("aqawan1")), 1);

    rig.clock.advance(Duration::minutes(31));
    assert_eq!(step(&mut ctl).action, OPEN_BOTH);
}

#[test]
fn freezing_rain_engages_the_gate() {
    let rig = Rig::new();
    rig.weather.set(
        clear_night()
            .with_value("outsideTemp", -3.0)
            .with_cloud("MearthCloud", 998.0),
    );
    let mut ctl = controller(&rig);

    let report = step(&mut ctl);
    assert!(is_close(report.action));
    assert!(rig.overrides.gate().is_some());
    assert_eq!(rig.alerts.count(&Alert::inspection_required("aqawan1")), 1);
    assert!(
        report
            .decision
            .reasons
            .iter()
            .any(|r| matches!(r, Violation::FreezeAndPrecipitation { .. }))
    );

    rig.clock.advance(Duration::minutes(5));
    step(&mut ctl);
    assert_eq!(rig.alerts.count(&Alert::inspection_required("aqawan1")), 1);
}

// ── Emergency stop ────────────────────────────────────────────

#[test]
fn estop_alerts_once_when_tripped_and_once_when_cleared() {
    let rig = Rig::new();
    let mut ctl = controller(&rig);
    step(&mut ctl);

    rig.hw.set_estop(true);
    for _ in 0..4 {
        rig.clock.advance(Duration::seconds(14));
        step(&mut ctl);
    }
    assert!(ctl.state().estop_active);
    assert_eq!(rig.alerts.count(&Alert::estop_tripped("aqawan1")), 1);
    assert_eq!(rig.hw.shutters(), [ShutterState::Closed; 2]);

    rig.hw.clear_calls();
    rig.clock.advance(Duration::seconds(14));
    let report = step(&mut ctl);
    assert_eq!(report.action, ControlAction::Close {
        cause: CloseCause::Estop
    });
    assert!(rig.hw.opens().is_empty());

    rig.hw.set_estop(false);
    for _ in 0..3 {
        rig.clock.advance(Duration::seconds(14));
        step(&mut ctl);
    }
    assert!(!ctl.state().estop_active);
    assert_eq!(rig.alerts.count(&Alert::estop_cleared("aqawan1")), 1);
    assert_eq!(rig.alerts.count(&Alert::estop_tripped("aqawan1")), 1);
    assert!(!rig.hw.opens().is_empty(), "reopens once the stop is cleared");
}

#[test]
fn estop_is_ignored_without_detection() {
    let mut rig = Rig::new();
    rig.dome.estop_detection = false;
    rig.hw.set_estop(true);
    let mut ctl = controller(&rig);
    step(&mut ctl);
    step(&mut ctl);
    assert!(!ctl.state().estop_active);
    assert!(rig.alerts.all().is_empty());
}

// ── Degraded inputs ───────────────────────────────────────────

#[test]
fn weather_outage_keeps_last_good_snapshot_until_stale() {
    let rig = Rig::new();
    let mut ctl = controller(&rig);
    assert_eq!(step(&mut ctl).action, OPEN_BOTH);

    rig.weather.fail();
    rig.clock.advance(Duration::minutes(10));
    let report = step(&mut ctl);
    assert!(report.action.is_open(), "last good snapshot is still fresh");
    assert!(ctl.metrics().weather_failures >= 1);
    assert!(ctl.weather().is_some());

    rig.clock.advance(Duration::minutes(51));
    let report = step(&mut ctl);
    assert!(is_close(report.action));
    assert!(
        report
            .decision
            .reasons
            .iter()
            .any(|r| matches!(r, Violation::StaleWeather { .. }))
    );
}

#[test]
fn no_weather_ever_keeps_the_dome_closed() {
    let rig = Rig::new();
    rig.weather.fail();
    let mut ctl = controller(&rig);
    let report = step(&mut ctl);
    assert!(is_close(report.action));
    assert_eq!(report.decision.reasons, vec![Violation::NoWeatherData]);
}

#[test]
fn all_cloud_sensors_down_is_unsafe() {
    let rig = Rig::new();
    rig.weather.set(
        clear_night()
            .with_cloud("MearthCloud", 999.0)
            .with_cloud("HATCloud", 999.0)
            .with_cloud("AuroraCloud", 999.0)
            .with_cloud("MINERVACloud", 999.0),
    );
    let mut ctl = controller(&rig);
    let report = step(&mut ctl);
    assert!(is_close(report.action));
    assert!(report.decision.reasons.contains(&Violation::AllCloudSensorsDown));
}

#[test]
fn unreadable_overrides_mean_no_request() {
    let rig = Rig::new();
    rig.overrides.set_fail_flags(true);
    let mut ctl = controller(&rig);
    assert_eq!(step(&mut ctl).action, ControlAction::Close {
        cause: CloseCause::NotRequested
    });
}

#[test]
fn failed_status_read_skips_publishing() {
    let rig = Rig::new();
    rig.hw.set_fail_status(true);
    let mut ctl = controller(&rig);
    let report = step(&mut ctl);
    assert!(report.published.is_none());
    assert_eq!(rig.status.count(), 0);
    assert!(ctl.metrics().status_failures >= 1);
}

#[test]
fn publish_failure_does_not_stop_the_loop() {
    let rig = Rig::new();
    rig.status.set_fail(true);
    let mut ctl = controller(&rig);
    for _ in 0..2 {
        let report = step(&mut ctl);
        assert!(report.published.is_none());
        rig.clock.advance(Duration::seconds(14));
    }
    rig.status.set_fail(false);
    assert!(step(&mut ctl).published.is_some());
}

#[test]
fn lost_session_is_fatal() {
    let rig = Rig::new();
    let mut ctl = controller(&rig);
    step(&mut ctl);
    rig.hw.lose_session();
    match ctl.cycle() {
        Err(Error::Hardware(HardwareError::SessionLost(_))) => {}
        other => panic!("expected SessionLost, got {other:?}"),
    }
}

// ── Background open ───────────────────────────────────────────

#[test]
fn close_interrupts_an_open_in_progress() {
    let rig = Rig::new();
    let sim = Arc::new(
        SimulatedDome::new(StdDuration::from_secs(60)).with_travel_time(StdDuration::from_secs(5)),
    );
    let ports = DomePorts {
        hardware: sim.clone(),
        ..rig.ports()
    };
    let mut ctl = DomeController::new(&rig.site, rig.dome.clone(), ports);

    assert_eq!(ctl.cycle().unwrap().action, OPEN_BOTH);
    std::thread::sleep(StdDuration::from_millis(30));
    assert!(ctl.state().open_in_flight);

    rig.weather.set(clear_night().with_value("windGustSpeed", 80.0));
    rig.clock.advance(Duration::seconds(14));
    let report = ctl.cycle().unwrap();
    assert!(is_close(report.action));
    ctl.join_pending_open();

    assert_eq!(sim.shutters(), [ShutterState::Closed; 2]);
    assert_eq!(sim.closes(), 1);
}
