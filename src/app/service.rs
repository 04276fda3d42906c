//! Dome controller: the hexagonal core for one enclosure.
//!
//! [`DomeController`] owns the phase machine, the weather evaluator and the
//! per-dome blackboard.  It exposes one operation, [`cycle`], that the loop
//! in [`run`] calls on a fixed cadence.  All I/O flows through the port
//! trait objects in [`DomePorts`], making the controller testable with mock
//! adapters.
//!
//! ```text
//!  WeatherSource  ──▶ ┌──────────────────────────┐ ──▶ AlertSink
//!  OverrideSource ──▶ │     DomeController        │ ──▶ StatusPublisher
//!                     │  Evaluator · FSM · Rules  │
//!  HardwareSession ◀─▶└──────────────────────────┘
//! ```
//!
//! ## One cycle
//!
//! 1. Reap a finished background open.
//! 2. Refresh weather when due; keep the last good snapshot on failure.
//! 3. Read hardware status, overrides and the manual gate.
//! 4. Evaluate safety and carry out gate side effects.
//! 5. Choose the action (first match wins): estop → unsafe weather →
//!    hysteresis → not requested → open.
//! 6. Execute it.  Only the open branch sends a heartbeat.
//! 7. Re-read status, tick the phase machine, publish `{now, is_open}`.
//! 8. Query the emergency stop and alert on transitions.
//!
//! [`cycle`]: DomeController::cycle
//! [`run`]: DomeController::run

use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use crate::config::{DomeConfig, SiteConfig, secs};
use crate::diagnostics::LoopMetrics;
use crate::error::{Error, HardwareError};
use crate::fsm::context::DomeState;
use crate::fsm::states::build_phase_table;
use crate::fsm::{DomePhase, Fsm};
use crate::gate::GateEffect;
use crate::safety::{Conditions, SafetyDecision, WeatherEvaluator};
use crate::scheduler::{Cadence, RefreshTimer};
use crate::supervisor::ShutdownSignal;
use crate::weather::WeatherSnapshot;

use super::commands::{CloseCause, ControlAction};
use super::events::Alert;
use super::ports::{
    Capabilities, DomePorts, HardwareStatus, OverrideFlags, ShutterState, StatusRecord,
};

/// How often loop metrics are written to the log.
const METRICS_LOG_INTERVAL_SECS: u64 = 15 * 60;

/// What one cycle decided and observed.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub at: DateTime<Utc>,
    pub action: ControlAction,
    pub decision: SafetyDecision,
    pub phase: DomePhase,
    /// Record written this cycle, if the status read and publish succeeded.
    pub published: Option<StatusRecord>,
}

// ───────────────────────────────────────────────────────────────
// DomeController
// ───────────────────────────────────────────────────────────────

/// Control loop for one enclosure.
pub struct DomeController {
    dome: DomeConfig,
    ports: DomePorts,
    capabilities: Capabilities,
    fsm: Fsm,
    state: DomeState,
    evaluator: WeatherEvaluator,
    /// Last good snapshot.
    weather: Option<WeatherSnapshot>,
    weather_timer: RefreshTimer,
    metrics_timer: RefreshTimer,
    hysteresis: chrono::Duration,
    cadence: Cadence,
    open_task: Option<JoinHandle<Result<(), HardwareError>>>,
    metrics: LoopMetrics,
}

impl DomeController {
    /// Build a controller and start its phase machine.
    pub fn new(site: &SiteConfig, dome: DomeConfig, ports: DomePorts) -> Self {
        let capabilities = ports.hardware.capabilities();
        let mut state = DomeState::new(&dome.id);
        let mut fsm = Fsm::new(build_phase_table(), DomePhase::Unknown);
        fsm.start(&mut state);

        info!(
            "{}: controller ready (reverse={}, partial_open={}, estop_detection={}, abort={})",
            dome.id,
            dome.reverse,
            dome.partial_open && capabilities.partial_open,
            dome.estop_detection && capabilities.estop_detection,
            capabilities.abort
        );

        Self {
            evaluator: WeatherEvaluator::new(site),
            weather: None,
            weather_timer: RefreshTimer::new(secs(site.weather_refresh_secs)),
            metrics_timer: RefreshTimer::new(secs(METRICS_LOG_INTERVAL_SECS)),
            hysteresis: secs(site.hysteresis_secs),
            cadence: Cadence::new(site.cycle_period()),
            open_task: None,
            metrics: LoopMetrics::default(),
            dome,
            ports,
            capabilities,
            fsm,
            state,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Run cycles until `shutdown` fires or a fatal error occurs.
    pub fn run(&mut self, shutdown: &ShutdownSignal) -> Result<(), Error> {
        info!("{}: control loop started", self.dome.id);
        while !shutdown.is_triggered() {
            let timer = self.cadence.start();
            if let Err(e) = self.cycle() {
                self.join_pending_open();
                return Err(e);
            }
            if timer.overran() {
                self.metrics.overruns += 1;
                warn!(
                    "{}: cycle took {:?}, longer than {:?}",
                    self.dome.id,
                    timer.elapsed(),
                    self.cadence.period()
                );
            }
            let now = self.ports.clock.now();
            if self.metrics_timer.is_due(now) {
                self.metrics_timer.mark(now);
                info!("{}: {}", self.dome.id, self.metrics);
            }
            if shutdown.wait_for(timer.remaining()) {
                break;
            }
        }
        self.join_pending_open();
        info!("{}: control loop stopped ({})", self.dome.id, self.metrics);
        Ok(())
    }

    /// One pass of the control rules.  Only a fatal hardware error is
    /// returned; everything else is logged and retried next cycle.
    pub fn cycle(&mut self) -> Result<CycleReport, Error> {
        let now = self.ports.clock.now();
        self.metrics.cycles += 1;

        self.reap_open_task()?;
        self.refresh_weather(now);

        // ── Inputs ────────────────────────────────────────────
        let status = self.read_status()?;
        let dome_open = match &status {
            Some(s) => s.is_open(),
            // Unknown position: judge by the opening limits.
            None => false,
        };
        let flags = self.read_flags();
        let manual_gate = self.read_manual_gate(now);

        // ── Safety ────────────────────────────────────────────
        let cond = Conditions {
            dome_open,
            weather: self.weather.as_ref(),
            overrides: flags,
            manual_gate,
            now,
        };
        let assessment = self.evaluator.evaluate(&cond, false);
        self.apply_gate_effects(&assessment.gate_effects);
        let decision = assessment.decision;

        // ── Decide and act ────────────────────────────────────
        let action = self.decide(&decision, flags, now);
        self.state.intent = Some(action);
        match action {
            ControlAction::Close { cause } => self.close(cause)?,
            ControlAction::Open {
                reverse,
                single_shutter,
            } => {
                self.open(status.as_ref(), reverse, single_shutter);
                self.heartbeat()?;
            }
        }
        self.state.open_in_flight = self.open_task.is_some();

        // ── Observe and publish ───────────────────────────────
        let fresh = self.read_status()?;
        self.fsm.tick(&mut self.state);
        let published = fresh.and_then(|s| self.publish(now, s.is_open()));

        self.check_estop()?;

        Ok(CycleReport {
            at: now,
            action,
            decision,
            phase: self.fsm.current_state(),
            published,
        })
    }

    /// Wait for a background open to finish.
    pub fn join_pending_open(&mut self) {
        if let Some(handle) = self.open_task.take() {
            match handle.join() {
                Ok(Ok(())) => debug!("{}: pending open finished", self.dome.id),
                Ok(Err(e)) => warn!("{}: pending open failed: {e}", self.dome.id),
                Err(_) => error!("{}: open thread panicked", self.dome.id),
            }
        }
        self.state.open_in_flight = false;
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn id(&self) -> &str {
        &self.dome.id
    }

    pub fn phase(&self) -> DomePhase {
        self.fsm.current_state()
    }

    pub fn state(&self) -> &DomeState {
        &self.state
    }

    pub fn metrics(&self) -> LoopMetrics {
        self.metrics
    }

    pub fn weather(&self) -> Option<&WeatherSnapshot> {
        self.weather.as_ref()
    }

    // ── Rules ─────────────────────────────────────────────────

    /// Per-cycle rules, first match wins.
    fn decide(
        &mut self,
        decision: &SafetyDecision,
        flags: OverrideFlags,
        now: DateTime<Utc>,
    ) -> ControlAction {
        if self.state.estop_active {
            return ControlAction::Close {
                cause: CloseCause::Estop,
            };
        }
        if !decision.ok {
            if !decision.ok_ignoring_sun {
                self.state.note_bad_weather(now);
            }
            return ControlAction::Close {
                cause: CloseCause::Weather {
                    sun_only: decision.ok_ignoring_sun,
                },
            };
        }
        if !flags.timeout {
            if let Some(since) = self.state.in_hysteresis(now, self.hysteresis) {
                return ControlAction::Close {
                    cause: CloseCause::Hysteresis { since },
                };
            }
        }
        if !flags.open_requested {
            return ControlAction::Close {
                cause: CloseCause::NotRequested,
            };
        }
        ControlAction::Open {
            reverse: self.dome.reverse,
            single_shutter: flags.sun && self.dome.partial_open && self.capabilities.partial_open,
        }
    }

    // ── Commands ──────────────────────────────────────────────

    fn close(&mut self, cause: CloseCause) -> Result<(), Error> {
        debug!("{}: closing ({cause})", self.dome.id);
        let hw = &self.ports.hardware;

        if self.open_task.is_some() && self.capabilities.abort {
            info!("{}: aborting open in progress ({cause})", self.dome.id);
            if let Err(e) = hw.abort() {
                self.metrics.command_failures += 1;
                warn!("{}: abort failed: {e}", self.dome.id);
                if e.is_fatal() {
                    return Err(e.into());
                }
            }
        }

        if let Err(e) = hw.close() {
            self.metrics.command_failures += 1;
            error!("{}: close failed, retrying next cycle: {e}", self.dome.id);
            if e.is_fatal() {
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Start an open on a background thread unless one is running or the
    /// enclosure is already open.
    fn open(&mut self, status: Option<&HardwareStatus>, reverse: bool, single_shutter: bool) {
        if self.open_task.is_some() {
            debug!("{}: open already in progress", self.dome.id);
            return;
        }
        let already_open = status.is_some_and(|s| {
            if single_shutter {
                !s.any_moving() && s.shutters.contains(&ShutterState::Open)
            } else {
                s.is_open()
            }
        });
        if already_open {
            return;
        }

        info!(
            "{}: opening (reverse={reverse}, single_shutter={single_shutter})",
            self.dome.id
        );
        let hw = self.ports.hardware.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("{}_OPEN", self.dome.id))
            .spawn(move || hw.open(reverse, single_shutter));
        match spawned {
            Ok(handle) => self.open_task = Some(handle),
            Err(e) => {
                self.metrics.command_failures += 1;
                error!("{}: cannot start open thread: {e}", self.dome.id);
            }
        }
    }

    fn heartbeat(&mut self) -> Result<(), Error> {
        match self.ports.hardware.heartbeat() {
            Ok(()) => {
                self.metrics.heartbeats_sent += 1;
                Ok(())
            }
            Err(e) => {
                self.metrics.heartbeat_failures += 1;
                error!("{}: heartbeat failed: {e}", self.dome.id);
                if e.is_fatal() { Err(e.into()) } else { Ok(()) }
            }
        }
    }

    /// Join the open thread if it has finished.  The outcome is only
    /// logged: the phase follows the next status read.
    fn reap_open_task(&mut self) -> Result<(), Error> {
        if !self.open_task.as_ref().is_some_and(JoinHandle::is_finished) {
            return Ok(());
        }
        let Some(handle) = self.open_task.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(Ok(())) => info!("{}: open command completed", self.dome.id),
            Ok(Err(e)) => {
                self.metrics.command_failures += 1;
                error!("{}: open failed: {e}", self.dome.id);
                if e.is_fatal() {
                    return Err(e.into());
                }
            }
            Err(_) => {
                self.metrics.command_failures += 1;
                error!("{}: open thread panicked", self.dome.id);
            }
        }
        Ok(())
    }

    // ── Inputs ────────────────────────────────────────────────

    fn refresh_weather(&mut self, now: DateTime<Utc>) {
        if self.weather.is_some() && !self.weather_timer.is_due(now) {
            return;
        }
        match self.ports.weather.current_snapshot() {
            Ok(snapshot) => {
                debug!("{}: weather snapshot from {}", self.dome.id, snapshot.timestamp);
                self.weather = Some(snapshot);
                self.weather_timer.mark(now);
            }
            Err(e) => {
                self.metrics.weather_failures += 1;
                error!("{}: weather refresh failed, keeping last snapshot: {e}", self.dome.id);
            }
        }
    }

    /// Status read.  Transient failures yield `None`; session loss is fatal.
    fn read_status(&mut self) -> Result<Option<HardwareStatus>, Error> {
        match self.ports.hardware.status() {
            Ok(status) => {
                self.state.ready = status.ready;
                self.state.fault = status.fault;
                if let Some(err) = &status.error {
                    warn!("{}: controller reports: {err}", self.dome.id);
                }
                self.state.observed = Some(status.clone());
                Ok(Some(status))
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                self.metrics.status_failures += 1;
                error!("{}: status read failed: {e}", self.dome.id);
                Ok(None)
            }
        }
    }

    /// Override flags.  A failed read means no overrides and no request.
    fn read_flags(&self) -> OverrideFlags {
        self.ports
            .overrides
            .flags(&self.dome.id)
            .unwrap_or_else(|e| {
                error!("{}: cannot read overrides, assuming none: {e}", self.dome.id);
                OverrideFlags::default()
            })
    }

    /// Manual gate.  A failed read is treated as a gate set just now.
    fn read_manual_gate(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.ports.overrides.manual_decision().unwrap_or_else(|e| {
            error!("{}: cannot read manual decision, assuming active: {e}", self.dome.id);
            Some(now)
        })
    }

    // ── Outputs ───────────────────────────────────────────────

    fn apply_gate_effects(&self, effects: &[GateEffect]) {
        for effect in effects {
            match *effect {
                GateEffect::Reset { to } | GateEffect::Engage { to } => {
                    if let Err(e) = self.ports.overrides.reset_manual_decision(to) {
                        error!("{}: cannot write manual decision: {e}", self.dome.id);
                    }
                }
                GateEffect::RequestInspection => {
                    self.ports.alerts.send(&Alert::inspection_required(&self.dome.id));
                }
                GateEffect::Resumed => {
                    self.ports.alerts.send(&Alert::inspection_done(&self.dome.id));
                }
            }
        }
    }

    fn publish(&mut self, now: DateTime<Utc>, is_open: bool) -> Option<StatusRecord> {
        let record = StatusRecord {
            timestamp: now,
            is_open,
        };
        match self.ports.status.publish(&self.dome.id, &record) {
            Ok(()) => Some(record),
            Err(e) => {
                self.metrics.status_failures += 1;
                error!("{}: cannot publish status: {e}", self.dome.id);
                None
            }
        }
    }

    fn check_estop(&mut self) -> Result<(), Error> {
        if !(self.dome.estop_detection && self.capabilities.estop_detection) {
            return Ok(());
        }
        let active = match self.ports.hardware.estop_active() {
            Ok(active) => active,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!("{}: estop query failed: {e}", self.dome.id);
                return Ok(());
            }
        };

        if active && !self.state.estop_alert_sent {
            error!("{}: emergency stop active", self.dome.id);
            self.ports.alerts.send(&Alert::estop_tripped(&self.dome.id));
            self.state.estop_alert_sent = true;
        } else if !active && self.state.estop_alert_sent {
            info!("{}: emergency stop cleared", self.dome.id);
            self.ports.alerts.send(&Alert::estop_cleared(&self.dome.id));
            self.state.estop_alert_sent = false;
        }
        self.state.estop_active = active;
        Ok(())
    }
}
