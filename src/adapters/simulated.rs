//! In-memory dual-shutter enclosure.
//!
//! Behaves like the real roll-off controllers closely enough to run the
//! daemon end-to-end and to exercise the controller in tests:
//!
//! - shutters travel for `travel_time` when opening;
//! - without a heartbeat (or open command) for `heartbeat_timeout` the
//!   enclosure closes itself;
//! - an active emergency stop rejects opening and stops the shutters;
//! - `abort` stops a running open;
//! - `drop_session` makes every later call fail with `SessionLost`.

use std::time::{Duration, Instant};

use log::{info, warn};
use parking_lot::Mutex;

use crate::app::ports::{Capabilities, HardwareSession, HardwareStatus, ShutterState};
use crate::error::HardwareError;

const SHUTTERS: usize = 2;
const POLL: Duration = Duration::from_millis(5);

#[derive(Debug)]
struct SimState {
    shutters: [ShutterState; SHUTTERS],
    last_heartbeat: Option<Instant>,
    estop: bool,
    abort_requested: bool,
    session_lost: bool,
    heartbeats: u64,
    opens: u64,
    closes: u64,
}

pub struct SimulatedDome {
    state: Mutex<SimState>,
    heartbeat_timeout: Duration,
    travel_time: Duration,
    capabilities: Capabilities,
}

impl SimulatedDome {
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(SimState {
                shutters: [ShutterState::Closed; SHUTTERS],
                last_heartbeat: None,
                estop: false,
                abort_requested: false,
                session_lost: false,
                heartbeats: 0,
                opens: 0,
                closes: 0,
            }),
            heartbeat_timeout,
            travel_time: Duration::from_secs(2),
            capabilities: Capabilities {
                estop_detection: true,
                partial_open: true,
                abort: true,
            },
        }
    }

    pub fn with_travel_time(mut self, travel_time: Duration) -> Self {
        self.travel_time = travel_time;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    // ── Test and simulation hooks ─────────────────────────────

    pub fn set_estop(&self, active: bool) {
        let mut s = self.state.lock();
        s.estop = active;
        if active {
            s.abort_requested = true;
            for shutter in &mut s.shutters {
                if *shutter == ShutterState::Opening {
                    *shutter = ShutterState::Unknown;
                }
            }
        }
    }

    pub fn drop_session(&self) {
        self.state.lock().session_lost = true;
    }

    pub fn shutters(&self) -> [ShutterState; SHUTTERS] {
        let mut s = self.state.lock();
        self.watchdog(&mut s);
        s.shutters
    }

    pub fn heartbeats(&self) -> u64 {
        self.state.lock().heartbeats
    }

    pub fn opens(&self) -> u64 {
        self.state.lock().opens
    }

    pub fn closes(&self) -> u64 {
        self.state.lock().closes
    }

    // ── Internal ──────────────────────────────────────────────

    /// Close everything if heartbeats stopped while not closed.
    fn watchdog(&self, s: &mut SimState) {
        let expired = s
            .last_heartbeat
            .is_some_and(|at| at.elapsed() > self.heartbeat_timeout);
        let exposed = s.shutters.iter().any(|sh| *sh != ShutterState::Closed);
        if expired && exposed {
            warn!("Simulated dome: heartbeat timeout, closing");
            s.shutters = [ShutterState::Closed; SHUTTERS];
            s.abort_requested = true;
        }
    }

    fn session(&self) -> Result<parking_lot::MutexGuard<'_, SimState>, HardwareError> {
        let mut s = self.state.lock();
        if s.session_lost {
            return Err(HardwareError::SessionLost("simulated session dropped".into()));
        }
        self.watchdog(&mut s);
        Ok(s)
    }

    /// Move one shutter to open, polling for abort while it travels.
    fn travel(&self, idx: usize) -> Result<(), HardwareError> {
        {
            let mut s = self.session()?;
            if s.abort_requested {
                return Err(aborted());
            }
            s.shutters[idx] = ShutterState::Opening;
        }
        let started = Instant::now();
        while started.elapsed() < self.travel_time {
            std::thread::sleep(POLL.min(self.travel_time));
            let s = self.session()?;
            if s.abort_requested || s.shutters[idx] != ShutterState::Opening {
                return Err(aborted());
            }
        }
        let mut s = self.session()?;
        if s.abort_requested || s.shutters[idx] != ShutterState::Opening {
            return Err(aborted());
        }
        s.shutters[idx] = ShutterState::Open;
        Ok(())
    }
}

fn aborted() -> HardwareError {
    HardwareError::CommandRejected {
        command: "OPEN",
        detail: "open interrupted".into(),
    }
}

impl HardwareSession for SimulatedDome {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn status(&self) -> Result<HardwareStatus, HardwareError> {
        let s = self.session()?;
        Ok(HardwareStatus {
            shutters: s.shutters.to_vec(),
            fault: s.estop,
            error: s.estop.then(|| "Estop active".to_owned()),
            ready: !s.estop,
        })
    }

    fn open(&self, reverse: bool, single_shutter: bool) -> Result<(), HardwareError> {
        {
            let mut s = self.session()?;
            if s.estop {
                return Err(HardwareError::CommandRejected {
                    command: "OPEN",
                    detail: "Estop active".into(),
                });
            }
            if single_shutter && !self.capabilities.partial_open {
                return Err(HardwareError::Unsupported("single shutter open"));
            }
            s.abort_requested = false;
            s.last_heartbeat = Some(Instant::now());
            s.opens += 1;
        }
        let order: [usize; SHUTTERS] = if reverse { [1, 0] } else { [0, 1] };
        let count = if single_shutter { 1 } else { SHUTTERS };
        for &idx in &order[..count] {
            self.travel(idx)?;
        }
        info!("Simulated dome: open complete (reverse={reverse}, single={single_shutter})");
        Ok(())
    }

    fn close(&self) -> Result<(), HardwareError> {
        let mut s = self.session()?;
        s.abort_requested = true;
        s.shutters = [ShutterState::Closed; SHUTTERS];
        s.closes += 1;
        Ok(())
    }

    fn heartbeat(&self) -> Result<(), HardwareError> {
        let mut s = self.session()?;
        s.last_heartbeat = Some(Instant::now());
        s.heartbeats += 1;
        Ok(())
    }

    fn estop_active(&self) -> Result<bool, HardwareError> {
        if !self.capabilities.estop_detection {
            return Err(HardwareError::Unsupported("estop query"));
        }
        Ok(self.session()?.estop)
    }

    fn abort(&self) -> Result<(), HardwareError> {
        if !self.capabilities.abort {
            return Err(HardwareError::Unsupported("abort"));
        }
        let mut s = self.session()?;
        s.abort_requested = true;
        for shutter in &mut s.shutters {
            if *shutter == ShutterState::Opening {
                *shutter = ShutterState::Closed;
            }
        }
        Ok(())
    }
}
