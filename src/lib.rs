//! domewatch library.
//!
//! Exposes the decision engine, the per-dome controller and the supervisor
//! for the daemon binary, integration tests and fuzzing.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fsm;
pub mod gate;
pub mod safety;
pub mod scheduler;
pub mod supervisor;
pub mod weather;
