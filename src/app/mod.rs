//! Application core for one dome.
//!
//! The rules that decide whether an enclosure opens or closes live in
//! [`service`]; every external collaborator is reached through the
//! **port traits** in [`ports`], so the controller runs unchanged against
//! real drivers, the simulated enclosure or test doubles.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
