//! Appliance Advisor library
//!
//! Turns per-device power traces into usage cycles, scores appliance
//! efficiency against room conditions, and schedules deduplicated
//! energy notifications. The daemon and the demo binary are thin shells
//! around these modules.

pub mod advisor;
pub mod core;
pub mod db;
pub mod influx;
pub mod pricing;
pub mod push;
pub mod scheduler;
pub mod usage;
