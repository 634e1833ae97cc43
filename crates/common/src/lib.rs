//! Ambient plumbing shared by the sync committee crates: logging setup and prometheus metrics.

pub mod logging;
pub mod metrics;
