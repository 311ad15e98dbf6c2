//! Progress events for the multiverse harness
//!
//! Readiness, phase dispatch and sync progress is published here so
//! callers can observe a run without scraping logs.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
