//! Observability.
//!
//! The crate emits `tracing` spans/events and `metrics` counters and
//! histograms throughout; this module provides the subscriber setup for
//! embedders that do not install their own.

mod logging;

pub use logging::init_logging;
