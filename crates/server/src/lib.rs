//! HTTP service exposing the sluice download and storage tasks.

pub mod api;
pub mod metrics;
pub mod state;
