//! Student housing allocation engine with its configuration and telemetry bootstrap.

pub mod config;
pub mod error;
pub mod housing;
pub mod telemetry;
