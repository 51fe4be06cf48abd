//! Core infrastructure: configuration, identity, logging.

pub mod config;
pub mod identity;
pub mod telemetry;
