//! CLI command implementations.

mod diag;
mod run;

pub use diag::{run_identity, run_init, run_status};
pub use run::run_agent;
