//! feedback-eval library crate: the engine behind the `feval` binary.
//!
//! The modules are public so integration tests can drive the runner,
//! check engine and drift detector with stub clients instead of going
//! through the CLI.

pub mod checks;
pub mod client;
pub mod config;
pub mod constants;
pub mod corpus;
pub mod drift;
pub mod error;
pub mod judge;
pub mod model;
pub mod report;
pub mod retry;
pub mod runner;
pub mod telemetry;
