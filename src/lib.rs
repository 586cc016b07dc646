//! Stepwise library interface
//!
//! Step-driven acceptance testing for HTTP APIs and shell commands. Steps
//! send requests, assert on responses, run commands and thread values
//! between each other through a per-scenario variable store.
//!
//! # Module Organization
//!
//! - [`store`] - Typed variable store (Value, VariableStore)
//! - [`template`] - `${name}` substitution and type-preserving JSON templates
//! - [`compare`] - Structural equality and containment over JSON
//! - [`process`] - Shell commands with timeout and cancellation
//! - [`fake`] - Fake data specifications and generators
//! - [`json`] - Response property paths
//! - [`scenario`] - Scenario context, step operations and sentence registry
//! - [`config`] - Config file and environment
//! - [`logging`] - tracing subscriber setup
//! - [`errors`] - Error types (StepError, Result)

pub mod compare;
pub mod config;
pub mod errors;
pub mod fake;
pub mod json;
pub mod logging;
pub mod process;
pub mod scenario;
pub mod store;
pub mod template;

pub use config::Config;
pub use errors::{Result, StepError};
pub use scenario::{run_scenario, ScenarioContext, ScenarioOutcome, Step, StepRegistry};
pub use store::{Value, VariableStore};
