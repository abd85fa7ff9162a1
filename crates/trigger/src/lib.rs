//! Mirror Trigger
//!
//! Asks a job runner to start one run of a named mirror job. Optionally waits
//! for the run to reach a terminal status before reporting.

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod local;
pub mod retry;
pub mod runner;
pub mod trigger;

pub use client::HttpJobRunner;
pub use config::{TriggerConfig, WaitMode};
pub use error::{RunnerError, TriggerError};
pub use handler::{handle_invocation, TriggerResponse};
pub use local::LocalJobRunner;
pub use retry::RetryPolicy;
pub use runner::JobRunner;
pub use trigger::{JobTrigger, StartAck};
