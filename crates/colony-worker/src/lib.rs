//! Colony worker
//!
//! Registers a runtime with a colony server, then polls for assigned
//! processes, executes them and reports the outcome.
//!
//! # Flow
//! - Identity: fresh sr25519 key, runtime id persisted to disk
//! - Registration: add and approve the runtime with the colony key
//! - Loop: assign, execute, publish the result attribute, close
//! - Deregistration: separate entry path reading the persisted id

pub mod config;
pub mod context;
pub mod executor;
pub mod handler;
pub mod registration;
pub mod retry;
pub mod startup;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{DeregisterConfig, EnvSettings, ServerSettings, WorkerConfig};
pub use context::WorkerContext;
pub use executor::{DelayRange, Execution, TaskExecutor};
pub use handler::{FibonacciHandler, FibonacciMethod, HandlerRegistry, ResultFormat, TaskHandler};
pub use registration::Registrar;
pub use retry::{Backoff, RetryPolicy};
pub use worker::{Iteration, UnrecognizedPolicy, Worker, WorkerStats};
