//! Minimal HTTP service with a scoped listener lifecycle.
//!
//! The service answers `GET /` with `200 OK`. Around that contract the crate
//! provides what a deployable instance and its test harness need:
//!
//! ```text
//! bind (fixed or ephemeral port)
//!   -> serve in the background
//!   -> GET /            expect 200
//!   -> shutdown         port released, further requests refused
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`api`]: HTTP API (root, health, readiness, metrics)
//! - [`server`]: Listener bind/serve/shutdown lifecycle
//! - [`probe`]: GET-and-check client for running instances
//! - [`metrics`]: Prometheus metric names and recorders
//! - [`utils`]: Utility functions

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod server;
pub mod utils;

pub use config::Config;
pub use error::{Result, ServerError};
pub use probe::Probe;
pub use server::{RunningServer, Server};
