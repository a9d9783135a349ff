//! Shared utilities for the research pipeline
//!
//! Tracing setup for binaries and small helpers for reading client
//! credentials from the process environment.

pub mod env;
pub mod logging;

pub use env::{EnvError, optional_env, parsed_env, required_env};
pub use logging::{LogFormat, init_tracing, init_tracing_with};
