//! Utility functions and helpers for the velvet gateway.
//!
//! This module provides cross-cutting concerns like structured logging,
//! credential sanitization, and retry logic with exponential backoff.
//!
//! # Submodules
//!
//! - `logging`: Tracing initialization with log-hygiene helpers.
//! - `retry`: Attempt-budgeted retries for upstream calls.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod logging;
pub mod retry;
