//! Shared test utilities for vidscribe integration tests.
//!
//! This module provides:
//! - Fake backends with scripted behaviour (`fakes`)
//! - `TestHarness` wiring a `JobManager` to those fakes

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::{test_config, TestHarness};
