//! Shared test utilities for armrip integration tests.
//!
//! This module provides:
//! - `TestHarness`: temp disc tree, work directories, in-memory database
//! - Fakes for external tools, metadata providers, the AI endpoint and
//!   notification channels

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::TestHarness;
