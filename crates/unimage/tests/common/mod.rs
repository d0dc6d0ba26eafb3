//! Shared test utilities for unimage integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated studio instances over temp directories
//! - Helpers for scripting stub replies and draining studio events

pub mod harness;

pub use harness::*;
