//! Shared test utilities for coverage-improver integration tests.
//!
//! This module provides:
//! - Fake AI workers with controllable timing and results
//! - `Harness` wiring an in-memory store, processor and scheduler together
//! - `GatedStore` for holding a sweep open mid-tick

pub mod harness;
pub mod workers;

pub use harness::{harness, GatedStore, Harness};
pub use workers::{GatedWorker, ScriptedWorker};
