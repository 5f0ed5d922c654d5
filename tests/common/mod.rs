//! Shared test utilities for integration tests.
//!
//! This module provides:
//! - Mock DataSource for recording calls
//! - Record and schema fixtures

pub mod mock_source;

pub use mock_source::*;
