//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for testing the agent
//! without requiring an MQTT broker, plus in-memory log capture.

pub mod capture;
pub mod mocks;

pub use capture::CapturedLogs;
pub use mocks::*;
