//! Tracing/logging setup shared by the binary and tests.

pub mod logging;

pub use logging::{LogConfig, LogFormat, UnknownLogFormat, init};
