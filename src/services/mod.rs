//! Background services

pub mod access_log;

pub use access_log::{AccessLog, AccessLogWriter};
