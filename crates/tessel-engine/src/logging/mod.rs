//! Logging utilities.
//!
//! The engine only speaks the `log` facade. Binaries and tests call
//! [`init_logging`] once to install `env_logger` behind it.

mod init;

pub use init::{init_logging, LoggingConfig};
