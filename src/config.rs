//! Adapter configuration.

use std::os::unix::io::RawFd;
use std::time::Duration;

use log::LevelFilter;

/// Descriptor Martian's monitor passes the `_log` file on.
pub const MARTIAN_LOG_FD: RawFd = 3;
/// Descriptor Martian's monitor passes the `_errors` file on.
pub const MARTIAN_ERROR_FD: RawFd = 4;

/// How the adapter runs a stage phase.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Maximum level written to the Martian log.
    pub log_level: LevelFilter,

    /// How often the `heartbeat` journal is refreshed while a phase runs.
    pub heartbeat_interval: Duration,

    /// Inherited log descriptor; `_log` is opened when it is not a file.
    pub log_fd: RawFd,

    /// Inherited errors descriptor; `_errors` is written when it is not a file.
    pub error_fd: RawFd,

    /// Also copy log lines to stdout.
    pub log_to_stdout: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Debug,
            heartbeat_interval: Duration::from_secs(120),
            log_fd: MARTIAN_LOG_FD,
            error_fd: MARTIAN_ERROR_FD,
            log_to_stdout: true,
        }
    }
}
