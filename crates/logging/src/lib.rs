//! veilhop Logging
//!
//! `tracing-subscriber` setup shared by the node and the CLI.
//!
//! ```no_run
//! use veilhop_logging::{init, LogLevel};
//!
//! init(LogLevel::from_verbosity(1));
//! ```
//!
//! `RUST_LOG` always wins over the level passed in.

use tracing_subscriber::EnvFilter;

/// Directives appended to the chosen level so swarm internals stay quiet
/// unless explicitly asked for through `RUST_LOG`.
const QUIET_DEPENDENCIES: &[&str] = &[
    "libp2p_mdns=warn",
    "libp2p_kad=warn",
    "libp2p_swarm=warn",
    "libp2p_tcp=warn",
    "libp2p_quic=warn",
    "yamux=warn",
    "multistream_select=warn",
];

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    /// Default
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Create a log level from a verbosity count
    ///
    /// - `0` → `Info`
    /// - `1` → `Debug`
    /// - `2+` → `Trace`
    pub fn from_verbosity(count: u8) -> Self {
        match count {
            0 => Self::Info,
            1 => Self::Debug,
            _ => Self::Trace,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Filter directive string for this level
    fn directives(&self) -> String {
        if *self == Self::Trace {
            return self.as_str().to_string();
        }
        let mut parts = vec![self.as_str()];
        parts.extend_from_slice(QUIET_DEPENDENCIES);
        parts.join(",")
    }
}

/// Initialize logging with the specified level
///
/// # Panics
///
/// Panics if a global subscriber is already installed. Use `try_init` to
/// handle that case.
pub fn init(level: LogLevel) {
    try_init(level).expect("Failed to initialize logging");
}

/// Try to initialize logging, returning an error if already initialized
pub fn try_init(level: LogLevel) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.directives()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(level >= LogLevel::Debug)
        .try_init()
        .map_err(|e| e.to_string())
}
