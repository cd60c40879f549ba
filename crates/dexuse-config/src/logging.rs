//! Structured logging utilities for dexuse components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use dexuse_config::log_ledger_warn;
//!
//! log_ledger_warn!("Owner mismatch", package = "com.example.app");
//! ```

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const INDEX: &'static str = "INDEX";
    pub const LEDGER: &'static str = "LEDGER";
    pub const PERSIST: &'static str = "PERSIST";
    pub const MANAGER: &'static str = "MANAGER";
    pub const CLI: &'static str = "CLI";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Map a `-v` count to a level (0 = warn).
    pub fn from_verbosity(count: u8) -> Self {
        match count {
            0 => LogLevel::Warn,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// === INDEX logging macros ===

#[macro_export]
macro_rules! log_index_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::tracing::debug!(component = "INDEX", $($key = $value,)* $msg)
    };
}

// === LEDGER logging macros ===

#[macro_export]
macro_rules! log_ledger_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::tracing::warn!(component = "LEDGER", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_ledger_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::tracing::debug!(component = "LEDGER", $($key = $value,)* $msg)
    };
}

// === PERSIST logging macros ===

#[macro_export]
macro_rules! log_persist_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::tracing::error!(component = "PERSIST", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_persist_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::tracing::warn!(component = "PERSIST", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_persist_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::tracing::debug!(component = "PERSIST", $($key = $value,)* $msg)
    };
}

// === MANAGER logging macros ===

#[macro_export]
macro_rules! log_manager_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::tracing::error!(component = "MANAGER", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_manager_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::tracing::warn!(component = "MANAGER", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_manager_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::tracing::info!(component = "MANAGER", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_manager_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::tracing::debug!(component = "MANAGER", $($key = $value,)* $msg)
    };
}

// === CLI logging macros ===

#[macro_export]
macro_rules! log_cli_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::tracing::info!(component = "CLI", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cli_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::tracing::debug!(component = "CLI", $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup; later calls are ignored.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_constants() {
        assert_eq!(Component::LEDGER, "LEDGER");
        assert_eq!(Component::PERSIST, "PERSIST");
        assert_eq!(Component::MANAGER, "MANAGER");
    }

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(LogLevel::from_verbosity(0), LogLevel::Warn);
        assert_eq!(LogLevel::from_verbosity(2), LogLevel::Debug);
        assert_eq!(LogLevel::from_verbosity(9), LogLevel::Trace);
    }

    #[test]
    fn test_macros_expand() {
        init_logging(LogLevel::Debug);
        crate::log_ledger_debug!("ledger event", package = "com.example.app");
        crate::log_persist_warn!("persist event", attempts = 2);
    }
}
