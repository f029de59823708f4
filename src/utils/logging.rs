//! Conditional logging macros for the per-tick paths.
//!
//! The monitor and detector run every second; each module that uses these
//! macros declares its own switch so the noise can be turned off locally:
//!
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_info};
//!
//! log_info!("overlay raised for {}", app_id);
//! ```

/// Info-level log gated on the calling module's `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Warn-level log gated on the calling module's `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Error-level log gated on the calling module's `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

/// Debug-level log for per-tick detail; gated like the others.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}
