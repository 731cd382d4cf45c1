//! Logger setup and conditional logging macros.
//!
//! The macros check a module-level `ENABLE_LOGS` flag so chatty per-reading modules
//! can be silenced without touching `RUST_LOG`:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_info, log_warn, log_error, log_debug};
//!
//! log_info!("appended row {}", id);
//! ```

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs `env_logger` at `Info`, overridable through `RUST_LOG`.
///
/// Safe to call more than once; embedders that already installed a logger are left alone.
pub fn init() {
    INIT.call_once(|| {
        let result = env_logger::Builder::new()
            .filter_level(log::LevelFilter::Info)
            .parse_default_env()
            .try_init();
        if result.is_ok() {
            log::info!("stepledger logging initialized");
        }
    });
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}
