/*!

`kong-utils` holds what the `kong` binary and test suites share around the waiting primitives:
logger setup, settings read from the environment, and JSON display helpers.

!*/

use constants::DEFAULT_LEVEL_FILTER;
use env_logger::Builder;
pub use error::{Error, Result};
use log::LevelFilter;
use serde::Serialize;
pub use settings::Settings;
use std::env;

pub mod constants;
mod error;
mod settings;

/// Extract the value of `RUST_LOG` if it exists, otherwise log this application at
/// `log_level`, or `DEFAULT_LEVEL_FILTER` if none is given.
pub fn init_logger(bin_crate: &str, log_level: Option<LevelFilter>) {
    match env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            let log_level = log_level.unwrap_or(DEFAULT_LEVEL_FILTER);
            Builder::new()
                // Set log level to Error for crates other than our own.
                .filter_level(LevelFilter::Error)
                .filter(Some(bin_crate), log_level)
                .filter(Some("kong_utils"), log_level)
                .filter(Some("kong_waiter"), log_level)
                .init();
        }
    }
}

/// Print a value using `serde_json` `to_string_pretty` for types that implement Serialize.
pub fn json_display<T: Serialize>(object: T) -> String {
    serde_json::to_string_pretty(&object).unwrap_or_else(|e| format!("Serialization failed: {}", e))
}

/// Implement `Display` using `serde_json` `to_string_pretty` for types that implement Serialize.
#[macro_export]
macro_rules! impl_display_as_json {
    ($i:ident) => {
        impl std::fmt::Display for $i {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&$crate::json_display(self), f)
            }
        }
    };
}
