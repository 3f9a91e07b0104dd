//! Logging setup for Mongolid.
//!
//! Structured logging is controlled by environment variables:
//!
//! - `MONGOLID_DEBUG=true` (or `1`, `yes`) - Enable debug logging
//! - `MONGOLID_LOG_LEVEL=debug|info|warn|error|trace` - Set a specific level
//! - `MONGOLID_LOG_FORMAT=json|pretty|compact` - Output format (default: json)
//!
//! The subscriber is only installed with the `tracing-subscriber` feature.
//! Without it, events go to whatever subscriber the application installs.
//!
//! ```rust,no_run
//! use mongolid_core::logging;
//!
//! logging::init();
//! ```

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `MONGOLID_DEBUG`.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("MONGOLID_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Get the configured log level from `MONGOLID_LOG_LEVEL`.
///
/// Defaults to "debug" if `MONGOLID_DEBUG` is enabled, otherwise "warn".
pub fn get_log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("MONGOLID_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// Get the configured log format from `MONGOLID_LOG_FORMAT`.
pub fn get_log_format() -> &'static str {
    env::var("MONGOLID_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Initialize logging. Subsequent calls are no-ops.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("MONGOLID_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!(
                "mongolid={},mongolid_core={},mongolid_mongodb={}",
                level, level, level
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            match get_log_format() {
                "json" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
                "compact" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().compact())
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().pretty())
                        .init();
                }
            }

            tracing::info!(
                level = level,
                format = get_log_format(),
                "Mongolid logging initialized"
            );
        }
    });
}
