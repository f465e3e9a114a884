//! Runtime configuration.
//!
//! Provides a single `AppConfig` loaded once at startup, replacing scattered
//! constants with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `AVIAN_CONFIG` environment variable (path to TOML file)
//! 2. `avian.toml` in the current working directory
//! 3. Built-in defaults (matching the defaults named throughout the design)
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! config::init(AppConfig::load());
//! let port = config::get().server.port;
//! ```

pub mod defaults;

mod app_config;

pub use app_config::*;

use std::sync::OnceLock;

static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Initialize the global application configuration.
///
/// Must be called exactly once before any calls to `get()`.
pub fn init(config: AppConfig) {
    if APP_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global application configuration.
///
/// Panics if `init()` has not been called — a missing config is a fatal
/// startup error, not a recoverable condition.
pub fn get() -> &'static AppConfig {
    APP_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    APP_CONFIG.get().is_some()
}
