//! # lspbridge-settings
//!
//! Layered configuration for the LSP WebSocket bridge.
//!
//! Settings are loaded from these layers, lowest priority first:
//! 1. **Compiled defaults**: [`BridgeSettings::default()`]
//! 2. **Settings file**: `~/.lspbridge/settings.json` or an explicit path,
//!    deep-merged over defaults
//! 3. **Environment variables**: `LSPBRIDGE_*` overrides
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path, settings_path};
pub use types::{BridgeSettings, LoggingSettings, ProcessSettings, ServerSettings};
