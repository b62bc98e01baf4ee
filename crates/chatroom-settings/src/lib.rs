//! # chatroom-settings
//!
//! Layered configuration for the chat room binaries.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ChatSettings::default()`]
//! 2. **Settings file**: `$CHATROOM_SETTINGS`, else `~/.chatroom/settings.json`
//!    (deep-merged over defaults; a missing file is not an error)
//! 3. **Environment variables**: `CHATROOM_*` overrides (highest priority)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
