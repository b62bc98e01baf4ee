//! Settings file discovery, deep merge and environment overrides.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, SettingsError};
use crate::types::ChatSettings;

/// Environment variable naming an explicit settings file.
pub const SETTINGS_ENV: &str = "CHATROOM_SETTINGS";

/// Resolve the settings file location.
///
/// `$CHATROOM_SETTINGS` wins; otherwise `~/.chatroom/settings.json`, or
/// `./.chatroom/settings.json` when no home directory is known.
pub fn settings_path() -> PathBuf {
    if let Some(explicit) = std::env::var_os(SETTINGS_ENV) {
        return PathBuf::from(explicit);
    }
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map_or_else(|| PathBuf::from("."), PathBuf::from);
    home.join(".chatroom").join("settings.json")
}

/// Load settings from the default path with environment overrides.
pub fn load_settings() -> Result<ChatSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path`, deep-merged over defaults, then apply
/// environment overrides and [`ChatSettings::validate`].
///
/// A missing file yields defaults.
pub fn load_settings_from_path(path: &Path) -> Result<ChatSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings, |var| std::env::var(var).ok())?;
    settings.validate();
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<ChatSettings> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(?path, "no settings file, using defaults");
            return Ok(ChatSettings::default());
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let parse_err = |source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let user: Value = serde_json::from_str(&raw).map_err(parse_err)?;
    let defaults = serde_json::to_value(ChatSettings::default()).map_err(parse_err)?;
    let merged = deep_merge(defaults, user);
    let settings = serde_json::from_value(merged).map_err(parse_err)?;
    tracing::debug!(?path, "settings file loaded");
    Ok(settings)
}

/// Recursively merge `overlay` into `base`. Objects merge key by key;
/// every other value in `overlay` replaces the one in `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

/// Apply `CHATROOM_*` overrides read through `lookup`.
///
/// | Variable | Field |
/// |----------|-------|
/// | `CHATROOM_HOST` | `server.host` |
/// | `CHATROOM_PORT` | `server.port` and `client.serverPort` |
/// | `CHATROOM_MAX_CONNECTIONS` | `server.maxConnections` |
/// | `CHATROOM_LOG` | `logging.level` |
/// | `CHATROOM_LOG_JSON` | `logging.json` |
pub fn apply_env_overrides(
    settings: &mut ChatSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(host) = lookup("CHATROOM_HOST") {
        settings.server.host = host;
    }
    if let Some(raw) = lookup("CHATROOM_PORT") {
        let port = parse_env("CHATROOM_PORT", raw)?;
        settings.server.port = port;
        settings.client.server_port = port;
    }
    if let Some(raw) = lookup("CHATROOM_MAX_CONNECTIONS") {
        settings.server.max_connections = Some(parse_env("CHATROOM_MAX_CONNECTIONS", raw)?);
    }
    if let Some(level) = lookup("CHATROOM_LOG") {
        settings.logging.level = level;
    }
    if let Some(raw) = lookup("CHATROOM_LOG_JSON") {
        settings.logging.json = match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" | "" => false,
            _ => {
                return Err(SettingsError::InvalidEnv {
                    var: "CHATROOM_LOG_JSON",
                    value: raw,
                });
            }
        };
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(var: &'static str, raw: String) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| SettingsError::InvalidEnv { var, value: raw })
}
