// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{AvatarError, Result};
use crate::types::{OutputFormat, OverloadPolicy};

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load configuration, apply `TLR_AVATAR_*` environment overrides, and
/// validate.
///
/// - An explicit `path` must exist.
/// - Without one, [`default_config_path`] is read if present; otherwise the
///   built-in defaults are used.
pub fn load_and_validate(path: Option<&Path>) -> Result<ConfigFile> {
    load_with_env(path, |key| std::env::var(key).ok())
}

/// [`load_and_validate`] with an injectable environment lookup.
pub fn load_with_env<F>(path: Option<&Path>, env: F) -> Result<ConfigFile>
where
    F: Fn(&str) -> Option<String>,
{
    let mut raw = match path {
        Some(path) => {
            info!(config = ?path, "loading configuration");
            load_from_path(path)?
        }
        None => {
            let default = default_config_path();
            if default.is_file() {
                info!(config = ?default, "loading configuration");
                load_from_path(&default)?
            } else {
                debug!(config = ?default, "no config file; using defaults");
                RawConfigFile::default()
            }
        }
    };

    apply_env_overrides(&mut raw, env)?;
    ConfigFile::try_from(raw)
}

/// Overlay environment variables on top of file values.
///
/// `PORT` only replaces the port of the listen address, which is how most
/// container platforms hand out ports; `TLR_AVATAR_LISTEN` wins over it.
pub fn apply_env_overrides<F>(raw: &mut RawConfigFile, env: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(port) = get("PORT") {
        let port: u16 = parse_var("PORT", &port)?;
        let host = raw
            .server
            .listen
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        raw.server.listen = format!("{host}:{port}");
    }
    if let Some(listen) = get("TLR_AVATAR_LISTEN") {
        raw.server.listen = listen;
    }

    if let Some(program) = get("TLR_AVATAR_RENDERER") {
        raw.renderer.program = program;
    }
    if let Some(script) = get("TLR_AVATAR_SCRIPT") {
        raw.renderer.script = PathBuf::from(script);
    }

    if let Some(v) = get("TLR_AVATAR_TIMEOUT_MS") {
        raw.render.timeout_ms = parse_var("TLR_AVATAR_TIMEOUT_MS", &v)?;
    }
    if let Some(v) = get("TLR_AVATAR_MAX_CONCURRENT") {
        raw.render.max_concurrent = parse_var("TLR_AVATAR_MAX_CONCURRENT", &v)?;
    }
    if let Some(v) = get("TLR_AVATAR_QUEUE_DEPTH") {
        raw.render.queue_depth = parse_var("TLR_AVATAR_QUEUE_DEPTH", &v)?;
    }
    if let Some(v) = get("TLR_AVATAR_OVERLOAD_POLICY") {
        raw.render.overload_policy = OverloadPolicy::from_str(&v).map_err(AvatarError::ConfigError)?;
    }
    if let Some(v) = get("TLR_AVATAR_FORMATS") {
        raw.render.formats = v
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(OutputFormat::from_str)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AvatarError::ConfigError(format!("TLR_AVATAR_FORMATS: {e}")))?;
    }
    if let Some(v) = get("TLR_AVATAR_WORK_ROOT") {
        raw.render.work_root = PathBuf::from(v);
    }
    if let Some(v) = get("TLR_AVATAR_RETENTION_SECS") {
        raw.render.retention_secs = parse_var("TLR_AVATAR_RETENTION_SECS", &v)?;
    }

    Ok(())
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| AvatarError::ConfigError(format!("{key}={value:?}: {e}")))
}

/// Config file read when `--config` is not given.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("TlrAvatar.toml")
}
