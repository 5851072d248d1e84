// src/config/validate.rs

use std::net::SocketAddr;

use crate::config::model::{ConfigFile, RawConfigFile, RenderSection, RendererSection};
use crate::errors::{AvatarError, Result};

/// Longest per-render deadline accepted.
pub const MAX_TIMEOUT_MS: u64 = 60 * 60 * 1000;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = AvatarError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let listen = parse_listen(&raw.server.listen)?;
        validate_renderer(&raw.renderer)?;
        validate_render(&raw.render)?;
        Ok(ConfigFile::new_unchecked(listen, raw.renderer, raw.render))
    }
}

fn parse_listen(listen: &str) -> Result<SocketAddr> {
    listen.trim().parse().map_err(|e| {
        AvatarError::ConfigError(format!(
            "[server].listen must be a socket address like \"0.0.0.0:8000\" (got {listen:?}: {e})"
        ))
    })
}

fn validate_renderer(renderer: &RendererSection) -> Result<()> {
    if renderer.program.trim().is_empty() {
        return Err(AvatarError::ConfigError(
            "[renderer].program must not be empty".to_string(),
        ));
    }
    if renderer.script.as_os_str().is_empty() {
        return Err(AvatarError::ConfigError(
            "[renderer].script must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_render(render: &RenderSection) -> Result<()> {
    if render.max_concurrent == 0 {
        return Err(AvatarError::ConfigError(
            "[render].max_concurrent must be >= 1 (got 0)".to_string(),
        ));
    }

    if render.timeout_ms == 0 || render.timeout_ms > MAX_TIMEOUT_MS {
        return Err(AvatarError::ConfigError(format!(
            "[render].timeout_ms must be between 1 and {MAX_TIMEOUT_MS} (got {})",
            render.timeout_ms
        )));
    }

    if render.formats.is_empty() {
        return Err(AvatarError::ConfigError(
            "[render].formats must enable at least one format".to_string(),
        ));
    }

    if render.retention_secs == 0 {
        return Err(AvatarError::ConfigError(
            "[render].retention_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OverloadPolicy;

    #[test]
    fn defaults_are_valid() {
        let cfg = ConfigFile::try_from(RawConfigFile::default()).unwrap();
        assert_eq!(cfg.listen.port(), 8000);
        assert_eq!(cfg.render.max_concurrent, 1);
        assert_eq!(cfg.render.queue_depth, 8);
        assert_eq!(cfg.render.overload_policy, OverloadPolicy::Queue);
        assert_eq!(cfg.render.timeout_ms, 120_000);
        assert_eq!(cfg.renderer.program, "blender");
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut raw = RawConfigFile::default();
        raw.render.max_concurrent = 0;
        let err = ConfigFile::try_from(raw).unwrap_err();
        assert!(err.to_string().contains("max_concurrent"));
    }

    #[test]
    fn rejects_unbounded_timeouts() {
        let mut raw = RawConfigFile::default();
        raw.render.timeout_ms = 0;
        assert!(ConfigFile::try_from(raw.clone()).is_err());

        raw.render.timeout_ms = MAX_TIMEOUT_MS + 1;
        assert!(ConfigFile::try_from(raw).is_err());
    }

    #[test]
    fn rejects_empty_formats_and_bad_listen() {
        let mut raw = RawConfigFile::default();
        raw.render.formats.clear();
        assert!(ConfigFile::try_from(raw).is_err());

        let mut raw = RawConfigFile::default();
        raw.server.listen = "localhost".to_string();
        let err = ConfigFile::try_from(raw).unwrap_err();
        assert!(err.to_string().contains("[server].listen"));
    }

    #[test]
    fn zero_queue_depth_is_allowed() {
        let mut raw = RawConfigFile::default();
        raw.render.queue_depth = 0;
        assert!(ConfigFile::try_from(raw).is_ok());
    }
}
