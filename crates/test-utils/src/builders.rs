#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use tlr_avatar::codec::AvatarRequest;
use tlr_avatar::config::{ConfigFile, RawConfigFile};
use tlr_avatar::engine::RenderSettings;
use tlr_avatar::types::{OutputFormat, OverloadPolicy};

/// Builder for `AvatarRequest`, starting from a valid minimal request.
pub struct AvatarRequestBuilder {
    request: AvatarRequest,
}

impl AvatarRequestBuilder {
    pub fn new() -> Self {
        Self {
            request: AvatarRequest {
                height: Some(1.72),
                ..Default::default()
            },
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.request.seed = Some(seed);
        self
    }

    pub fn height(mut self, metres: f64) -> Self {
        self.request.height = Some(metres);
        self
    }

    pub fn without_height(mut self) -> Self {
        self.request.height = None;
        self
    }

    pub fn chest(mut self, cm: f64) -> Self {
        self.request.chest = Some(cm);
        self
    }

    pub fn waist(mut self, cm: f64) -> Self {
        self.request.waist = Some(cm);
        self
    }

    pub fn hip(mut self, cm: f64) -> Self {
        self.request.hip = Some(cm);
        self
    }

    pub fn pose(mut self, pose: &str) -> Self {
        self.request.pose = Some(pose.to_string());
        self
    }

    pub fn identity(mut self, identity: &str) -> Self {
        self.request.identity = Some(identity.to_string());
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.request.format = Some(format.as_str().to_string());
        self
    }

    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.request.image_width = Some(width);
        self.request.image_height = Some(height);
        self
    }

    pub fn build(self) -> AvatarRequest {
        self.request
    }
}

impl Default for AvatarRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.server.listen = "127.0.0.1:0".to_string();
        Self { config }
    }

    pub fn program(mut self, program: &Path) -> Self {
        self.config.renderer.program = program.display().to_string();
        self
    }

    pub fn work_root(mut self, dir: &Path) -> Self {
        self.config.render.work_root = dir.to_path_buf();
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.render.timeout_ms = ms;
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.config.render.max_concurrent = n;
        self
    }

    pub fn queue_depth(mut self, n: usize) -> Self {
        self.config.render.queue_depth = n;
        self
    }

    pub fn policy(mut self, policy: OverloadPolicy) -> Self {
        self.config.render.overload_policy = policy;
        self
    }

    pub fn formats(mut self, formats: &[OutputFormat]) -> Self {
        self.config.render.formats = formats.to_vec();
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings with every format enabled and short deadlines.
pub fn test_settings(timeout: Duration) -> RenderSettings {
    RenderSettings {
        timeout,
        formats: OutputFormat::ALL.to_vec(),
        retention: Duration::from_secs(60),
    }
}
