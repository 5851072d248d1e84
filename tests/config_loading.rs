mod common;
use crate::common::TestResult;
use crate::common::builders::ConfigFileBuilder;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use tlr_avatar::config::{load_and_validate, load_with_env};
use tlr_avatar::engine::RenderSettings;
use tlr_avatar::errors::AvatarError;
use tlr_avatar::types::{OutputFormat, OverloadPolicy};

fn write_config(contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("TlrAvatar.toml");
    fs::write(&path, contents).expect("write config");
    (dir, path)
}

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

const FULL: &str = r#"
[server]
listen = "127.0.0.1:9100"

[renderer]
program = "/opt/blender/blender"
script = "/srv/render_avatar.py"
extra_args = ["--factory-startup"]

[render]
timeout_ms = 45000
max_concurrent = 3
queue_depth = 2
overload_policy = "reject"
formats = ["png", "jpg"]
retention_secs = 30
"#;

#[test]
fn file_values_are_loaded() -> TestResult {
    let (_dir, path) = write_config(FULL);
    let cfg = load_with_env(Some(path.as_path()), env_of(&[]))?;

    assert_eq!(cfg.listen.to_string(), "127.0.0.1:9100");
    assert_eq!(cfg.renderer.program, "/opt/blender/blender");
    assert_eq!(cfg.renderer.script, PathBuf::from("/srv/render_avatar.py"));
    assert_eq!(cfg.renderer.extra_args, vec!["--factory-startup".to_string()]);
    assert_eq!(cfg.render.timeout(), Duration::from_secs(45));
    assert_eq!(cfg.render.max_concurrent, 3);
    assert_eq!(cfg.render.queue_depth, 2);
    assert_eq!(cfg.render.overload_policy, OverloadPolicy::Reject);
    assert_eq!(cfg.render.formats, vec![OutputFormat::Png, OutputFormat::Jpeg]);

    let settings = RenderSettings::from(&cfg);
    assert_eq!(settings.retention, Duration::from_secs(30));
    assert_eq!(settings.timeout, Duration::from_secs(45));
    Ok(())
}

#[test]
fn missing_sections_fall_back_to_defaults() -> TestResult {
    let (_dir, path) = write_config("[server]\nlisten = \"127.0.0.1:8000\"\n");
    let cfg = load_with_env(Some(path.as_path()), env_of(&[]))?;

    assert_eq!(cfg.renderer.program, "blender");
    assert_eq!(cfg.render.timeout(), Duration::from_secs(120));
    assert_eq!(cfg.render.max_concurrent, 1);
    assert_eq!(cfg.render.overload_policy, OverloadPolicy::Queue);
    assert_eq!(cfg.render.formats, OutputFormat::ALL.to_vec());
    Ok(())
}

#[test]
fn environment_overrides_file_values() -> TestResult {
    let (_dir, path) = write_config(FULL);
    let env = env_of(&[
        ("TLR_AVATAR_RENDERER", "/usr/local/bin/blender"),
        ("TLR_AVATAR_TIMEOUT_MS", "5000"),
        ("TLR_AVATAR_MAX_CONCURRENT", "4"),
        ("TLR_AVATAR_OVERLOAD_POLICY", "queue"),
        ("TLR_AVATAR_FORMATS", "svg, png"),
        ("TLR_AVATAR_WORK_ROOT", "/var/tmp/avatars"),
    ]);
    let cfg = load_with_env(Some(path.as_path()), env)?;

    assert_eq!(cfg.renderer.program, "/usr/local/bin/blender");
    assert_eq!(cfg.render.timeout_ms, 5000);
    assert_eq!(cfg.render.max_concurrent, 4);
    assert_eq!(cfg.render.overload_policy, OverloadPolicy::Queue);
    assert_eq!(cfg.render.formats, vec![OutputFormat::Svg, OutputFormat::Png]);
    assert_eq!(cfg.render.work_root, PathBuf::from("/var/tmp/avatars"));
    // Untouched keys keep their file values.
    assert_eq!(cfg.render.queue_depth, 2);
    Ok(())
}

#[test]
fn port_replaces_only_the_port() -> TestResult {
    let (_dir, path) = write_config(FULL);

    let cfg = load_with_env(Some(path.as_path()), env_of(&[("PORT", "7000")]))?;
    assert_eq!(cfg.listen.to_string(), "127.0.0.1:7000");

    let cfg = load_with_env(
        Some(path.as_path()),
        env_of(&[("PORT", "7000"), ("TLR_AVATAR_LISTEN", "0.0.0.0:9000")]),
    )?;
    assert_eq!(cfg.listen.to_string(), "0.0.0.0:9000");
    Ok(())
}

#[test]
fn blank_environment_values_are_ignored() -> TestResult {
    let (_dir, path) = write_config(FULL);
    let cfg = load_with_env(Some(path.as_path()), env_of(&[("TLR_AVATAR_TIMEOUT_MS", "  ")]))?;
    assert_eq!(cfg.render.timeout_ms, 45000);
    Ok(())
}

#[test]
fn unparsable_environment_value_is_a_config_error() {
    let (_dir, path) = write_config(FULL);

    let err = load_with_env(Some(path.as_path()), env_of(&[("TLR_AVATAR_MAX_CONCURRENT", "many")]))
        .expect_err("should fail");
    match err {
        AvatarError::ConfigError(msg) => assert!(msg.contains("TLR_AVATAR_MAX_CONCURRENT"), "{msg}"),
        other => panic!("expected ConfigError, got {other:?}"),
    }

    let err = load_with_env(Some(path.as_path()), env_of(&[("TLR_AVATAR_FORMATS", "png,tiff")]))
        .expect_err("should fail");
    assert!(matches!(err, AvatarError::ConfigError(_)), "{err:?}");
}

#[test]
fn environment_values_are_validated() {
    let (_dir, path) = write_config(FULL);
    let err = load_with_env(Some(path.as_path()), env_of(&[("TLR_AVATAR_MAX_CONCURRENT", "0")]))
        .expect_err("zero slots is invalid");
    assert!(matches!(err, AvatarError::ConfigError(_)), "{err:?}");
}

#[test]
fn explicit_missing_path_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load_and_validate(Some(dir.path().join("absent.toml").as_path())).expect_err("should fail");
    assert!(matches!(err, AvatarError::IoError(_)), "{err:?}");
}

#[test]
fn unknown_keys_are_rejected() {
    let (_dir, path) = write_config("[render]\nmax_concurent = 2\n");
    let err = load_with_env(Some(path.as_path()), env_of(&[])).expect_err("typo should fail");
    assert!(matches!(err, AvatarError::TomlError(_)), "{err:?}");
}

#[test]
fn invalid_listen_address_is_rejected() {
    let (_dir, path) = write_config("[server]\nlisten = \"not-an-address\"\n");
    let err = load_with_env(Some(path.as_path()), env_of(&[])).expect_err("should fail");
    assert!(matches!(err, AvatarError::ConfigError(_)), "{err:?}");
}

#[test]
fn builder_produces_valid_config() {
    let cfg = ConfigFileBuilder::new()
        .max_concurrent(2)
        .policy(OverloadPolicy::Reject)
        .formats(&[OutputFormat::Svg])
        .build();
    assert_eq!(cfg.listen.port(), 0);
    assert_eq!(cfg.render.max_concurrent, 2);
    assert_eq!(cfg.render.formats, vec![OutputFormat::Svg]);
}
