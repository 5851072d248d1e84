// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `tlr-avatar`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tlr-avatar",
    version,
    about = "HTTP service that renders parametric avatars with headless Blender.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `TlrAvatar.toml` in the current working directory if it
    /// exists, otherwise built-in defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Address to listen on; overrides `[server].listen` and the environment.
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TLR_AVATAR_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print the effective configuration and renderer location, then exit.
    #[arg(long)]
    pub check: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_flags() {
        let args = CliArgs::try_parse_from([
            "tlr-avatar",
            "--config",
            "conf/avatar.toml",
            "--listen",
            "127.0.0.1:9000",
            "--log-level",
            "debug",
            "--check",
        ])
        .unwrap();
        assert_eq!(args.config.as_deref(), Some("conf/avatar.toml"));
        assert_eq!(args.listen.as_deref(), Some("127.0.0.1:9000"));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert!(args.check);
    }

    #[test]
    fn everything_is_optional() {
        let args = CliArgs::try_parse_from(["tlr-avatar"]).unwrap();
        assert!(args.config.is_none());
        assert!(!args.check);
    }
}
