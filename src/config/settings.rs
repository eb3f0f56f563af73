//! Command-line settings for the affinity engine
//!
//! Defines the CLI arguments and the runtime configuration derived from
//! them. The schema location is fixed and deliberately not exposed here.

use super::loader::DEFAULT_CONFIG_PATH;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Affinity Engine - declarative CPU affinity and priority for running processes
#[derive(Parser, Debug, Clone)]
#[command(name = "affinity-engine")]
#[command(author = "Affinity Engine Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Apply CPU affinity and priority policy to running processes")]
#[command(long_about = r#"
Affinity Engine reads a configuration document listing processes (and
optionally their threads) with the CPU cores and priority each should use,
and applies that policy once or on a fixed interval.

Examples:
  affinity-engine                          # Use ApplicationsToConfigure.xml
  affinity-engine /etc/pinning.xml         # Use a specific document
  affinity-engine --dry-run -v             # Log what would be applied
"#)]
pub struct CliArgs {
    /// Configuration document (defaults to ApplicationsToConfigure.xml)
    #[arg(value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Log control calls instead of changing the OS scheduler
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Give up on a single affinity/priority call after this long (e.g., 2s, 500ms)
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub call_timeout: Option<Duration>,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Runtime configuration derived from CLI args
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Configuration document path
    pub config_path: PathBuf,
    /// Use the logging-only control
    pub dry_run: bool,
    /// Per-call timeout for control primitives
    pub call_timeout: Option<Duration>,
    /// Default log level directive
    pub log_level: &'static str,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            dry_run: false,
            call_timeout: None,
            log_level: "info",
            log_format: LogFormat::Text,
        }
    }
}

impl RuntimeConfig {
    /// Create config from CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self, String> {
        if let Some(timeout) = args.call_timeout {
            if timeout.is_zero() {
                return Err("Call timeout must be greater than zero".to_string());
            }
        }

        Ok(Self {
            config_path: args
                .config
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            dry_run: args.dry_run,
            call_timeout: args.call_timeout,
            log_level: match args.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            },
            log_format: args.log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_arguments() {
        let args = CliArgs::try_parse_from(["affinity-engine"]).unwrap();
        let config = RuntimeConfig::from_cli(&args).unwrap();
        assert_eq!(config.config_path, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(!config.dry_run);
        assert_eq!(config.call_timeout, None);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_explicit_arguments() {
        let args = CliArgs::try_parse_from([
            "affinity-engine",
            "/etc/pinning.xml",
            "--dry-run",
            "--call-timeout",
            "250ms",
            "-vv",
            "--log-format",
            "json",
        ])
        .unwrap();
        let config = RuntimeConfig::from_cli(&args).unwrap();
        assert_eq!(config.config_path, PathBuf::from("/etc/pinning.xml"));
        assert!(config.dry_run);
        assert_eq!(config.call_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.log_level, "trace");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_rejects_extra_positionals_and_zero_timeout() {
        assert!(CliArgs::try_parse_from(["affinity-engine", "a.xml", "b.xml"]).is_err());

        let args = CliArgs::try_parse_from(["affinity-engine", "--call-timeout", "0s"]).unwrap();
        assert!(RuntimeConfig::from_cli(&args).is_err());
    }
}
