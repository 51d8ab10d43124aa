//! Command-line interface for evilsdr
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default control address for client subcommands.
pub const DEFAULT_ADDR: &str = "127.0.0.1:8765";

/// Real-time SDR receiver engine
#[derive(Parser, Debug)]
#[command(name = "evilsdr", version, about = "Real-time SDR receiver engine")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the receiver and its control server
    Serve {
        /// Listen address override (HOST or HOST:PORT)
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,

        /// Do not open the tuner at start-up
        #[arg(long)]
        no_connect: bool,
    },

    /// Send one JSON command to a running server and print the events
    Send {
        /// Command, e.g. '{"type":"SET_FREQ","value":98500000}'
        command: String,

        /// Server address
        #[arg(long, default_value = DEFAULT_ADDR)]
        addr: String,

        /// How long to collect events, in milliseconds
        #[arg(long, value_name = "MS", default_value = "500")]
        wait: u64,
    },

    /// List bookmark categories available for memory scans
    Categories {
        /// Server address
        #[arg(long, default_value = DEFAULT_ADDR)]
        addr: String,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (file + env overrides)
    Show,
    /// Print the configuration file path
    Path,
    /// Print the built-in defaults as TOML
    Dump,
}

/// Default log filter for the given flags; `RUST_LOG` still wins.
pub fn log_filter(quiet: bool, verbose: u8) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_defaults() {
        let cli = Cli::try_parse_from(["evilsdr", "serve"]).unwrap();
        match cli.command {
            Commands::Serve { listen, no_connect } => {
                assert!(listen.is_none());
                assert!(!no_connect);
            }
            _ => panic!("Expected Serve command"),
        }
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_parse_serve_with_flags() {
        let cli = Cli::try_parse_from([
            "evilsdr",
            "-vv",
            "--config",
            "/tmp/sdr.toml",
            "serve",
            "--listen",
            "127.0.0.1:9000",
            "--no-connect",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/sdr.toml")));
        match cli.command {
            Commands::Serve { listen, no_connect } => {
                assert_eq!(listen.as_deref(), Some("127.0.0.1:9000"));
                assert!(no_connect);
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_parse_send() {
        let cli = Cli::try_parse_from(["evilsdr", "send", r#"{"type":"SKIP_SCAN"}"#]).unwrap();
        match cli.command {
            Commands::Send {
                command,
                addr,
                wait,
            } => {
                assert_eq!(command, r#"{"type":"SKIP_SCAN"}"#);
                assert_eq!(addr, DEFAULT_ADDR);
                assert_eq!(wait, 500);
            }
            _ => panic!("Expected Send command"),
        }
    }

    #[test]
    fn test_send_requires_command() {
        assert!(Cli::try_parse_from(["evilsdr", "send"]).is_err());
    }

    #[test]
    fn test_parse_config_show() {
        let cli = Cli::try_parse_from(["evilsdr", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
    }

    #[test]
    fn test_config_requires_subcommand() {
        let err = Cli::try_parse_from(["evilsdr", "config"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn test_log_filter_levels() {
        assert_eq!(log_filter(false, 0), "warn");
        assert_eq!(log_filter(false, 1), "info");
        assert_eq!(log_filter(false, 2), "debug");
        assert_eq!(log_filter(false, 5), "trace");
        assert_eq!(log_filter(true, 3), "error");
    }
}
