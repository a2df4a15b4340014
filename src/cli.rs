//! Command-line interface for synchronia
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Real-time conversation coach: emotion, transcript and advice
#[derive(Parser, Debug)]
#[command(
    name = "synchronia",
    version,
    about = "Real-time conversation coach: emotion, transcript and advice"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress event output (logs only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: emotion batches + debug logs, -vv: trace logs)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,

    /// Capture from the microphone until Ctrl-C
    Listen {
        /// Audio input device name (default: configured or system default)
        #[arg(long, value_name = "DEVICE")]
        device: Option<String>,

        /// Batch length in seconds (1-10)
        #[arg(long, short = 'b', value_name = "SECONDS", value_parser = parse_batch_secs)]
        batch_secs: Option<u32>,

        /// Conversation goal sent with every advice request
        #[arg(long, short = 'g', value_name = "TEXT")]
        goal: Option<String>,

        /// Write the session audio as 16 kHz mono WAV on exit
        #[arg(long, value_name = "PATH")]
        save_audio: Option<PathBuf>,

        /// Write the session transcript as plain text on exit
        #[arg(long, value_name = "PATH")]
        save_transcript: Option<PathBuf>,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (file + environment) as TOML
    Show,
    /// Print the default configuration file path
    Path,
}

fn parse_batch_secs(s: &str) -> Result<u32, String> {
    let secs: u32 = s
        .trim()
        .trim_end_matches('s')
        .parse()
        .map_err(|e| format!("{e}"))?;
    crate::config::validate_batch_secs(secs).map_err(|e| e.to_string())?;
    Ok(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devices() {
        let cli = Cli::try_parse_from(["synchronia", "devices"]).unwrap();
        assert!(matches!(cli.command, Commands::Devices));
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["synchronia"]).is_err());
    }

    #[test]
    fn test_parse_listen_defaults() {
        let cli = Cli::try_parse_from(["synchronia", "listen"]).unwrap();
        match cli.command {
            Commands::Listen {
                device,
                batch_secs,
                goal,
                save_audio,
                save_transcript,
            } => {
                assert!(device.is_none());
                assert!(batch_secs.is_none());
                assert!(goal.is_none());
                assert!(save_audio.is_none());
                assert!(save_transcript.is_none());
            }
            other => panic!("Expected Listen, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_listen_with_options() {
        let cli = Cli::try_parse_from([
            "synchronia",
            "listen",
            "--device",
            "hw:0",
            "--batch-secs",
            "5",
            "--goal",
            "close the deal",
            "--save-audio",
            "/tmp/a.wav",
            "--save-transcript",
            "/tmp/t.txt",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Listen {
                device,
                batch_secs,
                goal,
                save_audio,
                save_transcript,
            } => {
                assert_eq!(device.as_deref(), Some("hw:0"));
                assert_eq!(batch_secs, Some(5));
                assert_eq!(goal.as_deref(), Some("close the deal"));
                assert_eq!(save_audio, Some(PathBuf::from("/tmp/a.wav")));
                assert_eq!(save_transcript, Some(PathBuf::from("/tmp/t.txt")));
            }
            other => panic!("Expected Listen, got {other:?}"),
        }
    }

    #[test]
    fn test_batch_secs_accepts_suffix() {
        let cli = Cli::try_parse_from(["synchronia", "listen", "-b", "10s"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Listen {
                batch_secs: Some(10),
                ..
            }
        ));
    }

    #[test]
    fn test_batch_secs_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["synchronia", "listen", "--batch-secs", "0"]).is_err());
        assert!(Cli::try_parse_from(["synchronia", "listen", "--batch-secs", "11"]).is_err());
        assert!(Cli::try_parse_from(["synchronia", "listen", "--batch-secs", "abc"]).is_err());
    }

    #[test]
    fn test_parse_config_actions() {
        let cli = Cli::try_parse_from(["synchronia", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
        let cli = Cli::try_parse_from(["synchronia", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Path
            }
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "synchronia",
            "devices",
            "--config",
            "/path/to/config.toml",
            "-vv",
            "--quiet",
            "--no-color",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.toml")));
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
        assert!(cli.no_color);
    }
}
