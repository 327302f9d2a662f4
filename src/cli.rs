use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Replay a recorded stream and print the resulting HTML
    Replay {
        /// Path to the stream recording (JSON)
        recording: PathBuf,

        /// Ignore recorded timing and feed events as fast as possible
        #[arg(long)]
        fast: bool,

        /// Re-split text deltas into chunks of this many characters
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Render stored messages in one pass and print the resulting HTML
    History {
        /// Path to a JSON array of messages
        messages: PathBuf,
    },
}

/// Define the application arguments
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub mode: Mode,

    /// Enable verbose logging (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Settings file to use instead of the one in the config directory
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,
}

impl Args {
    pub fn parse() -> Self {
        <Args as Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_replay_defaults() {
        let args = Args::try_parse_from(["test", "replay", "stream.json"])
            .expect("Failed to parse replay args");

        assert_eq!(args.verbose, 0);
        assert!(args.settings.is_none());
        match args.mode {
            Mode::Replay {
                recording,
                fast,
                chunk_size,
            } => {
                assert_eq!(recording, PathBuf::from("stream.json"));
                assert!(!fast);
                assert_eq!(chunk_size, None);
            }
            _ => panic!("Expected replay mode"),
        }
    }

    #[test]
    fn test_replay_options() {
        let args = Args::try_parse_from([
            "test",
            "replay",
            "stream.json",
            "--fast",
            "--chunk-size",
            "3",
            "--settings",
            "custom.json",
        ])
        .expect("Failed to parse replay args");

        assert_eq!(args.settings, Some(PathBuf::from("custom.json")));
        match args.mode {
            Mode::Replay {
                fast, chunk_size, ..
            } => {
                assert!(fast);
                assert_eq!(chunk_size, Some(3));
            }
            _ => panic!("Expected replay mode"),
        }
    }

    #[test]
    fn test_verbose_flag_counting() {
        let args = Args::try_parse_from(["test", "-vv", "history", "messages.json"])
            .expect("Failed to parse verbose args");
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["test", "history", "messages.json", "-v"])
            .expect("Failed to parse verbose args");
        assert_eq!(args.verbose, 1);
        assert!(matches!(args.mode, Mode::History { .. }));
    }

    #[test]
    fn test_mode_is_required() {
        assert!(Args::try_parse_from(["test"]).is_err());
    }
}
