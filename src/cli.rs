use clap::{Parser, Subcommand};
use cs_core::{SessionId, TitleId};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cinesync")]
#[command(author, version, about = "Adaptive playback frontend for an upstream media server")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server
    Start {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the stream descriptor chosen for a title
    Negotiate {
        /// Upstream title id (rating key)
        title: TitleId,

        /// Start offset in seconds
        #[arg(long, default_value_t = 0.0)]
        offset: f64,

        /// Quality profile id
        #[arg(short, long)]
        quality: Option<String>,

        /// Re-encode even when the original quality is selected
        #[arg(long)]
        force_reencode: bool,

        /// Existing session id to reuse
        #[arg(long)]
        session: Option<SessionId>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_negotiate_flags() {
        let cli = Cli::parse_from([
            "cinesync",
            "negotiate",
            "42",
            "--offset",
            "90.5",
            "-q",
            "720p",
            "--force-reencode",
        ]);
        match cli.command {
            Commands::Negotiate {
                title,
                offset,
                quality,
                force_reencode,
                session,
            } => {
                assert_eq!(title.as_str(), "42");
                assert_eq!(offset, 90.5);
                assert_eq!(quality.as_deref(), Some("720p"));
                assert!(force_reencode);
                assert!(session.is_none());
            }
            _ => panic!("expected negotiate"),
        }
    }

    #[test]
    fn rejects_invalid_title() {
        assert!(Cli::try_parse_from(["cinesync", "negotiate", "../etc"]).is_err());
    }
}
