//! CLI module for Wayfinder
//!
//! Provides command-line interface parsing and handling for the wayfinder binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod output;

use clap::{Parser, Subcommand};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use wayfinder::types::{ReportArtifacts, RunRequest, Turn};

/// Wayfinder - career research orchestration
///
/// Turns a career conversation into a citation-backed report through
/// clarification, scoping, budgeted parallel research, compression and synthesis.
#[derive(Parser, Debug)]
#[command(
    name = "wayfinder",
    version,
    about = "Wayfinder - budgeted career research reports",
    long_about = "Turns a conversation about someone's career into a research-backed report.\n\n\
                  Run without arguments to start the HTTP server, or use 'run' to advance a\n\
                  single conversation from a JSON file.",
    after_help = "EXAMPLES:\n    \
                  wayfinder                              # Start the server (reads wayfinder.toml)\n    \
                  wayfinder run --conversation chat.json -o out/  # Advance one conversation\n    \
                  wayfinder config --validate            # Check the configuration file\n    \
                  wayfinder --config my.toml serve       # Use a custom config file"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "wayfinder.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve,

    /// Advance one conversation read from a JSON file
    ///
    /// The file holds either a bare array of turns or a full run request
    /// with `conversation` and optional `run_id` and `options`.
    Run {
        /// Conversation file
        #[arg(long)]
        conversation: PathBuf,

        /// Directory for preview.md, full.md and the updated conversation
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Gate the preview behind a purchase
        #[arg(long)]
        purchasable: bool,
    },

    /// Show configuration information
    Config {
        /// Validate the configuration file
        #[arg(long)]
        validate: bool,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Parses a conversation file: a bare turn array or a full run request.
pub fn parse_run_request(text: &str) -> serde_json::Result<RunRequest> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if value.is_array() {
        let conversation: Vec<Turn> = serde_json::from_value(value)?;
        return Ok(RunRequest {
            run_id: None,
            conversation,
            options: Default::default(),
        });
    }
    serde_json::from_value(value)
}

/// Writes `preview.md` and `full.md` into `dir`, creating it when missing.
pub fn write_artifacts(dir: &Path, artifacts: &ReportArtifacts) -> io::Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir)?;
    let preview = dir.join("preview.md");
    let full = dir.join("full.md");
    fs::write(&preview, &artifacts.preview)?;
    fs::write(&full, &artifacts.full)?;
    Ok((preview, full))
}
