//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "verity",
    version,
    about = "Verify claims against an evidence corpus",
    long_about = "Verity retrieves supporting and contradicting evidence for natural-language claims \
                  with hybrid vector and keyword search, scores each piece of evidence with a pairwise \
                  inference model, and aggregates the scores into a SUPPORTED, REFUTED or INSUFFICIENT \
                  verdict under a fixed latency budget."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/verity/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply (e.g., "fast", "accuracy")
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Verify one or more claims
    Verify {
        /// Evidence corpus in JSON lines ({"id", "text", "source_type", "embedding"?})
        #[arg(short, long, value_name = "FILE")]
        evidence: PathBuf,

        /// Claims to verify
        #[arg(required = true)]
        claims: Vec<String>,

        /// Evidence items retrieved per claim (overrides config)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Tune vector index parameters against the corpus
    Tune {
        /// Evidence corpus in JSON lines
        #[arg(short, long, value_name = "FILE")]
        evidence: PathBuf,

        /// Number of held-out queries (overrides config)
        #[arg(short, long)]
        queries: Option<usize>,

        /// Minimum top-1 recall (overrides config)
        #[arg(short, long)]
        recall_floor: Option<f64>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
