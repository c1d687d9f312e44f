//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod batch;
mod context;

pub use context::{parse_category, AppContext};

#[derive(Parser, Debug)]
#[command(
    name = "caseindex",
    version,
    about = "Similar-case retrieval and case-type classification for traffic accident claims",
    long_about = "caseindex builds one HNSW index per case category from a SQLite case store, \
                  retrieves the most similar recorded cases for a narrative, and classifies \
                  narratives into procedural categories by rule or by neighbor vote."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/caseindex/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply
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
    /// Rebuild every partition index from the case store
    Build,

    /// Find the recorded cases most similar to a narrative
    Query {
        /// Accident narrative
        text: String,

        /// Search one category (label or slug) instead of the global index
        #[arg(long)]
        category: Option<String>,

        /// Number of neighbors (defaults to query.default_k)
        #[arg(short, long)]
        k: Option<usize>,

        /// Also print the statutes cited by the neighbors
        #[arg(long)]
        statutes: bool,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Classify a narrative given its fact-extraction output
    Classify {
        /// Accident narrative
        narrative: String,

        /// File holding the extraction text
        #[arg(long, value_name = "FILE", conflicts_with = "facts_text")]
        facts: Option<PathBuf>,

        /// Extraction text given inline
        #[arg(long)]
        facts_text: Option<String>,

        /// Show the full classification in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Classify and retrieve for every record of a JSONL file
    Batch {
        /// Input JSONL, one {"id", "narrative", "facts"} object per line
        input: PathBuf,

        /// Output JSONL (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Neighbors retrieved per record (defaults to query.default_k)
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Measure classification accuracy on labelled JSONL records
    Evaluate {
        /// Input JSONL, one {"narrative", "facts", "expected"} object per line
        input: PathBuf,

        /// Show the report in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Embed every stored case that has no embedding yet
    Embed,

    /// Show case store and index statistics
    Stats,

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
