//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lectern",
    version,
    author = "neur0map",
    about = "Grounded question answering over indexed textbooks",
    long_about = "Lectern answers questions against imported textbook fragments by combining exact \
                  keyword matching with semantic search, then asks a local language model for an \
                  answer that cites the pages it came from."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/lectern/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply (e.g., "fast", "recall")
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a question from the imported textbooks
    Ask {
        /// Question to ask
        question: String,

        /// Restrict the search to one document
        #[arg(short, long)]
        document: Option<i64>,

        /// Number of fragments given to the model
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Paraphrase the question before the semantic search
        #[arg(short, long, overrides_with = "no_expand")]
        expand: bool,

        /// Search with the question as written, even when expansion is configured
        #[arg(long, overrides_with = "expand")]
        no_expand: bool,

        /// Show the answer in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Generate study questions for a paragraph
    Questions {
        /// Document id
        #[arg(short, long)]
        document: i64,

        /// Paragraph label (e.g., "§ 12" or "12")
        #[arg(short, long)]
        paragraph: String,

        /// Chapter label used to narrow the paragraph lookup
        #[arg(long, default_value = "")]
        chapter: String,

        /// Number of questions
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,

        /// Show questions in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Import a pre-chunked document and embed its chunks
    Import {
        /// JSON file with a filename and its chunk records
        file: PathBuf,
    },

    /// Show corpus and index statistics
    Stats,

    /// Show recorded answers and generated questions, newest first
    History {
        /// Only show one kind of entry
        #[arg(long, value_parser = ["fact", "question"])]
        mode: Option<String>,

        /// Maximum number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Show entries in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Preview the chunks of a document
    Chunks {
        /// Document id
        document: i64,

        /// Chunks to skip
        #[arg(long, default_value = "0")]
        skip: usize,

        /// Maximum number of chunks to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
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

    /// Print the configuration file path
    Path,
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Combine an `--x` / `--no-x` flag pair; `None` keeps the configured value
pub fn flag_override(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}
