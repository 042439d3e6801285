use crate::search::SourceCategory;
use clap::{Parser, Subcommand, ValueEnum};
use std::fmt;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(long, value_parser, default_value_t = false)]
    pub verbose: bool,

    #[clap(long, value_parser)]
    pub log: Option<PathBuf>,

    /// Config file to use instead of the default locations.
    #[clap(long, value_parser)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one query across the enabled sources.
    Search {
        query: String,

        /// Only search these sources (repeatable).
        #[clap(long = "source", value_parser)]
        sources: Vec<String>,

        #[clap(long, value_enum)]
        category: Option<SourceCategory>,

        /// Stop after this many results.
        #[clap(long, value_parser)]
        max_results: Option<usize>,

        #[clap(long, value_parser, default_value_t = 30)]
        timeout_secs: u64,

        #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,

        /// Print the request counters when done.
        #[clap(long, value_parser, default_value_t = false)]
        metrics: bool,
    },
    /// List the built-in sources.
    Sources,
    Completions {
        #[clap(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
