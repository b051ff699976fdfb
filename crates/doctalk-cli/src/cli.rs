use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "doctalk", about = "Ask questions about a PDF document")]
pub struct Cli {
    /// Settings file (defaults to ./doctalk.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Index a PDF into the configured collection, replacing its contents.
    Ingest {
        /// Path to the PDF file.
        pdf: PathBuf,
    },

    /// Answer a question against the last ingested document.
    Ask {
        /// The question to answer.
        question: String,
        /// Number of passages to retrieve (defaults to retrieval.top_k).
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Ingest a PDF, then answer questions read from stdin, one per line.
    Chat {
        /// Path to the PDF file.
        pdf: PathBuf,
    },

    /// Print the effective settings as TOML.
    Config,
}
