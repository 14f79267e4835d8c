use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "chessie", version, about = "Answer children's chess questions from a story corpus")]
pub struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Write log lines as JSON objects.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rebuild the index from every story in a corpus directory.
    Build {
        /// Directory holding `.txt` and `.md` stories.
        #[arg(default_value = "data/stories")]
        corpus_dir: PathBuf,
        /// Replace an existing index even if it was built with other settings.
        #[arg(long)]
        fresh: bool,
    },

    /// Answer a question from the indexed stories.
    Ask {
        /// The child's question.
        question: String,
        /// Also write an explanation quoting the stories.
        #[arg(long)]
        explain: bool,
        /// Print the answer package as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the evidence retrieval keeps for a question.
    Retrieve {
        /// The question to search for.
        question: String,
        /// Number of chunks to keep. Defaults to the configured `top_k`.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Print every candidate with its distance instead of the kept texts.
        #[arg(long)]
        trace: bool,
    },

    /// Report index size per source and corpus files missing from it.
    Stats {
        /// Corpus directory to compare the index against.
        #[arg(long)]
        corpus: Option<PathBuf>,
    },
}
