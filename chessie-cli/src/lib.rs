//! # chessie-cli
//!
//! The `chessie` command: build the story index, ask questions, and inspect
//! retrieval from a terminal.

pub mod cli;
pub mod commands;

use std::io::Write;
use std::path::Path;

use chessie_rag::{RagConfig, RagError};
use clap::Parser;

use cli::{Cli, Command};

/// Parse `args` and run the command, reading `CHESSIE_*` overrides from `vars`.
pub async fn try_run<I>(args: &[&str], vars: I, out: &mut dyn Write) -> anyhow::Result<()>
where
    I: IntoIterator<Item = (String, String)>,
{
    let cli = Cli::try_parse_from(args)?;
    run(cli, vars, out).await
}

/// Run an already-parsed command.
pub async fn run<I>(cli: Cli, vars: I, out: &mut dyn Write) -> anyhow::Result<()>
where
    I: IntoIterator<Item = (String, String)>,
{
    let config = load_config(cli.config.as_deref(), vars)?;
    let language = config.language;

    let result = match cli.command {
        Command::Build { corpus_dir, fresh } => {
            commands::build::run_build(config, &corpus_dir, fresh, out).await
        }
        Command::Ask { question, explain, json } => {
            commands::ask::run_ask(config, &question, explain, json, out).await
        }
        Command::Retrieve { question, top_k, trace } => {
            commands::retrieve::run_retrieve(config, &question, top_k, trace, out).await
        }
        Command::Stats { corpus } => commands::stats::run_stats(config, corpus.as_deref(), out).await,
    };

    // Lead with the message a child-facing front end would show.
    result.map_err(|e| match e.downcast_ref::<RagError>().map(|r| r.user_message(language)) {
        Some(message) => e.context(message),
        None => e,
    })
}

/// Defaults, then the optional TOML file, then `CHESSIE_*` overrides.
pub fn load_config<I>(path: Option<&Path>, vars: I) -> anyhow::Result<RagConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut config = match path {
        Some(path) => RagConfig::from_file(path)?,
        None => RagConfig::default(),
    };
    config.apply_env_overrides(vars)?;
    config.validate()?;
    Ok(config)
}
