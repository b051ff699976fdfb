pub mod cli;
pub mod commands;
pub mod logging;

#[cfg(test)]
pub mod test_util;

use std::io::{BufRead, Write};

use clap::Parser;

use doctalk_lib::output::ConsoleIO;
use doctalk_lib::runtime::Runtime;

use cli::{Cli, Command};

/// Main CLI entry point. Parses args and dispatches to the appropriate command.
///
/// `--config` is only meaningful to whoever built `runtime`; it is accepted
/// here so the same argument vector can be passed through.
pub async fn try_run<IN, OUT, ERR>(
    args: &[&str],
    runtime: &Runtime,
    io: &mut dyn ConsoleIO<IN, OUT, ERR>,
) -> anyhow::Result<()>
where
    IN: BufRead,
    OUT: Write,
    ERR: Write,
{
    let cli = Cli::try_parse_from(args)?;

    match cli.command {
        Command::Ingest { pdf } => commands::ingest::run_ingest_cmd(&pdf, runtime, io).await,
        Command::Ask { question, k } => commands::ask::run_ask(&question, k, runtime, io).await,
        Command::Chat { pdf } => commands::chat::run_chat(&pdf, runtime, io).await,
        Command::Config => commands::config::run_config(&runtime.settings, io),
    }
}
