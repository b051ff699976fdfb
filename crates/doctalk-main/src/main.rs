use std::io::{Stderr, StdinLock, Stdout, Write};
use std::process::ExitCode;

use clap::Parser;

use doctalk_cli::cli::{Cli, Command};
use doctalk_lib::config::Settings;
use doctalk_lib::output::{ConsoleIO, StdIO};
use doctalk_lib::runtime::Runtime;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    let mut io = StdIO::new();
    if let Err(e) = doctalk_cli::logging::init() {
        let _ = writeln!(io.stderr(), "warning: {e}");
    }

    match run(&cli, &args, &mut io).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            let _ = writeln!(io.stderr(), "error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    cli: &Cli,
    args: &[&str],
    io: &mut dyn ConsoleIO<StdinLock<'static>, Stdout, Stderr>,
) -> anyhow::Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;

    // `config` needs no runtime.
    if matches!(cli.command, Command::Config) {
        return doctalk_cli::commands::config::run_config(&settings, io);
    }

    let runtime = Runtime::from_settings(settings).await?;
    doctalk_cli::try_run(args, &runtime, io).await
}
