use std::io::{BufRead, Write};

use doctalk_lib::config::Settings;
use doctalk_lib::output::ConsoleIO;

/// Run the `doctalk config` command.
pub fn run_config<IN, OUT, ERR>(
    settings: &Settings,
    io: &mut dyn ConsoleIO<IN, OUT, ERR>,
) -> anyhow::Result<()>
where
    IN: BufRead,
    OUT: Write,
    ERR: Write,
{
    write!(io.stdout(), "{}", settings.to_toml_string()?)?;
    Ok(())
}
