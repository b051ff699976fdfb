use std::io::{BufRead, Write};
use std::path::Path;

use tracing::warn;

use doctalk_lib::output::ConsoleIO;
use doctalk_lib::runtime::Runtime;

use super::read_document;

/// Run the `doctalk ingest` command.
pub async fn run_ingest_cmd<IN, OUT, ERR>(
    pdf: &Path,
    runtime: &Runtime,
    io: &mut dyn ConsoleIO<IN, OUT, ERR>,
) -> anyhow::Result<()>
where
    IN: BufRead,
    OUT: Write,
    ERR: Write,
{
    let document = read_document(pdf, runtime)?;

    let handle = match runtime.engine.ingest(&document).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, path = %pdf.display(), "Ingestion failed");
            anyhow::bail!("{}", e.user_message());
        }
    };

    let name = document.name().unwrap_or("document");
    if handle.chunk_count == 0 {
        writeln!(
            io.stdout(),
            "Ingested {name}, but no text could be extracted. Answers will not be grounded in it."
        )?;
    } else {
        writeln!(
            io.stdout(),
            "Ingested {name}: {} chunks into '{}'.",
            handle.chunk_count,
            handle.alias
        )?;
    }
    Ok(())
}
