use std::io::{BufRead, Write};
use std::path::Path;

use tracing::warn;

use doctalk_lib::output::ConsoleIO;
use doctalk_lib::runtime::Runtime;
use doctalk_lib::session::{Reply, Session};

use super::{read_document, write_answer};

const PROMPT: &str = "> ";

/// Run the `doctalk chat` command: ingest `pdf`, then answer one question
/// per stdin line until an empty line or end of input.
pub async fn run_chat<IN, OUT, ERR>(
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
    let name = document.name().unwrap_or("document").to_string();

    let mut session = Session::new(runtime.engine.clone());
    let chunk_count = match session
        .upload(document.bytes().to_vec(), Some(name.clone()))
        .await
    {
        Ok(active) => active.handle().chunk_count,
        Err(e) => {
            warn!(error = %e, path = %pdf.display(), "Upload failed");
            anyhow::bail!("{}", e.user_message());
        }
    };

    let result = converse(&mut session, &name, chunk_count, io).await;
    session.close().await;
    result
}

async fn converse<IN, OUT, ERR>(
    session: &mut Session,
    name: &str,
    chunk_count: usize,
    io: &mut dyn ConsoleIO<IN, OUT, ERR>,
) -> anyhow::Result<()>
where
    IN: BufRead,
    OUT: Write,
    ERR: Write,
{
    writeln!(
        io.stdout(),
        "Loaded {name} ({chunk_count} chunks). Ask a question; an empty line ends the chat."
    )?;

    loop {
        write!(io.stdout(), "{PROMPT}")?;
        io.stdout().flush()?;
        let Some(line) = io.read_line()? else {
            writeln!(io.stdout())?;
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            break;
        }

        match session.ask(question).await {
            Reply::Answer(answer) => write_answer(io.stdout(), &answer)?,
            Reply::Apology(text) => writeln!(io.stdout(), "{text}")?,
        }
        writeln!(io.stdout())?;
    }
    Ok(())
}
