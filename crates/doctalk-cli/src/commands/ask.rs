use std::io::{BufRead, Write};

use tracing::warn;

use doctalk_lib::error::{AnswerError, IndexError};
use doctalk_lib::output::ConsoleIO;
use doctalk_lib::runtime::Runtime;

use super::write_answer;

/// Run the `doctalk ask` command against the collection an earlier
/// `doctalk ingest` published.
pub async fn run_ask<IN, OUT, ERR>(
    question: &str,
    k: Option<usize>,
    runtime: &Runtime,
    io: &mut dyn ConsoleIO<IN, OUT, ERR>,
) -> anyhow::Result<()>
where
    IN: BufRead,
    OUT: Write,
    ERR: Write,
{
    let top_k = k.unwrap_or(runtime.engine.options().top_k);
    if top_k == 0 {
        anyhow::bail!("-k must be at least 1");
    }
    if question.trim().is_empty() {
        anyhow::bail!("The question is empty.");
    }

    let alias = runtime.engine.alias();
    let handle = match runtime.engine.attach(alias).await {
        Ok(handle) => handle,
        Err(AnswerError::Index(IndexError::CollectionNotFound(_))) => {
            anyhow::bail!(
                "No document has been ingested into '{alias}'. Run `doctalk ingest <PDF>` first."
            );
        }
        Err(e) => {
            warn!(error = %e, alias = %alias, "Failed to open collection");
            anyhow::bail!("Sorry, I couldn't answer that: {}.", e.user_message());
        }
    };

    match runtime
        .engine
        .answer_with_top_k(&handle, question, top_k)
        .await
    {
        Ok(answer) => write_answer(io.stdout(), &answer)?,
        Err(e) => {
            warn!(error = %e, alias = %alias, "Failed to answer question");
            anyhow::bail!("Sorry, I couldn't answer that: {}.", e.user_message());
        }
    }
    Ok(())
}
