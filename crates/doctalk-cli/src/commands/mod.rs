pub mod ask;
pub mod chat;
pub mod config;
pub mod ingest;

use std::io::Write;
use std::path::Path;

use tracing::warn;

use doctalk_lib::document::Document;
use doctalk_lib::error::IngestError;
use doctalk_lib::pipeline::answer::Answer;
use doctalk_lib::runtime::Runtime;

/// Load `pdf` within the configured size limit, turning failures into a
/// message for the user.
fn read_document(pdf: &Path, runtime: &Runtime) -> anyhow::Result<Document> {
    if !pdf.exists() {
        anyhow::bail!("PDF file not found: {}", pdf.display());
    }
    Document::from_path(pdf, runtime.engine.options().max_document_bytes).map_err(|e| {
        warn!(error = %e, path = %pdf.display(), "Failed to load document");
        anyhow::anyhow!("{}", IngestError::from(e).user_message())
    })
}

/// Print an answer followed by the passages it was grounded on.
fn write_answer<W: Write>(out: &mut W, answer: &Answer) -> std::io::Result<()> {
    writeln!(out, "{}", answer.text.trim_end())?;
    if answer.sources.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "Sources:")?;
    for (i, source) in answer.sources.iter().enumerate() {
        writeln!(
            out,
            "  [{}] page {} (score {:.4})",
            i + 1,
            source.payload.page,
            source.score
        )?;
    }
    Ok(())
}
