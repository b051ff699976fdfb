use std::panic::{self, AssertUnwindSafe};

use tracing::debug;

use crate::document::Document;
use crate::error::ExtractError;

/// Whitespace-normalized text of one page. `page` counts from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page: usize,
    pub text: String,
}

/// Reject documents larger than `limit` bytes.
pub fn check_size(document: &Document, limit: u64) -> Result<(), ExtractError> {
    if document.len() > limit {
        return Err(ExtractError::DocumentTooLarge {
            size: document.len(),
            limit,
        });
    }
    Ok(())
}

/// Extract page texts on the blocking pool.
pub async fn extract_pages(document: &Document) -> Result<Vec<PageText>, ExtractError> {
    let bytes = document.shared_bytes();
    let pages = tokio::task::spawn_blocking(move || extract_pages_blocking(&bytes))
        .await
        .map_err(|e| ExtractError::UnreadablePdf {
            reason: format!("extraction task failed: {e}"),
        })??;
    debug!(
        document_id = %document.id(),
        page_count = pages.len(),
        "Extracted pages"
    );
    Ok(pages)
}

/// Parse `bytes` as a PDF and return one entry per page, in page order.
///
/// The parser panics on some malformed inputs; those panics are reported as
/// [`ExtractError::UnreadablePdf`].
pub fn extract_pages_blocking(bytes: &[u8]) -> Result<Vec<PageText>, ExtractError> {
    if !bytes.starts_with(b"%PDF-") {
        return Err(ExtractError::UnreadablePdf {
            reason: "missing %PDF- header".to_string(),
        });
    }
    let raw = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }))
    .map_err(|payload| ExtractError::UnreadablePdf {
        reason: panic_reason(payload.as_ref()),
    })?
    .map_err(|e| ExtractError::UnreadablePdf {
        reason: e.to_string(),
    })?;

    Ok(raw
        .iter()
        .enumerate()
        .map(|(i, text)| PageText {
            page: i + 1,
            text: normalize_whitespace(text),
        })
        .collect())
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("parser panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("parser panicked: {s}")
    } else {
        "parser panicked".to_string()
    }
}

/// Collapse every run of whitespace to one space and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
