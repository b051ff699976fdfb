use crate::error::ChunkError;
use crate::extract::PageText;

/// Sliding-window parameters, in Unicode scalar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    size: usize,
    overlap: usize,
}

impl ChunkConfig {
    pub const fn new(size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if size == 0 || overlap >= size {
            return Err(ChunkError::InvalidConfig { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    pub const fn size(&self) -> usize {
        self.size
    }

    pub const fn overlap(&self) -> usize {
        self.overlap
    }

    const fn stride(&self) -> usize {
        self.size - self.overlap
    }
}

/// A window of page text, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub document_id: String,
    /// Page number, counting from 1.
    pub page: usize,
    /// Character offset of the first character within the whole document.
    pub offset: usize,
    /// Characters shared with the previous chunk of the same page.
    pub overlap: usize,
    /// Position of the chunk within the document, from 0.
    pub seq: u64,
    pub text: String,
}

/// Split pages into overlapping windows.
///
/// Windows never cross a page boundary. Each page starts a fresh window
/// with `overlap == 0`; the last window of a page may be shorter than
/// `size`. Pages with no text produce no chunks.
pub fn chunk_pages(document_id: &str, pages: &[PageText], config: ChunkConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut page_base = 0usize;
    let mut seq = 0u64;

    for page in pages {
        let chars: Vec<char> = page.text.chars().collect();
        let len = chars.len();
        let mut start = 0usize;

        while start < len {
            let end = (start + config.size).min(len);
            chunks.push(Chunk {
                document_id: document_id.to_string(),
                page: page.page,
                offset: page_base + start,
                overlap: if start == 0 { 0 } else { config.overlap },
                seq,
                text: chars[start..end].iter().collect(),
            });
            seq += 1;
            if end == len {
                break;
            }
            start += config.stride();
        }

        page_base += len;
    }

    chunks
}
