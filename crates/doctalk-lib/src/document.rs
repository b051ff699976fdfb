use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::ExtractError;

/// An uploaded document: immutable bytes plus a content-derived identifier.
#[derive(Debug, Clone)]
pub struct Document {
    bytes: Arc<[u8]>,
    id: String,
    name: Option<String>,
}

impl Document {
    pub fn new(bytes: impl Into<Arc<[u8]>>, name: Option<String>) -> Self {
        let bytes = bytes.into();
        let id = content_id(&bytes);
        Self { bytes, id, name }
    }

    /// Read a document from disk, naming it after the file.
    ///
    /// Files above `max_bytes` are rejected from their metadata, before any
    /// byte is read, and the read itself never goes past the limit.
    pub fn from_path(path: &Path, max_bytes: u64) -> Result<Self, ExtractError> {
        let read_error = |source| ExtractError::Read {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(read_error)?;
        let size = file.metadata().map_err(read_error)?.len();
        if size > max_bytes {
            return Err(ExtractError::DocumentTooLarge {
                size,
                limit: max_bytes,
            });
        }

        let mut bytes = Vec::with_capacity(usize::try_from(size).unwrap_or_default());
        // The file may have grown since the metadata call.
        file.take(max_bytes.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(read_error)?;
        if bytes.len() as u64 > max_bytes {
            return Err(ExtractError::DocumentTooLarge {
                size: bytes.len() as u64,
                limit: max_bytes,
            });
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        Ok(Self::new(bytes, name))
    }

    /// SHA-256 of the bytes, lowercase hex. Identical bytes share an id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn content_id(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
