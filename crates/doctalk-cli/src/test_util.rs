use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use doctalk_lib::config::{EmbeddingBackend, IndexBackend, Settings};
use doctalk_lib::embedding::EmbeddingEngine;
use doctalk_lib::embedding::hashing::HashingEmbedder;
use doctalk_lib::engine::{Engine, EngineOptions};
use doctalk_lib::error::GenerationError;
use doctalk_lib::index::sqlite::SqliteIndex;
use doctalk_lib::llm::{LanguageModel, Prompt};
use doctalk_lib::runtime::Runtime;

pub use doctalk_test_util::pdf::build_pdf;

/// Reply every [`runtime_in_memory`] language model gives.
pub const STUB_REPLY: &str = "The warranty period is 12 months.";

struct StubModel;

#[async_trait]
impl LanguageModel for StubModel {
    fn model_id(&self) -> &str {
        "stub"
    }

    async fn complete(&self, _prompt: &Prompt) -> Result<String, GenerationError> {
        Ok(STUB_REPLY.to_string())
    }
}

/// Create a [`Runtime`] backed by the hashing embedder, an in-memory SQLite
/// index and a language model that always answers [`STUB_REPLY`].
pub fn runtime_in_memory() -> Runtime {
    let mut settings = Settings::default();
    settings.embedding.backend = EmbeddingBackend::Hashing;
    settings.embedding.dimension = 64;
    settings.index.backend = IndexBackend::Sqlite;
    settings.index.sqlite_path = PathBuf::from(":memory:");
    settings.chunking.size = 200;
    settings.chunking.overlap = 50;

    let embedder = EmbeddingEngine::new(
        Arc::new(HashingEmbedder::new(settings.embedding.dimension)),
        settings.embedding.normalize,
        settings.embedding.batch_size,
        settings.embedding.timeout(),
    );
    let options = EngineOptions::from_settings(&settings).unwrap();
    let engine = Engine::new(
        embedder,
        Arc::new(SqliteIndex::in_memory().unwrap()),
        Arc::new(StubModel),
        options,
    );
    Runtime {
        settings,
        engine: Arc::new(engine),
    }
}

/// Write a PDF with one page per entry to `dir/name` and return its path.
pub fn write_pdf(dir: &tempfile::TempDir, name: &str, pages: &[&str]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, build_pdf(pages)).unwrap();
    path
}
