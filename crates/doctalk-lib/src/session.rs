//! Conversation state for one user: the active document and its chat log.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::document::Document;
use crate::engine::Engine;
use crate::error::{ExtractError, IngestError};
use crate::extract::check_size;
use crate::pipeline::answer::Answer;
use crate::pipeline::ingest::CollectionHandle;

pub const NO_DOCUMENT_REPLY: &str =
    "Sorry, no document has been uploaded yet. Please upload a PDF first.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Outcome of [`Session::ask`]. Failures are turned into an apology the
/// user can read; the cause is logged.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Answer(Answer),
    Apology(String),
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Self::Answer(answer) => &answer.text,
            Self::Apology(message) => message,
        }
    }

    pub const fn is_answer(&self) -> bool {
        matches!(self, Self::Answer(_))
    }
}

/// The uploaded document currently backing the conversation.
pub struct ActiveDocument {
    file: NamedTempFile,
    document_id: String,
    name: Option<String>,
    handle: CollectionHandle,
}

impl ActiveDocument {
    /// Temporary copy of the uploaded bytes. Removed when the document is
    /// replaced or the session is reset or dropped.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub const fn handle(&self) -> &CollectionHandle {
        &self.handle
    }
}

/// One user's conversation. Each session publishes its document behind an
/// alias of its own, so sessions sharing an [`Engine`] never see each
/// other's passages.
pub struct Session {
    engine: Arc<Engine>,
    alias: String,
    active: Option<ActiveDocument>,
    conversation: Vec<Turn>,
}

impl Session {
    pub fn new(engine: Arc<Engine>) -> Self {
        let alias = format!("{}-session-{}", engine.alias(), Uuid::new_v4().simple());
        Self {
            engine,
            alias,
            active: None,
            conversation: Vec::new(),
        }
    }

    /// Alias this session's document is published behind.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Ingest `bytes` and make them the active document.
    ///
    /// On failure the previous document, if any, stays active.
    pub async fn upload(
        &mut self,
        bytes: Vec<u8>,
        name: Option<String>,
    ) -> Result<&ActiveDocument, IngestError> {
        let document = Document::new(bytes, name);
        check_size(&document, self.engine.options().max_document_bytes)?;
        let file = spool(&document).map_err(ExtractError::Spool)?;
        let handle = self
            .engine
            .ingest_into(&self.alias, &document, &CancellationToken::new())
            .await?;

        let active = self.active.insert(ActiveDocument {
            file,
            document_id: document.id().to_string(),
            name: document.name().map(ToString::to_string),
            handle,
        });
        Ok(active)
    }

    /// Answer `question` against the active document.
    ///
    /// The user turn is recorded first. Any failure becomes an apologetic
    /// assistant turn rather than an error.
    pub async fn ask(&mut self, question: &str) -> Reply {
        self.conversation.push(Turn {
            role: Role::User,
            content: question.to_string(),
        });

        let reply = match &self.active {
            None => Reply::Apology(NO_DOCUMENT_REPLY.to_string()),
            Some(active) => match self.engine.answer(&active.handle, question).await {
                Ok(answer) => Reply::Answer(answer),
                Err(e) => {
                    warn!(error = %e, alias = %active.handle.alias, "Failed to answer question");
                    Reply::Apology(format!(
                        "Sorry, I couldn't answer that: {}.",
                        e.user_message()
                    ))
                }
            },
        };

        self.conversation.push(Turn {
            role: Role::Assistant,
            content: reply.text().to_string(),
        });
        reply
    }

    pub fn conversation(&self) -> &[Turn] {
        &self.conversation
    }

    pub const fn active_document(&self) -> Option<&ActiveDocument> {
        self.active.as_ref()
    }

    /// Forget the conversation and release the active document, dropping
    /// its collection from the index.
    pub async fn reset(&mut self) {
        self.conversation.clear();
        if self.active.take().is_some()
            && let Err(e) = self.engine.release(&self.alias).await
        {
            warn!(error = %e, alias = %self.alias, "Failed to release session collection");
        }
    }

    /// End the session. Same as [`Session::reset`], consuming the session.
    pub async fn close(mut self) {
        self.reset().await;
    }
}

impl Drop for Session {
    /// Release the active document's collection in the background. Use
    /// [`Session::close`] to wait for it.
    fn drop(&mut self) {
        if self.active.take().is_none() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(alias = %self.alias, "No runtime to release session collection");
            return;
        };
        let engine = Arc::clone(&self.engine);
        let alias = std::mem::take(&mut self.alias);
        runtime.spawn(async move {
            if let Err(e) = engine.release(&alias).await {
                warn!(error = %e, alias = %alias, "Failed to release session collection");
            }
        });
    }
}

fn spool(document: &Document) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("doctalk-")
        .suffix(".pdf")
        .tempfile()?;
    file.write_all(document.bytes())?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use doctalk_test_util::pdf::build_pdf;

    use super::*;
    use crate::config::Settings;
    use crate::embedding::EmbeddingEngine;
    use crate::embedding::hashing::HashingEmbedder;
    use crate::engine::EngineOptions;
    use crate::index::sqlite::SqliteIndex;
    use crate::test_util::{FailingIndex, ScriptedModel};

    fn engine(index: Arc<dyn crate::index::VectorIndex>) -> Arc<Engine> {
        Arc::new(Engine::new(
            EmbeddingEngine::new(
                Arc::new(HashingEmbedder::new(64)),
                true,
                8,
                Duration::from_secs(5),
            ),
            index,
            Arc::new(ScriptedModel::new("It lasts 12 months.")),
            EngineOptions::from_settings(&Settings::default()).unwrap(),
        ))
    }

    fn sqlite_session() -> Session {
        Session::new(engine(Arc::new(SqliteIndex::in_memory().unwrap())))
    }

    #[tokio::test]
    async fn ask_before_upload_apologizes() {
        let mut session = sqlite_session();
        let reply = session.ask("What is the warranty?").await;
        assert_eq!(reply, Reply::Apology(NO_DOCUMENT_REPLY.to_string()));
        assert_eq!(
            session.conversation(),
            &[
                Turn {
                    role: Role::User,
                    content: "What is the warranty?".to_string()
                },
                Turn {
                    role: Role::Assistant,
                    content: NO_DOCUMENT_REPLY.to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn upload_then_ask_records_both_turns() {
        let mut session = sqlite_session();
        let active = session
            .upload(build_pdf(&["The warranty period is 12 months."]), Some("w.pdf".into()))
            .await
            .unwrap();
        assert_eq!(active.name(), Some("w.pdf"));
        assert!(active.path().exists());

        let reply = session.ask("How long is the warranty?").await;
        assert!(reply.is_answer());
        assert_eq!(reply.text(), "It lasts 12 months.");
        assert_eq!(session.conversation().len(), 2);
        assert_eq!(session.conversation()[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn failed_upload_keeps_previous_document() {
        let mut session = sqlite_session();
        let first_id = session
            .upload(build_pdf(&["original text"]), None)
            .await
            .unwrap()
            .document_id()
            .to_string();

        let err = session
            .upload(b"garbage".to_vec(), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, IngestError::Extract(_)));
        assert_eq!(
            session.active_document().map(ActiveDocument::document_id),
            Some(first_id.as_str())
        );
    }

    #[tokio::test]
    async fn replacing_document_removes_old_temp_file() {
        let mut session = sqlite_session();
        let old_path = session
            .upload(build_pdf(&["one"]), None)
            .await
            .unwrap()
            .path()
            .to_path_buf();
        session.upload(build_pdf(&["two"]), None).await.unwrap();
        assert!(!old_path.exists());
    }

    #[tokio::test]
    async fn index_failure_becomes_apology() {
        let mut session = sqlite_session();
        session.upload(build_pdf(&["text"]), None).await.unwrap();
        // Swap in an engine whose index is down, keeping the handle.
        session.engine = engine(Arc::new(FailingIndex));

        let reply = session.ask("q").await;
        assert_eq!(
            reply.text(),
            "Sorry, I couldn't answer that: the document index is unavailable."
        );
        assert_eq!(session.conversation().len(), 2);
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let mut session = sqlite_session();
        let path = session
            .upload(build_pdf(&["text"]), None)
            .await
            .unwrap()
            .path()
            .to_path_buf();
        session.ask("q").await;

        session.reset().await;
        assert!(session.conversation().is_empty());
        assert!(session.active_document().is_none());
        assert!(!path.exists());
        assert_eq!(
            session
                .engine
                .index()
                .resolve_alias(session.alias())
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn sessions_on_one_engine_get_distinct_aliases() {
        let engine = engine(Arc::new(SqliteIndex::in_memory().unwrap()));
        let a = Session::new(Arc::clone(&engine));
        let b = Session::new(engine);
        assert_ne!(a.alias(), b.alias());
        assert!(a.alias().starts_with("vector_db-session-"));
    }

    #[tokio::test]
    async fn dropping_session_releases_collection() {
        let engine = engine(Arc::new(SqliteIndex::in_memory().unwrap()));
        let mut session = Session::new(Arc::clone(&engine));
        session.upload(build_pdf(&["text"]), None).await.unwrap();
        drop(session);

        for _ in 0..100 {
            if engine.index().list_collections().await.unwrap().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session collection was not released");
    }

    #[tokio::test]
    async fn close_releases_collection() {
        let engine = engine(Arc::new(SqliteIndex::in_memory().unwrap()));
        let mut session = Session::new(Arc::clone(&engine));
        let collection = session
            .upload(build_pdf(&["text"]), None)
            .await
            .unwrap()
            .handle()
            .collection
            .clone();

        session.close().await;
        assert!(engine.index().list_collections().await.unwrap().is_empty());
        assert_eq!(engine.index().collection_schema(&collection).await.unwrap(), None);
    }
}
