//! Metadata storage using SQLite
//!
//! This module handles all local metadata storage including:
//! - Knowledge bases and agents (with their links)
//! - Documents and their processing state
//! - Chunks (the indexed slices of each document)
//! - Answers and citations (query history)

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Document processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for DocStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocStatus::Pending => write!(f, "pending"),
            DocStatus::Processing => write!(f, "processing"),
            DocStatus::Completed => write!(f, "completed"),
            DocStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for DocStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(DocStatus::Pending),
            "processing" => Ok(DocStatus::Processing),
            "completed" => Ok(DocStatus::Completed),
            "failed" => Ok(DocStatus::Failed),
            _ => Err(Error::Config(format!("Unknown document status: {}", s))),
        }
    }
}

/// A knowledge base: a named collection of documents within a tenant
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl KnowledgeBase {
    pub fn new(tenant_id: String, name: String, description: Option<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            name,
            description,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// An agent: a query persona linked to one or more knowledge bases
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub system_prompt: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i64>,
    pub confidence_threshold: f32,
    pub learn_enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Agent {
    pub fn new(
        tenant_id: String,
        name: String,
        system_prompt: String,
        confidence_threshold: f32,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            name,
            system_prompt,
            model: None,
            temperature: None,
            max_tokens: None,
            confidence_threshold,
            learn_enabled: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// An uploaded document and its processing state
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub tenant_id: String,
    pub kb_id: String,
    pub title: String,
    pub file_key: String,
    pub file_kind: String,
    pub raw_content: Option<String>,
    pub content_hash: Option<String>,
    pub status: String,
    pub chunk_count: i64,
    pub error_message: Option<String>,
    pub tags_json: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Document {
    pub fn new(
        tenant_id: String,
        kb_id: String,
        title: String,
        file_key: String,
        file_kind: String,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            kb_id,
            title,
            file_key,
            file_kind,
            raw_content: None,
            content_hash: None,
            status: DocStatus::Pending.to_string(),
            chunk_count: 0,
            error_message: None,
            tags_json: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn get_status(&self) -> Result<DocStatus> {
        self.status.parse()
    }

    pub fn tags(&self) -> Vec<String> {
        self.tags_json
            .as_ref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default()
    }

    pub fn set_tags(&mut self, tags: &[String]) {
        self.tags_json = serde_json::to_string(tags).ok();
    }
}

/// A stored text chunk
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub doc_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub start_char: i64,
    pub end_char: i64,
    pub page: i64,
    pub created_at: String,
}

impl Chunk {
    pub fn new(
        doc_id: String,
        chunk_index: i64,
        content: String,
        start_char: i64,
        end_char: i64,
        page: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            doc_id,
            chunk_index,
            content,
            start_char,
            end_char,
            page,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A recorded answer with its confidence and handoff outcome
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Answer {
    pub id: String,
    pub tenant_id: String,
    pub agent_id: String,
    pub question: String,
    pub answer: String,
    pub confidence: f32,
    pub handoff: bool,
    pub model: Option<String>,
    pub tokens_used: Option<i64>,
    pub created_at: String,
}

impl Answer {
    pub fn new(
        tenant_id: String,
        agent_id: String,
        question: String,
        answer: String,
        confidence: f32,
        handoff: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            agent_id,
            question,
            answer,
            confidence,
            handoff,
            model: None,
            tokens_used: None,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A chunk an answer drew on
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    pub answer_id: String,
    pub doc_id: String,
    pub doc_title: String,
    pub chunk_index: i64,
    pub score: f32,
    pub created_at: String,
}

impl Citation {
    pub fn new(
        answer_id: String,
        doc_id: String,
        doc_title: String,
        chunk_index: i64,
        score: f32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            answer_id,
            doc_id,
            doc_title,
            chunk_index,
            score,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Per-status document counts for a tenant
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the metadata database
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::connect_path(&config.paths.db_file).await
    }

    /// Connect to a specific database file
    pub async fn connect_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='knowledge_bases'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    // ===== Knowledge Base Operations =====

    pub async fn insert_kb(&self, kb: &KnowledgeBase) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO knowledge_bases (id, tenant_id, name, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&kb.id)
        .bind(&kb.tenant_id)
        .bind(&kb.name)
        .bind(&kb.description)
        .bind(&kb.created_at)
        .bind(&kb.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_kb(&self, id: &str) -> Result<Option<KnowledgeBase>> {
        let kb = sqlx::query_as::<_, KnowledgeBase>("SELECT * FROM knowledge_bases WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(kb)
    }

    pub async fn get_kb_by_name(
        &self,
        tenant_id: &str,
        name: &str,
    ) -> Result<Option<KnowledgeBase>> {
        let kb = sqlx::query_as::<_, KnowledgeBase>(
            "SELECT * FROM knowledge_bases WHERE tenant_id = ? AND name = ?",
        )
        .bind(tenant_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(kb)
    }

    pub async fn list_kbs(&self, tenant_id: &str) -> Result<Vec<KnowledgeBase>> {
        let kbs = sqlx::query_as::<_, KnowledgeBase>(
            "SELECT * FROM knowledge_bases WHERE tenant_id = ? ORDER BY created_at DESC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(kbs)
    }

    // ===== Agent Operations =====

    pub async fn insert_agent(&self, agent: &Agent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agents (id, tenant_id, name, system_prompt, model, temperature,
                                max_tokens, confidence_threshold, learn_enabled,
                                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&agent.id)
        .bind(&agent.tenant_id)
        .bind(&agent.name)
        .bind(&agent.system_prompt)
        .bind(&agent.model)
        .bind(agent.temperature)
        .bind(agent.max_tokens)
        .bind(agent.confidence_threshold)
        .bind(agent.learn_enabled)
        .bind(&agent.created_at)
        .bind(&agent.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_agent(&self, id: &str) -> Result<Option<Agent>> {
        let agent = sqlx::query_as::<_, Agent>("SELECT * FROM agents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(agent)
    }

    pub async fn get_agent_by_name(&self, tenant_id: &str, name: &str) -> Result<Option<Agent>> {
        let agent =
            sqlx::query_as::<_, Agent>("SELECT * FROM agents WHERE tenant_id = ? AND name = ?")
                .bind(tenant_id)
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(agent)
    }

    pub async fn list_agents(&self, tenant_id: &str) -> Result<Vec<Agent>> {
        let agents = sqlx::query_as::<_, Agent>(
            "SELECT * FROM agents WHERE tenant_id = ? ORDER BY created_at DESC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(agents)
    }

    /// Link an agent to a knowledge base (idempotent)
    pub async fn link_agent_kb(&self, agent_id: &str, kb_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_knowledge_bases (agent_id, kb_id, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(agent_id, kb_id) DO NOTHING
            "#,
        )
        .bind(agent_id)
        .bind(kb_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Knowledge base ids linked to an agent, oldest link first
    pub async fn agent_kb_ids(&self, agent_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT kb_id FROM agent_knowledge_bases WHERE agent_id = ? ORDER BY created_at ASC",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    // ===== Document Operations =====

    pub async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, tenant_id, kb_id, title, file_key, file_kind,
                                   raw_content, content_hash, status, chunk_count,
                                   error_message, tags_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.tenant_id)
        .bind(&doc.kb_id)
        .bind(&doc.title)
        .bind(&doc.file_key)
        .bind(&doc.file_kind)
        .bind(&doc.raw_content)
        .bind(&doc.content_hash)
        .bind(&doc.status)
        .bind(doc.chunk_count)
        .bind(&doc.error_message)
        .bind(&doc.tags_json)
        .bind(&doc.created_at)
        .bind(&doc.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    pub async fn list_documents(&self, kb_id: &str) -> Result<Vec<Document>> {
        let docs = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE kb_id = ? ORDER BY created_at DESC",
        )
        .bind(kb_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    pub async fn list_tenant_documents(&self, tenant_id: &str) -> Result<Vec<Document>> {
        let docs = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE tenant_id = ? ORDER BY created_at DESC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    pub async fn mark_processing(&self, doc_id: &str) -> Result<()> {
        self.set_status(doc_id, DocStatus::Processing, None, None)
            .await
    }

    pub async fn mark_completed(&self, doc_id: &str, chunk_count: i64) -> Result<()> {
        self.set_status(doc_id, DocStatus::Completed, Some(chunk_count), None)
            .await
    }

    pub async fn mark_failed(&self, doc_id: &str, error: &str) -> Result<()> {
        self.set_status(doc_id, DocStatus::Failed, None, Some(error))
            .await
    }

    async fn set_status(
        &self,
        doc_id: &str,
        status: DocStatus,
        chunk_count: Option<i64>,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE documents
            SET status = ?,
                chunk_count = COALESCE(?, chunk_count),
                error_message = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.to_string())
        .bind(chunk_count)
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(doc_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Cache the cleaned extracted text and its hash on the document
    pub async fn update_raw_content(&self, doc_id: &str, content: &str, hash: &str) -> Result<()> {
        sqlx::query(
            "UPDATE documents SET raw_content = ?, content_hash = ?, updated_at = ? WHERE id = ?",
        )
        .bind(content)
        .bind(hash)
        .bind(Utc::now().to_rfc3339())
        .bind(doc_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ===== Chunk Operations =====

    /// Replace a document's chunk rows atomically
    pub async fn replace_chunks(&self, doc_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE doc_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, doc_id, chunk_index, content, start_char, end_char,
                                    page, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.doc_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.start_char)
            .bind(chunk.end_char)
            .bind(chunk.page)
            .bind(&chunk.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_chunks(&self, doc_id: &str) -> Result<Vec<Chunk>> {
        let chunks = sqlx::query_as::<_, Chunk>(
            "SELECT * FROM chunks WHERE doc_id = ? ORDER BY chunk_index",
        )
        .bind(doc_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    // ===== Answer Operations =====

    pub async fn insert_answer(&self, answer: &Answer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO answers (id, tenant_id, agent_id, question, answer, confidence,
                                 handoff, model, tokens_used, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&answer.id)
        .bind(&answer.tenant_id)
        .bind(&answer.agent_id)
        .bind(&answer.question)
        .bind(&answer.answer)
        .bind(answer.confidence)
        .bind(answer.handoff)
        .bind(&answer.model)
        .bind(answer.tokens_used)
        .bind(&answer.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_citations(&self, citations: &[Citation]) -> Result<()> {
        for citation in citations {
            sqlx::query(
                r#"
                INSERT INTO citations (id, answer_id, doc_id, doc_title, chunk_index, score,
                                       created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&citation.id)
            .bind(&citation.answer_id)
            .bind(&citation.doc_id)
            .bind(&citation.doc_title)
            .bind(citation.chunk_index)
            .bind(citation.score)
            .bind(&citation.created_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    // ===== Status =====

    /// Per-status document counts for a tenant
    pub async fn status_counts(&self, tenant_id: &str) -> Result<StatusCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM documents WHERE tenant_id = ? GROUP BY status",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match status.parse::<DocStatus>() {
                Ok(DocStatus::Pending) => counts.pending = count,
                Ok(DocStatus::Processing) => counts.processing = count,
                Ok(DocStatus::Completed) => counts.completed = count,
                Ok(DocStatus::Failed) => counts.failed = count,
                Err(_) => {}
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_db() -> (TempDir, MetaDb) {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::connect_path(&tmp.path().join("meta.db"))
            .await
            .unwrap();
        db.init_schema().await.unwrap();
        (tmp, db)
    }

    #[tokio::test]
    async fn test_kb_crud() {
        let (_tmp, db) = test_db().await;

        let kb = KnowledgeBase::new(
            "acme".to_string(),
            "handbook".to_string(),
            Some("HR handbook".to_string()),
        );
        db.insert_kb(&kb).await.unwrap();

        let loaded = db.get_kb(&kb.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "handbook");

        let by_name = db.get_kb_by_name("acme", "handbook").await.unwrap();
        assert!(by_name.is_some());
        assert!(db.get_kb_by_name("globex", "handbook").await.unwrap().is_none());

        assert_eq!(db.list_kbs("acme").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_agent_kb_links_ordered_by_creation() {
        let (_tmp, db) = test_db().await;

        let agent = Agent::new(
            "acme".to_string(),
            "support".to_string(),
            "You are a support agent.".to_string(),
            0.6,
        );
        db.insert_agent(&agent).await.unwrap();

        let mut kb_a = KnowledgeBase::new("acme".to_string(), "first".to_string(), None);
        kb_a.created_at = "2026-01-01T00:00:00Z".to_string();
        let kb_b = KnowledgeBase::new("acme".to_string(), "second".to_string(), None);
        db.insert_kb(&kb_a).await.unwrap();
        db.insert_kb(&kb_b).await.unwrap();

        // Link order decides, not kb creation order
        sqlx::query("INSERT INTO agent_knowledge_bases (agent_id, kb_id, created_at) VALUES (?, ?, ?)")
            .bind(&agent.id)
            .bind(&kb_b.id)
            .bind("2026-02-01T00:00:00Z")
            .execute(&db.pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO agent_knowledge_bases (agent_id, kb_id, created_at) VALUES (?, ?, ?)")
            .bind(&agent.id)
            .bind(&kb_a.id)
            .bind("2026-03-01T00:00:00Z")
            .execute(&db.pool)
            .await
            .unwrap();

        let ids = db.agent_kb_ids(&agent.id).await.unwrap();
        assert_eq!(ids, vec![kb_b.id.clone(), kb_a.id.clone()]);

        // Re-linking is idempotent
        db.link_agent_kb(&agent.id, &kb_a.id).await.unwrap();
        assert_eq!(db.agent_kb_ids(&agent.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_document_status_transitions() {
        let (_tmp, db) = test_db().await;

        let kb = KnowledgeBase::new("acme".to_string(), "kb".to_string(), None);
        db.insert_kb(&kb).await.unwrap();

        let doc = Document::new(
            "acme".to_string(),
            kb.id.clone(),
            "Leave Policy".to_string(),
            "doc-1/policy.txt".to_string(),
            "text".to_string(),
        );
        db.insert_document(&doc).await.unwrap();

        db.mark_processing(&doc.id).await.unwrap();
        let loaded = db.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.get_status().unwrap(), DocStatus::Processing);

        db.mark_completed(&doc.id, 7).await.unwrap();
        let loaded = db.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.get_status().unwrap(), DocStatus::Completed);
        assert_eq!(loaded.chunk_count, 7);
        assert!(loaded.error_message.is_none());

        db.mark_failed(&doc.id, "extraction blew up").await.unwrap();
        let loaded = db.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.get_status().unwrap(), DocStatus::Failed);
        assert_eq!(loaded.error_message.as_deref(), Some("extraction blew up"));
        // chunk_count survives a later failure
        assert_eq!(loaded.chunk_count, 7);
    }

    #[tokio::test]
    async fn test_raw_content_cache() {
        let (_tmp, db) = test_db().await;

        let kb = KnowledgeBase::new("acme".to_string(), "kb".to_string(), None);
        db.insert_kb(&kb).await.unwrap();
        let doc = Document::new(
            "acme".to_string(),
            kb.id.clone(),
            "Doc".to_string(),
            "doc-1/doc.txt".to_string(),
            "text".to_string(),
        );
        db.insert_document(&doc).await.unwrap();

        db.update_raw_content(&doc.id, "cleaned text", "hash-1")
            .await
            .unwrap();
        let loaded = db.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.raw_content.as_deref(), Some("cleaned text"));
        assert_eq!(loaded.content_hash.as_deref(), Some("hash-1"));
    }

    #[tokio::test]
    async fn test_replace_chunks_is_atomic_per_document() {
        let (_tmp, db) = test_db().await;

        let kb = KnowledgeBase::new("acme".to_string(), "kb".to_string(), None);
        db.insert_kb(&kb).await.unwrap();
        let doc = Document::new(
            "acme".to_string(),
            kb.id.clone(),
            "Doc".to_string(),
            "doc-1/doc.txt".to_string(),
            "text".to_string(),
        );
        db.insert_document(&doc).await.unwrap();

        let first = vec![
            Chunk::new(doc.id.clone(), 0, "one".to_string(), 0, 3, 1),
            Chunk::new(doc.id.clone(), 1, "two".to_string(), 3, 6, 1),
        ];
        db.replace_chunks(&doc.id, &first).await.unwrap();
        assert_eq!(db.get_chunks(&doc.id).await.unwrap().len(), 2);

        let second = vec![Chunk::new(doc.id.clone(), 0, "only".to_string(), 0, 4, 1)];
        db.replace_chunks(&doc.id, &second).await.unwrap();

        let chunks = db.get_chunks(&doc.id).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "only");
    }

    #[tokio::test]
    async fn test_answer_with_citations() {
        let (_tmp, db) = test_db().await;

        let agent = Agent::new(
            "acme".to_string(),
            "support".to_string(),
            "prompt".to_string(),
            0.6,
        );
        db.insert_agent(&agent).await.unwrap();

        let answer = Answer::new(
            "acme".to_string(),
            agent.id.clone(),
            "How many leave days?".to_string(),
            "25 days per year.".to_string(),
            0.82,
            false,
        );
        db.insert_answer(&answer).await.unwrap();

        let citations = vec![Citation::new(
            answer.id.clone(),
            "doc-1".to_string(),
            "Leave Policy".to_string(),
            0,
            0.91,
        )];
        db.insert_citations(&citations).await.unwrap();

        let rows: Vec<Citation> = sqlx::query_as("SELECT * FROM citations WHERE answer_id = ?")
            .bind(&answer.id)
            .fetch_all(&db.pool)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].doc_title, "Leave Policy");
    }

    #[tokio::test]
    async fn test_status_counts_scoped_to_tenant() {
        let (_tmp, db) = test_db().await;

        let kb = KnowledgeBase::new("acme".to_string(), "kb".to_string(), None);
        db.insert_kb(&kb).await.unwrap();

        for (tenant, status) in [
            ("acme", DocStatus::Completed),
            ("acme", DocStatus::Completed),
            ("acme", DocStatus::Failed),
            ("globex", DocStatus::Completed),
        ] {
            let doc = Document::new(
                tenant.to_string(),
                kb.id.clone(),
                "Doc".to_string(),
                "k".to_string(),
                "text".to_string(),
            );
            db.insert_document(&doc).await.unwrap();
            match status {
                DocStatus::Completed => db.mark_completed(&doc.id, 1).await.unwrap(),
                DocStatus::Failed => db.mark_failed(&doc.id, "err").await.unwrap(),
                _ => {}
            }
        }

        let counts = db.status_counts("acme").await.unwrap();
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.pending, 0);
    }
}
