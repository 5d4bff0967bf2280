//! Document ingestion pipeline
//!
//! extract -> clean -> chunk -> embed -> index, strictly sequential per
//! document. Pipeline errors are recorded on the document row as `failed`
//! and never propagate past `ingest_document`.

use crate::blob::blob_key;
use crate::chunk::{chunk_text, clean_text, compute_text_hash};
use crate::embed::embed_in_batches;
use crate::error::{Error, Result};
use crate::extract::{extract_text, FileKind};
use crate::meta::{Chunk, Document, KnowledgeBase};
use crate::store::{point_id, ChunkPayload, ChunkPoint};
use crate::AppContext;
use std::path::Path;
use tracing::{info, warn};

/// Cached cleaned text shorter than this is treated as absent
const MIN_CACHED_CHARS: usize = 50;

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Re-run extraction even when cleaned text is already cached
    pub force_extract: bool,
}

/// Resolve a knowledge base by name or id within a tenant
pub async fn resolve_kb(ctx: &AppContext, tenant_id: &str, kb: &str) -> Result<KnowledgeBase> {
    if let Some(found) = ctx.db.get_kb_by_name(tenant_id, kb).await? {
        return Ok(found);
    }
    match ctx.db.get_kb(kb).await? {
        Some(found) if found.tenant_id == tenant_id => Ok(found),
        _ => Err(Error::KnowledgeBaseNotFound(kb.to_string())),
    }
}

/// Store a local file in the blob store and create its document row
pub async fn upload_document(
    ctx: &AppContext,
    tenant_id: &str,
    kb: &str,
    path: &Path,
) -> Result<Document> {
    let kb = resolve_kb(ctx, tenant_id, kb).await?;
    let kind = FileKind::from_name(path)?;

    let title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Untitled")
        .to_string();

    let mut doc = Document::new(
        tenant_id.to_string(),
        kb.id,
        title,
        String::new(),
        kind.to_string(),
    );
    doc.file_key = blob_key(&doc.id, path);

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::InvalidPath(format!("{}: {}", path.display(), e)))?;
    ctx.blobs.upload(&doc.file_key, &bytes).await?;
    ctx.db.insert_document(&doc).await?;

    info!(doc_id = %doc.id, title = %doc.title, "Uploaded document");
    Ok(doc)
}

/// Upload a file and run the full ingestion pipeline on it
pub async fn upload_and_ingest(
    ctx: &AppContext,
    tenant_id: &str,
    kb: &str,
    path: &Path,
    options: &IngestOptions,
) -> Result<Document> {
    let doc = upload_document(ctx, tenant_id, kb, path).await?;
    ingest_document(ctx, &doc.id, options).await
}

/// Run the ingestion pipeline for an existing document.
///
/// Returns the document's final state; a pipeline failure is recorded on
/// the row (`failed` + message) instead of being returned.
pub async fn ingest_document(
    ctx: &AppContext,
    doc_id: &str,
    options: &IngestOptions,
) -> Result<Document> {
    let doc = ctx
        .db
        .get_document(doc_id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(doc_id.to_string()))?;

    ctx.db.mark_processing(&doc.id).await?;

    match run_pipeline(ctx, &doc, options).await {
        Ok(chunk_count) => {
            info!(doc_id = %doc.id, chunks = chunk_count, "Document ingested");
            ctx.db.mark_completed(&doc.id, chunk_count).await?;
        }
        Err(e) => {
            warn!(doc_id = %doc.id, "Ingestion failed: {}", e);
            ctx.db.mark_failed(&doc.id, &e.to_string()).await?;
        }
    }

    ctx.db
        .get_document(doc_id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(doc_id.to_string()))
}

async fn run_pipeline(ctx: &AppContext, doc: &Document, options: &IngestOptions) -> Result<i64> {
    let kind: FileKind = doc.file_kind.parse()?;

    let cached = doc
        .raw_content
        .as_deref()
        .filter(|c| c.trim().len() > MIN_CACHED_CHARS);

    let cleaned = match cached {
        Some(content) if !options.force_extract => {
            info!(doc_id = %doc.id, "Reusing cached extracted text");
            content.to_string()
        }
        _ => {
            let bytes = ctx.blobs.download(&doc.file_key).await?;
            let layout = if kind.layout_sensitive() {
                ctx.layout.as_deref()
            } else {
                None
            };
            let raw = extract_text(&bytes, kind, layout).await?;
            let cleaned = clean_text(&raw);
            if cleaned.is_empty() {
                return Err(Error::Extraction("Document contains no text".to_string()));
            }
            let hash = compute_text_hash(&cleaned);
            ctx.db.update_raw_content(&doc.id, &cleaned, &hash).await?;
            cleaned
        }
    };

    let chunks = chunk_text(&cleaned, &doc.title, &ctx.config.chunk);

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embed_in_batches(
        ctx.embedder.as_ref(),
        texts,
        ctx.config.embedding.batch_size,
    )
    .await?;

    let index = ctx.store.tenant(&doc.tenant_id);
    index.ensure_collection().await?;

    // Old vectors must be gone before the new ones land; the deterministic
    // point ids make a second run overwrite rather than duplicate
    index.delete_by_document(&doc.id).await?;

    let points: Vec<ChunkPoint> = chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| ChunkPoint {
            id: point_id(&doc.id, chunk.index),
            vector,
            payload: ChunkPayload {
                document_id: doc.id.clone(),
                title: doc.title.clone(),
                tenant_id: doc.tenant_id.clone(),
                kb_id: doc.kb_id.clone(),
                chunk_index: chunk.index,
                text: chunk.text.clone(),
            },
        })
        .collect();
    index.upsert(points).await?;

    let rows: Vec<Chunk> = chunks
        .iter()
        .map(|c| {
            Chunk::new(
                doc.id.clone(),
                c.index as i64,
                c.text.clone(),
                c.start_char as i64,
                c.end_char as i64,
                c.page as i64,
            )
        })
        .collect();
    ctx.db.replace_chunks(&doc.id, &rows).await?;

    Ok(rows.len() as i64)
}
