//! Retrieval and context assembly
//!
//! Embeds the question, searches the tenant's collection, drops weak
//! matches, and renders the survivors into the context block handed to
//! the generator. The generator always runs; an empty result produces a
//! fixed sentinel context instead of short-circuiting.

use crate::embed::{embed_query, Embedder};
use crate::error::Result;
use crate::store::ChunkSearcher;
use tracing::debug;

/// Matches scoring at or below this are treated as noise
pub const RELEVANCE_FLOOR: f32 = 0.5;

/// Context handed to the generator when nothing relevant was found
pub const NO_CONTEXT_SENTINEL: &str = "No relevant documents found.";

/// A retrieved chunk that survived the relevance floor
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub document_id: String,
    pub title: String,
    pub chunk_index: usize,
    pub text: String,
    pub score: f32,
}

/// Retrieval output: surviving chunks plus the rendered context block
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub chunks: Vec<RetrievedChunk>,
    pub context: String,
}

impl RetrievedContext {
    /// Whether any chunk survived the relevance floor
    pub fn has_context(&self) -> bool {
        !self.chunks.is_empty()
    }
}

/// Embed the question and retrieve relevant chunks from the tenant index
pub async fn retrieve(
    embedder: &dyn Embedder,
    index: &dyn ChunkSearcher,
    question: &str,
    top_k: usize,
    kb_ids: Option<&[String]>,
) -> Result<RetrievedContext> {
    let query_vector = embed_query(embedder, question).await?;
    let results = index.search(query_vector, top_k, kb_ids).await?;

    let chunks: Vec<RetrievedChunk> = results
        .into_iter()
        .filter(|r| r.score > RELEVANCE_FLOOR)
        .map(|r| RetrievedChunk {
            document_id: r.payload.document_id,
            title: r.payload.title,
            chunk_index: r.payload.chunk_index,
            text: r.payload.text,
            score: r.score,
        })
        .collect();

    debug!(survivors = chunks.len(), "Retrieval complete");

    let context = assemble_context(&chunks);
    Ok(RetrievedContext { chunks, context })
}

/// Render surviving chunks into the context block.
///
/// Chunks are grouped by source document in first-seen (best score) order;
/// each document gets one section headed by its title and best relevance
/// percent, with chunks separated by `---`.
pub fn assemble_context(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT_SENTINEL.to_string();
    }

    // Search results arrive ordered by score, so the first chunk seen for
    // a document carries its best score
    let mut doc_order: Vec<&str> = Vec::new();
    for chunk in chunks {
        if !doc_order.contains(&chunk.document_id.as_str()) {
            doc_order.push(&chunk.document_id);
        }
    }

    let mut sections = Vec::with_capacity(doc_order.len());
    for doc_id in doc_order {
        let doc_chunks: Vec<&RetrievedChunk> =
            chunks.iter().filter(|c| c.document_id == doc_id).collect();

        let best_score = doc_chunks
            .iter()
            .map(|c| c.score)
            .fold(f32::NEG_INFINITY, f32::max);
        let title = &doc_chunks[0].title;

        let body = doc_chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");

        sections.push(format!(
            "## {} (relevance: {:.0}%)\n\n{}",
            title,
            best_score * 100.0,
            body
        ));
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ingest::tests::FakeEmbedder;
    use crate::store::{ChunkPayload, SearchResult};
    use async_trait::async_trait;

    struct FixedSearcher(Vec<SearchResult>);

    #[async_trait]
    impl ChunkSearcher for FixedSearcher {
        async fn search(
            &self,
            _query_vector: Vec<f32>,
            _limit: usize,
            _kb_ids: Option<&[String]>,
        ) -> Result<Vec<SearchResult>> {
            Ok(self.0.clone())
        }
    }

    fn result(doc: &str, title: &str, index: usize, text: &str, score: f32) -> SearchResult {
        SearchResult {
            id: format!("{}-{}", doc, index),
            score,
            payload: ChunkPayload {
                document_id: doc.to_string(),
                title: title.to_string(),
                tenant_id: "acme".to_string(),
                kb_id: "kb-1".to_string(),
                chunk_index: index,
                text: text.to_string(),
            },
        }
    }

    fn chunk(doc: &str, title: &str, index: usize, text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            document_id: doc.to_string(),
            title: title.to_string(),
            chunk_index: index,
            text: text.to_string(),
            score,
        }
    }

    #[test]
    fn test_empty_retrieval_yields_sentinel() {
        assert_eq!(assemble_context(&[]), NO_CONTEXT_SENTINEL);
    }

    #[tokio::test]
    async fn test_index_without_documents_yields_sentinel_not_error() {
        // A tenant that never ingested anything searches to zero matches
        let embedder = FakeEmbedder { dimension: 3 };
        let retrieved = retrieve(&embedder, &FixedSearcher(Vec::new()), "anything?", 5, None)
            .await
            .unwrap();

        assert!(!retrieved.has_context());
        assert!(retrieved.chunks.is_empty());
        assert_eq!(retrieved.context, NO_CONTEXT_SENTINEL);
    }

    #[tokio::test]
    async fn test_relevance_floor_is_strict() {
        let embedder = FakeEmbedder { dimension: 3 };
        let searcher = FixedSearcher(vec![
            result("doc-1", "Leave Policy", 0, "25 days per year.", 0.91),
            result("doc-2", "Travel Policy", 0, "borderline", 0.5),
            result("doc-3", "Old Memo", 0, "noise", 0.31),
        ]);

        let retrieved = retrieve(&embedder, &searcher, "leave days?", 5, None)
            .await
            .unwrap();

        // A score exactly at the floor does not survive
        assert_eq!(retrieved.chunks.len(), 1);
        assert_eq!(retrieved.chunks[0].title, "Leave Policy");
        assert!(retrieved.has_context());
    }

    #[test]
    fn test_sections_grouped_by_document() {
        let chunks = vec![
            chunk("doc-1", "Leave Policy", 0, "25 days per year.", 0.91),
            chunk("doc-2", "Travel Policy", 2, "Book through the portal.", 0.74),
            chunk("doc-1", "Leave Policy", 3, "Carry-over capped at 5 days.", 0.68),
        ];

        let context = assemble_context(&chunks);

        assert!(context.contains("## Leave Policy (relevance: 91%)"));
        assert!(context.contains("## Travel Policy (relevance: 74%)"));
        // Both doc-1 chunks live in one section, separated by ---
        let leave_section = context.split("## Travel Policy").next().unwrap();
        assert!(leave_section.contains("25 days per year."));
        assert!(leave_section.contains("---"));
        assert!(leave_section.contains("Carry-over capped at 5 days."));
    }

    #[test]
    fn test_best_score_heads_the_section() {
        let chunks = vec![
            chunk("doc-1", "Policy", 1, "weaker match", 0.62),
            chunk("doc-1", "Policy", 0, "also weak", 0.55),
        ];
        let context = assemble_context(&chunks);
        assert!(context.contains("(relevance: 62%)"));
    }

    #[test]
    fn test_document_order_follows_score_order() {
        let chunks = vec![
            chunk("doc-b", "Second Doc", 0, "b", 0.9),
            chunk("doc-a", "First Doc", 0, "a", 0.8),
        ];
        let context = assemble_context(&chunks);
        let b_pos = context.find("Second Doc").unwrap();
        let a_pos = context.find("First Doc").unwrap();
        assert!(b_pos < a_pos);
    }
}
