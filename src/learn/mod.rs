//! Learning loop
//!
//! High-confidence exchanges are written back into the agent's knowledge
//! base as synthetic documents, so good answers reinforce future retrieval.
//! Write-backs flow through a bounded queue consumed by a background
//! worker; a full queue drops the task rather than slowing the answer.

use crate::blob::blob_key;
use crate::commands::ingest::{ingest_document, IngestOptions};
use crate::error::Result;
use crate::meta::Document;
use crate::AppContext;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Exchanges at or above this confidence are written back, independent of
/// the agent's handoff threshold
pub const LEARN_THRESHOLD: f32 = 0.7;

/// Tags every synthetic document carries
pub const LEARN_TAGS: [&str; 3] = ["conversation", "auto-generated", "qa"];

/// A pending write-back
#[derive(Debug, Clone)]
pub struct LearnTask {
    pub tenant_id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub question: String,
    pub answer: String,
    pub confidence: f32,
    pub model: Option<String>,
    pub cited_titles: Vec<String>,
}

/// Whether an exchange qualifies for write-back
pub fn should_learn(confidence: f32, learn_enabled: bool, linked_kb_count: usize) -> bool {
    learn_enabled && linked_kb_count > 0 && confidence >= LEARN_THRESHOLD
}

/// Title for the synthetic document, derived from the question
pub fn exchange_title(question: &str) -> String {
    let trimmed = question.trim();
    let short: String = trimmed.chars().take(80).collect();
    if short.len() < trimmed.len() {
        format!("Q&A: {}...", short)
    } else {
        format!("Q&A: {}", short)
    }
}

/// Render the exchange as a Markdown document body
pub fn render_exchange(task: &LearnTask) -> String {
    let mut body = format!(
        "# {}\n\n## Question\n\n{}\n\n## Answer\n\n{}\n",
        exchange_title(&task.question),
        task.question.trim(),
        task.answer.trim()
    );

    body.push_str(&format!(
        "\n## Details\n\n- Agent: {}\n- Confidence: {:.2}\n",
        task.agent_name, task.confidence
    ));
    if let Some(model) = &task.model {
        body.push_str(&format!("- Model: {}\n", model));
    }
    if !task.cited_titles.is_empty() {
        body.push_str(&format!("- Sources: {}\n", task.cited_titles.join(", ")));
    }

    body
}

/// Sending half of the write-back queue
#[derive(Clone)]
pub struct LearnQueue {
    tx: mpsc::Sender<LearnTask>,
}

impl LearnQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LearnTask>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue a write-back without blocking; a full or closed queue drops
    /// the task
    pub fn enqueue(&self, task: LearnTask) {
        match self.tx.try_send(task) {
            Ok(()) => debug!("Queued learning write-back"),
            Err(mpsc::error::TrySendError::Full(task)) => {
                warn!(agent = %task.agent_name, "Learning queue full, dropping write-back");
            }
            Err(mpsc::error::TrySendError::Closed(task)) => {
                warn!(agent = %task.agent_name, "Learning worker gone, dropping write-back");
            }
        }
    }
}

/// Spawn the background worker that drains the queue. The worker exits
/// when every `LearnQueue` clone has been dropped.
pub fn spawn_worker(ctx: Arc<AppContext>, mut rx: mpsc::Receiver<LearnTask>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(task) = rx.recv().await {
            if let Err(e) = process_task(&ctx, &task).await {
                warn!(agent = %task.agent_name, "Learning write-back failed: {}", e);
            }
        }
        debug!("Learning worker stopped");
    })
}

/// Store the exchange as a synthetic document under the agent's
/// oldest-linked knowledge base and run the standard ingestion pipeline
async fn process_task(ctx: &AppContext, task: &LearnTask) -> Result<()> {
    let kb_ids = ctx.db.agent_kb_ids(&task.agent_id).await?;
    let Some(kb_id) = kb_ids.first() else {
        debug!(agent = %task.agent_name, "Agent has no knowledge base, skipping write-back");
        return Ok(());
    };

    let body = render_exchange(task);
    let mut doc = Document::new(
        task.tenant_id.clone(),
        kb_id.clone(),
        exchange_title(&task.question),
        String::new(),
        "markdown".to_string(),
    );
    doc.file_key = blob_key(&doc.id, Path::new("exchange.md"));
    doc.set_tags(
        &LEARN_TAGS
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>(),
    );

    ctx.blobs.upload(&doc.file_key, body.as_bytes()).await?;
    ctx.db.insert_document(&doc).await?;

    let result = ingest_document(ctx, &doc.id, &IngestOptions::default()).await?;
    info!(
        doc_id = %doc.id,
        status = %result.status,
        "Learning write-back ingested"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> LearnTask {
        LearnTask {
            tenant_id: "acme".to_string(),
            agent_id: "agent-1".to_string(),
            agent_name: "support".to_string(),
            question: "How many leave days do employees get?".to_string(),
            answer: "Employees accrue 25 days of leave per year.".to_string(),
            confidence: 0.82,
            model: Some("gpt-4o-mini".to_string()),
            cited_titles: vec!["Leave Policy".to_string(), "Handbook".to_string()],
        }
    }

    #[test]
    fn test_should_learn_gates() {
        assert!(should_learn(0.7, true, 1));
        assert!(should_learn(0.95, true, 3));
        // Below threshold
        assert!(!should_learn(0.69, true, 1));
        // Agent opted out
        assert!(!should_learn(0.9, false, 1));
        // No knowledge base to write into
        assert!(!should_learn(0.9, true, 0));
    }

    #[test]
    fn test_render_exchange_carries_the_full_record() {
        let body = render_exchange(&task());
        assert!(body.contains("## Question"));
        assert!(body.contains("How many leave days do employees get?"));
        assert!(body.contains("## Answer"));
        assert!(body.contains("25 days of leave"));
        assert!(body.contains("Confidence: 0.82"));
        assert!(body.contains("Model: gpt-4o-mini"));
        assert!(body.contains("Sources: Leave Policy, Handbook"));
    }

    #[test]
    fn test_exchange_title_truncates_long_questions() {
        let long = "why ".repeat(50);
        let title = exchange_title(&long);
        assert!(title.starts_with("Q&A: "));
        assert!(title.ends_with("..."));
        assert!(title.chars().count() < 95);

        assert_eq!(exchange_title("Short?"), "Q&A: Short?");
    }

    #[test]
    fn test_learn_tags() {
        assert_eq!(LEARN_TAGS, ["conversation", "auto-generated", "qa"]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let (queue, mut rx) = LearnQueue::new(1);

        queue.enqueue(task());
        queue.enqueue(task()); // dropped, not blocked on

        assert!(rx.recv().await.is_some());
        drop(queue);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_queue_drop_is_silent() {
        let (queue, rx) = LearnQueue::new(4);
        drop(rx);
        // Must not panic or error
        queue.enqueue(task());
    }
}
