//! Bulk reprocessing
//!
//! Re-runs the ingestion pipeline over a tenant's documents through a
//! bounded concurrency pool. Per-document failures land on the document
//! rows; the bulk run itself keeps going.

use crate::commands::ingest::{ingest_document, IngestOptions};
use crate::error::Result;
use crate::meta::DocStatus;
use crate::AppContext;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct ReprocessOptions {
    /// Restrict to one knowledge base (name or id)
    pub kb: Option<String>,
    /// Re-run extraction instead of reusing cached text
    pub force_extract: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReprocessStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Re-ingest a tenant's documents with bounded concurrency
pub async fn cmd_reprocess(
    ctx: &AppContext,
    tenant_id: &str,
    options: ReprocessOptions,
) -> Result<ReprocessStats> {
    let docs = match &options.kb {
        Some(kb) => {
            let kb = crate::commands::ingest::resolve_kb(ctx, tenant_id, kb).await?;
            ctx.db.list_documents(&kb.id).await?
        }
        None => ctx.db.list_tenant_documents(tenant_id).await?,
    };

    let mut stats = ReprocessStats {
        total: docs.len(),
        ..Default::default()
    };
    if docs.is_empty() {
        return Ok(stats);
    }

    info!(total = docs.len(), "Reprocessing documents");
    let pb = start_progress_bar(docs.len(), "Reprocessing");

    let ingest_options = IngestOptions {
        force_extract: options.force_extract,
    };
    let concurrency = ctx.config.reprocess.concurrency;

    let mut results = stream::iter(docs)
        .map(|doc| {
            let ingest_options = ingest_options.clone();
            async move { ingest_document(ctx, &doc.id, &ingest_options).await }
        })
        .buffer_unordered(concurrency);

    while let Some(result) = results.next().await {
        match result?.get_status()? {
            DocStatus::Completed => stats.completed += 1,
            _ => stats.failed += 1,
        }
        advance_progress(&pb);
    }

    finish_progress(pb, "Done");
    Ok(stats)
}

fn start_progress_bar(len: usize, message: &str) -> Option<ProgressBar> {
    if len == 0 {
        return None;
    }

    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

fn advance_progress(pb: &Option<ProgressBar>) {
    if let Some(pb) = pb {
        pb.inc(1);
    }
}

fn finish_progress(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.finish_with_message(message.to_string());
    }
}
