//! Status command implementation

use crate::error::Result;
use crate::meta::StatusCounts;
use crate::AppContext;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub tenant_id: String,
    pub knowledge_bases: usize,
    pub agents: usize,
    pub documents: StatusCounts,
    pub collection: Option<CollectionStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStatus {
    pub name: String,
    pub points_count: u64,
    pub status: String,
}

/// Collect a tenant's status from SQLite and the vector index
pub async fn cmd_status(ctx: &AppContext, tenant_id: &str) -> Result<StatusReport> {
    let knowledge_bases = ctx.db.list_kbs(tenant_id).await?.len();
    let agents = ctx.db.list_agents(tenant_id).await?.len();
    let documents = ctx.db.status_counts(tenant_id).await?;

    let index = ctx.store.tenant(tenant_id);
    // An unreachable vector index should not hide the SQLite side
    let collection = match index.collection_info().await {
        Ok(info) => info.map(|i| CollectionStatus {
            name: index.collection_name().to_string(),
            points_count: i.points_count,
            status: i.status,
        }),
        Err(e) => {
            debug!("Vector index unavailable: {}", e);
            None
        }
    };

    Ok(StatusReport {
        tenant_id: tenant_id.to_string(),
        knowledge_bases,
        agents,
        documents,
        collection,
    })
}

pub fn print_status(report: &StatusReport) {
    println!("Tenant: {}", report.tenant_id);
    println!("Knowledge bases: {}", report.knowledge_bases);
    println!("Agents: {}", report.agents);
    println!("\nDocuments:");
    println!("  pending:    {}", report.documents.pending);
    println!("  processing: {}", report.documents.processing);
    println!("  completed:  {}", report.documents.completed);
    println!("  failed:     {}", report.documents.failed);

    match &report.collection {
        Some(c) => {
            println!("\nVector collection: {} ({})", c.name, c.status);
            println!("  points: {}", c.points_count);
        }
        None => println!("\nVector collection: not available"),
    }
}
