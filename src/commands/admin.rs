//! Knowledge base and agent administration

use crate::error::{Error, Result};
use crate::meta::{Agent, KnowledgeBase};
use crate::AppContext;
use tracing::info;

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i64>,
    pub confidence_threshold: f32,
    pub learn_enabled: bool,
    /// Knowledge bases (names or ids) to link at creation
    pub kbs: Vec<String>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            model: None,
            temperature: None,
            max_tokens: None,
            confidence_threshold: 0.6,
            learn_enabled: true,
            kbs: Vec::new(),
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant answering questions from the provided documents.";

/// Create a knowledge base
pub async fn cmd_kb_add(
    ctx: &AppContext,
    tenant_id: &str,
    name: &str,
    description: Option<String>,
) -> Result<KnowledgeBase> {
    if ctx.db.get_kb_by_name(tenant_id, name).await?.is_some() {
        return Err(Error::Config(format!(
            "Knowledge base '{}' already exists for tenant '{}'",
            name, tenant_id
        )));
    }

    let kb = KnowledgeBase::new(tenant_id.to_string(), name.to_string(), description);
    ctx.db.insert_kb(&kb).await?;
    info!(kb_id = %kb.id, name = %kb.name, "Created knowledge base");
    Ok(kb)
}

pub async fn cmd_kb_list(ctx: &AppContext, tenant_id: &str) -> Result<Vec<KnowledgeBase>> {
    ctx.db.list_kbs(tenant_id).await
}

/// Create an agent and link its knowledge bases
pub async fn cmd_agent_add(
    ctx: &AppContext,
    tenant_id: &str,
    name: &str,
    options: AgentOptions,
) -> Result<Agent> {
    if ctx.db.get_agent_by_name(tenant_id, name).await?.is_some() {
        return Err(Error::Config(format!(
            "Agent '{}' already exists for tenant '{}'",
            name, tenant_id
        )));
    }

    let mut agent = Agent::new(
        tenant_id.to_string(),
        name.to_string(),
        options
            .system_prompt
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        options.confidence_threshold,
    );
    agent.model = options.model;
    agent.temperature = options.temperature;
    agent.max_tokens = options.max_tokens;
    agent.learn_enabled = options.learn_enabled;

    ctx.db.insert_agent(&agent).await?;

    for kb in &options.kbs {
        let kb = crate::commands::ingest::resolve_kb(ctx, tenant_id, kb).await?;
        ctx.db.link_agent_kb(&agent.id, &kb.id).await?;
    }

    info!(agent_id = %agent.id, name = %agent.name, "Created agent");
    Ok(agent)
}

pub async fn cmd_agent_list(ctx: &AppContext, tenant_id: &str) -> Result<Vec<Agent>> {
    ctx.db.list_agents(tenant_id).await
}

/// Link an existing agent to an existing knowledge base
pub async fn cmd_agent_link(
    ctx: &AppContext,
    tenant_id: &str,
    agent: &str,
    kb: &str,
) -> Result<()> {
    let agent = crate::commands::ask::resolve_agent(ctx, tenant_id, agent).await?;
    let kb = crate::commands::ingest::resolve_kb(ctx, tenant_id, kb).await?;
    ctx.db.link_agent_kb(&agent.id, &kb.id).await?;
    info!(agent = %agent.name, kb = %kb.name, "Linked agent to knowledge base");
    Ok(())
}
