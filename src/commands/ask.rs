//! Question answering
//!
//! retrieve -> generate -> score -> handoff decision -> persist. A failure
//! anywhere past agent lookup degrades to an apology with zero confidence
//! and a forced handoff; the caller always gets an answer.

use crate::confidence::{score_confidence, should_handoff};
use crate::error::{Error, Result};
use crate::generate::{build_user_message, Completion, GenerationOptions};
use crate::learn::{should_learn, LearnQueue, LearnTask};
use crate::meta::{Agent, Answer, Citation};
use crate::retrieve::{retrieve, RetrievedContext};
use crate::store::ChunkSearcher;
use crate::AppContext;
use serde::Serialize;
use tracing::{debug, error};

/// Fallback answer when the query pipeline fails
pub const APOLOGY: &str =
    "I'm sorry, I wasn't able to answer that right now. A teammate will follow up shortly.";

/// The outcome returned to the caller and persisted to history
#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub answer_id: String,
    pub answer: String,
    pub confidence: f32,
    pub should_handoff: bool,
    pub model: Option<String>,
    pub tokens_used: Option<i64>,
    pub citations: Vec<CitationOut>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CitationOut {
    pub doc_id: String,
    pub doc_title: String,
    pub chunk_index: usize,
    pub score: f32,
}

/// Resolve an agent by name or id within a tenant
pub async fn resolve_agent(ctx: &AppContext, tenant_id: &str, agent: &str) -> Result<Agent> {
    if let Some(found) = ctx.db.get_agent_by_name(tenant_id, agent).await? {
        return Ok(found);
    }
    match ctx.db.get_agent(agent).await? {
        Some(found) if found.tenant_id == tenant_id => Ok(found),
        _ => Err(Error::AgentNotFound(agent.to_string())),
    }
}

/// Answer a question as the given agent.
///
/// The agent is loaded fresh on every call so configuration edits take
/// effect immediately. A missing agent is a hard error; everything after
/// that degrades to the apology instead of failing.
pub async fn answer_question(
    ctx: &AppContext,
    learn_queue: Option<&LearnQueue>,
    tenant_id: &str,
    agent: &str,
    question: &str,
) -> Result<AskOutcome> {
    let agent = resolve_agent(ctx, tenant_id, agent).await?;
    let kb_ids = ctx.db.agent_kb_ids(&agent.id).await?;

    let (answer_text, confidence, handoff, model, tokens_used, retrieved) =
        match run_query(ctx, &agent, &kb_ids, question).await {
            Ok((completion, retrieved)) => {
                let scores: Vec<f32> = retrieved.chunks.iter().map(|c| c.score).collect();
                let confidence = score_confidence(&scores);
                let handoff = should_handoff(confidence, agent.confidence_threshold);
                debug!(confidence, handoff, "Scored answer");
                (
                    completion.text,
                    confidence,
                    handoff,
                    Some(completion.model),
                    completion.tokens_used.map(i64::from),
                    Some(retrieved),
                )
            }
            Err(e) => {
                error!(agent = %agent.name, "Query pipeline failed: {}", e);
                (APOLOGY.to_string(), 0.0, true, None, None, None)
            }
        };

    let mut answer = Answer::new(
        tenant_id.to_string(),
        agent.id.clone(),
        question.to_string(),
        answer_text,
        confidence,
        handoff,
    );
    answer.model = model.clone();
    answer.tokens_used = tokens_used;

    let citations: Vec<Citation> = retrieved
        .as_ref()
        .map(|r| {
            r.chunks
                .iter()
                .map(|c| {
                    Citation::new(
                        answer.id.clone(),
                        c.document_id.clone(),
                        c.title.clone(),
                        c.chunk_index as i64,
                        c.score,
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    // Losing the history row is logged, not raised; the caller still
    // gets the computed answer
    if let Err(e) = persist_exchange(ctx, &answer, &citations).await {
        error!(answer_id = %answer.id, "Failed to persist answer: {}", e);
    }

    if let (Some(queue), Some(retrieved)) = (learn_queue, retrieved.as_ref()) {
        if should_learn(confidence, agent.learn_enabled, kb_ids.len()) {
            let mut cited_titles: Vec<String> = Vec::new();
            for chunk in &retrieved.chunks {
                if !cited_titles.contains(&chunk.title) {
                    cited_titles.push(chunk.title.clone());
                }
            }
            queue.enqueue(LearnTask {
                tenant_id: tenant_id.to_string(),
                agent_id: agent.id.clone(),
                agent_name: agent.name.clone(),
                question: question.to_string(),
                answer: answer.answer.clone(),
                confidence,
                model: model.clone(),
                cited_titles,
            });
        }
    }

    Ok(AskOutcome {
        answer_id: answer.id,
        answer: answer.answer,
        confidence,
        should_handoff: handoff,
        model,
        tokens_used,
        citations: citations
            .into_iter()
            .map(|c| CitationOut {
                doc_id: c.doc_id,
                doc_title: c.doc_title,
                chunk_index: c.chunk_index as usize,
                score: c.score,
            })
            .collect(),
    })
}

async fn persist_exchange(ctx: &AppContext, answer: &Answer, citations: &[Citation]) -> Result<()> {
    ctx.db.insert_answer(answer).await?;
    ctx.db.insert_citations(citations).await?;
    Ok(())
}

async fn run_query(
    ctx: &AppContext,
    agent: &Agent,
    kb_ids: &[String],
    question: &str,
) -> Result<(Completion, RetrievedContext)> {
    let index = ctx.store.tenant(&agent.tenant_id);
    run_query_with(ctx, &index, agent, kb_ids, question).await
}

async fn run_query_with(
    ctx: &AppContext,
    index: &dyn ChunkSearcher,
    agent: &Agent,
    kb_ids: &[String],
    question: &str,
) -> Result<(Completion, RetrievedContext)> {
    let kb_filter = if kb_ids.is_empty() {
        None
    } else {
        Some(kb_ids)
    };

    let retrieved = retrieve(
        ctx.embedder.as_ref(),
        index,
        question,
        ctx.config.query.top_k,
        kb_filter,
    )
    .await?;

    let options = GenerationOptions {
        model: agent
            .model
            .clone()
            .unwrap_or_else(|| ctx.config.generation.model.clone()),
        temperature: agent.temperature.unwrap_or(ctx.config.generation.temperature),
        max_tokens: agent
            .max_tokens
            .map(|t| t as u32)
            .unwrap_or(ctx.config.generation.max_tokens),
    };

    let user_message = build_user_message(question, &retrieved.context);
    let completion = ctx
        .completion
        .complete(&agent.system_prompt, &user_message, &options)
        .await?;

    Ok((completion, retrieved))
}
