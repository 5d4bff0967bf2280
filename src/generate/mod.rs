//! Answer generation
//!
//! This module wraps the completion provider behind a trait:
//! - A trait so tests and alternate backends can swap in
//! - An OpenAI-compatible `/chat/completions` backend
//! - The fixed prompt frame that pins answers to retrieved context

mod http_backend;

pub use http_backend::*;

use crate::error::Result;
use async_trait::async_trait;

/// Per-call generation parameters, resolved from the agent
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A completed generation
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub tokens_used: Option<u32>,
    pub model: String,
}

/// Trait for completion providers
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Run a chat completion with a system prompt and a single user message
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        options: &GenerationOptions,
    ) -> Result<Completion>;
}

/// Wrap the question and retrieved context in the fixed grounding frame.
///
/// The frame instructs the model to answer only from the supplied context,
/// admit when the context is insufficient, stay concise, and cite source
/// documents by name.
pub fn build_user_message(question: &str, context: &str) -> String {
    format!(
        "Use the following context to answer the question. \
         Answer using only information from the context. \
         If the context does not contain enough information to answer, say so plainly. \
         Be concise. When you use a source, cite it by its document name.\n\n\
         Context:\n{}\n\n\
         Question: {}",
        context, question
    )
}
