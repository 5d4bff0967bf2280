//! ragline - a multi-tenant RAG pipeline CLI
//!
//! This crate provides:
//! - Document ingestion: extraction, chunking, embedding, vector indexing
//! - Question answering over per-tenant knowledge bases with confidence
//!   scoring and human-handoff decisions
//! - A learning loop that writes high-confidence exchanges back into the
//!   knowledge base

pub mod blob;
pub mod chunk;
pub mod commands;
pub mod confidence;
pub mod config;
pub mod embed;
pub mod error;
pub mod extract;
pub mod generate;
pub mod learn;
pub mod meta;
pub mod retrieve;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};

use crate::blob::{BlobStore, LocalBlobStore};
use crate::embed::{Embedder, HttpEmbedder};
use crate::extract::LayoutReader;
use crate::generate::{CompletionProvider, HttpCompletionProvider};
use crate::meta::MetaDb;
use crate::store::VectorStore;
use std::sync::Arc;

/// Shared handles for every pipeline and command. Built once at startup;
/// no global singletons.
pub struct AppContext {
    pub config: Config,
    pub db: MetaDb,
    pub store: VectorStore,
    pub embedder: Arc<dyn Embedder>,
    pub completion: Arc<dyn CompletionProvider>,
    /// Vision path for layout-sensitive extraction; None disables it
    pub layout: Option<Arc<dyn LayoutReader>>,
    pub blobs: Arc<dyn BlobStore>,
}

impl AppContext {
    /// Wire up all components from configuration
    pub async fn build(config: Config) -> Result<Self> {
        let db = MetaDb::connect(&config).await?;
        if !db.is_initialized().await? {
            return Err(Error::NotInitialized);
        }

        let store = VectorStore::connect(&config).await?;
        let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(&config)?);
        // One provider instance backs both chat completions and vision
        // extraction
        let provider = Arc::new(HttpCompletionProvider::new(&config)?);
        let completion: Arc<dyn CompletionProvider> = provider.clone();
        let layout: Option<Arc<dyn LayoutReader>> = Some(provider);
        let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(&config.paths.blobs_dir));

        Ok(Self {
            config,
            db,
            store,
            embedder,
            completion,
            layout,
            blobs,
        })
    }
}
