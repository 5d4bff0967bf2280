//! Qdrant vector database integration
//!
//! This module wraps the Qdrant client and provides:
//! - Per-tenant collection management (one collection per tenant)
//! - Point upsert/delete operations
//! - Filtered vector search scoped to knowledge bases

mod payload;

pub use payload::*;

use crate::config::Config;
use crate::error::{Error, Result};
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId,
    PointStruct, ScalarQuantizationBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use async_trait::async_trait;
use qdrant_client::Qdrant;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

/// Maximum points per upsert call
const UPSERT_BATCH: usize = 100;

/// Information about a tenant's collection
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub points_count: u64,
    pub status: String,
}

/// A chunk vector ready for indexing
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

impl ChunkPoint {
    fn to_point_struct(self) -> PointStruct {
        PointStruct::new(
            self.id.to_string(),
            self.vector,
            self.payload.to_qdrant_payload(),
        )
    }
}

/// Search result with its payload
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub payload: ChunkPayload,
}

/// Search surface of a tenant's index, split out as a trait so the query
/// path can be exercised without a live qdrant
#[async_trait]
pub trait ChunkSearcher: Send + Sync {
    async fn search(
        &self,
        query_vector: Vec<f32>,
        limit: usize,
        kb_ids: Option<&[String]>,
    ) -> Result<Vec<SearchResult>>;
}

/// Qdrant store handle shared across tenants
pub struct VectorStore {
    client: Qdrant,
    prefix: String,
    dimension: usize,
}

impl VectorStore {
    /// Connect to Qdrant using config
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::new(
            &config.qdrant_url,
            config.qdrant_api_key(),
            &config.collection_prefix,
            config.embedding.dimension,
        )
        .await
    }

    /// Create a new store connection directly
    pub async fn new(
        url: &str,
        api_key: Option<String>,
        prefix: &str,
        dimension: usize,
    ) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let mut builder = Qdrant::from_url(url).skip_compatibility_check();
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|e| Error::VectorIndex(e.to_string()))?;

        Ok(Self {
            client,
            prefix: prefix.to_string(),
            dimension,
        })
    }

    /// Get the expected vector dimension for this store
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Index handle scoped to one tenant's collection
    pub fn tenant(&self, tenant_id: &str) -> TenantIndex<'_> {
        TenantIndex {
            store: self,
            collection: format!("{}_tenant_{}", self.prefix, tenant_id),
        }
    }
}

/// All operations on a single tenant's collection. Tenant isolation holds
/// by construction: every call below names exactly one collection.
pub struct TenantIndex<'a> {
    store: &'a VectorStore,
    collection: String,
}

impl TenantIndex<'_> {
    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Ensure the tenant's collection exists with correct configuration
    pub async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .store
            .client
            .collection_exists(&self.collection)
            .await?;
        if exists {
            debug!("Collection {} already exists", self.collection);
            return Ok(());
        }

        info!(
            "Creating collection {} with dimension {}",
            self.collection, self.store.dimension
        );

        let vectors_config =
            VectorParamsBuilder::new(self.store.dimension as u64, Distance::Cosine);

        self.store
            .client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(vectors_config)
                    .quantization_config(ScalarQuantizationBuilder::default()),
            )
            .await?;

        Ok(())
    }

    /// Upsert chunk points, splitting into provider-sized calls
    pub async fn upsert(&self, points: Vec<ChunkPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        if let Some(mismatch) = points.iter().find(|p| p.vector.len() != self.store.dimension) {
            return Err(Error::VectorIndex(format!(
                "Vector dimension mismatch for collection '{}': expected {}, got {}",
                self.collection,
                self.store.dimension,
                mismatch.vector.len()
            )));
        }

        debug!(
            "Upserting {} points to collection {}",
            points.len(),
            self.collection
        );

        for batch in points.chunks(UPSERT_BATCH) {
            let point_structs: Vec<PointStruct> = batch
                .iter()
                .cloned()
                .map(|p| p.to_point_struct())
                .collect();

            self.store
                .client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, point_structs))
                .await?;
        }

        Ok(())
    }

    /// Delete every point belonging to a document
    pub async fn delete_by_document(&self, document_id: &str) -> Result<()> {
        debug!(
            "Deleting points for document {} from collection {}",
            document_id, self.collection
        );

        let filter = Filter::must([Condition::matches(
            "document_id",
            document_id.to_string(),
        )]);

        self.store
            .client
            .delete_points(DeletePointsBuilder::new(&self.collection).points(filter))
            .await?;

        Ok(())
    }

    /// Search for similar vectors, optionally restricted to knowledge bases
    pub async fn search(
        &self,
        query_vector: Vec<f32>,
        limit: usize,
        kb_ids: Option<&[String]>,
    ) -> Result<Vec<SearchResult>> {
        debug!(
            "Searching collection {} with limit {}",
            self.collection, limit
        );

        // A tenant that has never ingested a document has no collection;
        // that is zero matches, not an error
        if !self
            .store
            .client
            .collection_exists(&self.collection)
            .await?
        {
            debug!("Collection {} does not exist yet", self.collection);
            return Ok(Vec::new());
        }

        let mut search_builder =
            SearchPointsBuilder::new(&self.collection, query_vector, limit as u64)
                .with_payload(true);

        if let Some(filter) = kb_filter(kb_ids) {
            search_builder = search_builder.filter(filter);
        }

        let response = self.store.client.search_points(search_builder).await?;

        let results: Vec<SearchResult> = response
            .result
            .into_iter()
            .map(|p| {
                let payload: ChunkPayload = p
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, json_from_qdrant_value(v)))
                    .collect::<serde_json::Map<String, Value>>()
                    .into();

                SearchResult {
                    id: point_id_to_string(p.id),
                    score: p.score,
                    payload,
                }
            })
            .collect();

        Ok(results)
    }

    /// Get collection info (point count, status); None if absent
    pub async fn collection_info(&self) -> Result<Option<CollectionInfo>> {
        if !self
            .store
            .client
            .collection_exists(&self.collection)
            .await?
        {
            return Ok(None);
        }

        let info = self.store.client.collection_info(&self.collection).await?;
        Ok(info.result.map(|result| CollectionInfo {
            points_count: result.points_count.unwrap_or(0),
            status: format!("{:?}", result.status()),
        }))
    }
}

#[async_trait]
impl ChunkSearcher for TenantIndex<'_> {
    async fn search(
        &self,
        query_vector: Vec<f32>,
        limit: usize,
        kb_ids: Option<&[String]>,
    ) -> Result<Vec<SearchResult>> {
        TenantIndex::search(self, query_vector, limit, kb_ids).await
    }
}

/// Build a knowledge-base restriction filter; an empty or absent list
/// means no restriction within the tenant's collection
fn kb_filter(kb_ids: Option<&[String]>) -> Option<Filter> {
    let ids = kb_ids?;
    if ids.is_empty() {
        return None;
    }
    Some(Filter::must([Condition::matches("kb_id", ids.to_vec())]))
}

/// Convert PointId to string
fn point_id_to_string(id: Option<PointId>) -> String {
    match id {
        Some(PointId {
            point_id_options: Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(uuid)),
        }) => uuid,
        Some(PointId {
            point_id_options: Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(num)),
        }) => num.to_string(),
        _ => String::new(),
    }
}

/// Convert Qdrant value to serde_json Value
fn json_from_qdrant_value(v: qdrant_client::qdrant::Value) -> Value {
    use qdrant_client::qdrant::value::Kind;

    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(json_from_qdrant_value)
                .collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collection_name_per_tenant() {
        // No network traffic happens until a collection call is made
        let store = VectorStore::new("http://127.0.0.1:6334", None, "ragline", 3)
            .await
            .expect("store should initialize");

        assert_eq!(
            store.tenant("acme").collection_name(),
            "ragline_tenant_acme"
        );
        assert_eq!(
            store.tenant("globex").collection_name(),
            "ragline_tenant_globex"
        );
    }

    #[test]
    fn test_kb_filter_construction() {
        assert!(kb_filter(None).is_none());
        assert!(kb_filter(Some(&[])).is_none());

        let filter = kb_filter(Some(&["kb-1".to_string(), "kb-2".to_string()])).unwrap();
        assert_eq!(filter.must.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_rejects_dimension_mismatch() {
        let store = VectorStore::new("http://127.0.0.1:6334", None, "ragline", 3)
            .await
            .expect("store should initialize");

        let point = ChunkPoint {
            id: point_id("doc-1", 0),
            vector: vec![0.1, 0.2],
            payload: ChunkPayload {
                document_id: "doc-1".to_string(),
                title: "Doc".to_string(),
                tenant_id: "acme".to_string(),
                kb_id: "kb-1".to_string(),
                chunk_index: 0,
                text: "text".to_string(),
            },
        };

        let err = store
            .tenant("acme")
            .upsert(vec![point])
            .await
            .expect_err("should reject mismatched vector length");

        match err {
            Error::VectorIndex(message) => assert!(message.contains("dimension mismatch")),
            other => panic!("expected vector index error, got {other:?}"),
        }
    }
}
