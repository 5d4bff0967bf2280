//! Point payloads stored alongside vectors

use qdrant_client::Payload;
use serde_json::Value;
use uuid::Uuid;

/// Logical key identifying a chunk's vector
pub fn vector_key(document_id: &str, chunk_index: usize) -> String {
    format!("{}_chunk_{}", document_id, chunk_index)
}

/// Deterministic point UUID derived from the logical vector key.
///
/// Qdrant point ids must be UUIDs or integers; deriving a v5 UUID from
/// the key makes re-ingestion overwrite in place.
pub fn point_id(document_id: &str, chunk_index: usize) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        vector_key(document_id, chunk_index).as_bytes(),
    )
}

/// Payload stored with each chunk vector
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPayload {
    pub document_id: String,
    pub title: String,
    pub tenant_id: String,
    pub kb_id: String,
    pub chunk_index: usize,
    pub text: String,
}

impl ChunkPayload {
    pub fn to_qdrant_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("document_id", self.document_id.clone());
        payload.insert("title", self.title.clone());
        payload.insert("tenant_id", self.tenant_id.clone());
        payload.insert("kb_id", self.kb_id.clone());
        payload.insert("chunk_index", self.chunk_index as i64);
        payload.insert("text", self.text.clone());
        payload
    }
}

impl From<serde_json::Map<String, Value>> for ChunkPayload {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        let get_str = |key: &str| {
            map.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        Self {
            document_id: get_str("document_id"),
            title: get_str("title"),
            tenant_id: get_str("tenant_id"),
            kb_id: get_str("kb_id"),
            chunk_index: map
                .get("chunk_index")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize,
            text: get_str("text"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_key_format() {
        assert_eq!(vector_key("doc-1", 3), "doc-1_chunk_3");
    }

    #[test]
    fn test_point_id_is_deterministic() {
        assert_eq!(point_id("doc-1", 0), point_id("doc-1", 0));
        assert_ne!(point_id("doc-1", 0), point_id("doc-1", 1));
        assert_ne!(point_id("doc-1", 0), point_id("doc-2", 0));
    }

    #[test]
    fn test_payload_map_roundtrip() {
        let payload = ChunkPayload {
            document_id: "doc-1".to_string(),
            title: "Leave Policy".to_string(),
            tenant_id: "tenant-a".to_string(),
            kb_id: "kb-1".to_string(),
            chunk_index: 2,
            text: "Employees accrue leave monthly.".to_string(),
        };

        let mut map = serde_json::Map::new();
        map.insert("document_id".to_string(), "doc-1".into());
        map.insert("title".to_string(), "Leave Policy".into());
        map.insert("tenant_id".to_string(), "tenant-a".into());
        map.insert("kb_id".to_string(), "kb-1".into());
        map.insert("chunk_index".to_string(), 2.into());
        map.insert("text".to_string(), "Employees accrue leave monthly.".into());

        assert_eq!(ChunkPayload::from(map), payload);
    }

    #[test]
    fn test_missing_fields_default() {
        let payload = ChunkPayload::from(serde_json::Map::new());
        assert_eq!(payload.document_id, "");
        assert_eq!(payload.chunk_index, 0);
    }
}
