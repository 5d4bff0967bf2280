//! Default values for configuration fields

pub fn default_qdrant_url() -> String {
    "http://127.0.0.1:6334".to_string()
}

pub fn default_qdrant_api_key_env() -> String {
    "QDRANT_API_KEY".to_string()
}

pub fn default_collection_prefix() -> String {
    "ragline".to_string()
}

pub fn default_provider_timeout() -> u64 {
    30
}

pub fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

pub fn default_embedding_dimension() -> usize {
    1536
}

pub fn default_embedding_batch_size() -> usize {
    100
}

pub fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

pub fn default_generation_temperature() -> f32 {
    0.7
}

pub fn default_generation_max_tokens() -> u32 {
    1024
}

pub fn default_chunk_max_chars() -> usize {
    // ~800 tokens at the 4 chars/token heuristic
    3200
}

pub fn default_chunk_overlap() -> usize {
    // ~200 tokens
    800
}

pub fn default_chunk_min_chars() -> usize {
    50
}

pub fn default_boundary_window() -> usize {
    200
}

pub fn default_min_cut_offset() -> usize {
    100
}

pub fn default_chars_per_page() -> usize {
    1800
}

pub fn default_query_top_k() -> usize {
    5
}

pub fn default_learn_enabled() -> bool {
    true
}

pub fn default_learn_queue_capacity() -> usize {
    64
}

pub fn default_reprocess_concurrency() -> usize {
    4
}
