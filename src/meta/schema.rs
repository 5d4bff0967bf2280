//! SQLite schema definition

/// SQL schema for the metadata database
pub const SCHEMA_SQL: &str = r#"
-- Knowledge bases: named document collections, scoped to a tenant
CREATE TABLE IF NOT EXISTS knowledge_bases (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(tenant_id, name)
);

-- Agents: query personas linked to one or more knowledge bases
CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    system_prompt TEXT NOT NULL,
    model TEXT,
    temperature REAL,
    max_tokens INTEGER,
    confidence_threshold REAL NOT NULL,
    learn_enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(tenant_id, name)
);

-- Agent <-> knowledge base links
CREATE TABLE IF NOT EXISTS agent_knowledge_bases (
    agent_id TEXT NOT NULL REFERENCES agents(id),
    kb_id TEXT NOT NULL REFERENCES knowledge_bases(id),
    created_at TEXT NOT NULL,
    PRIMARY KEY (agent_id, kb_id)
);

-- Documents: uploaded files and their processing state
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    kb_id TEXT NOT NULL REFERENCES knowledge_bases(id),
    title TEXT NOT NULL,
    file_key TEXT NOT NULL,
    file_kind TEXT NOT NULL,
    raw_content TEXT,
    content_hash TEXT,
    status TEXT NOT NULL,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    tags_json TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Chunks: the indexed slices of each document
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    doc_id TEXT NOT NULL REFERENCES documents(id),
    chunk_index INTEGER NOT NULL,
    content TEXT NOT NULL,
    start_char INTEGER NOT NULL,
    end_char INTEGER NOT NULL,
    page INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    UNIQUE(doc_id, chunk_index)
);

-- Answers: query history with confidence and handoff outcome
CREATE TABLE IF NOT EXISTS answers (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    agent_id TEXT NOT NULL REFERENCES agents(id),
    question TEXT NOT NULL,
    answer TEXT NOT NULL,
    confidence REAL NOT NULL,
    handoff INTEGER NOT NULL,
    model TEXT,
    tokens_used INTEGER,
    created_at TEXT NOT NULL
);

-- Citations: the chunks an answer drew on
CREATE TABLE IF NOT EXISTS citations (
    id TEXT PRIMARY KEY,
    answer_id TEXT NOT NULL REFERENCES answers(id),
    doc_id TEXT NOT NULL,
    doc_title TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    score REAL NOT NULL,
    created_at TEXT NOT NULL
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_kb_tenant ON knowledge_bases(tenant_id);
CREATE INDEX IF NOT EXISTS idx_agents_tenant ON agents(tenant_id);
CREATE INDEX IF NOT EXISTS idx_documents_kb ON documents(kb_id);
CREATE INDEX IF NOT EXISTS idx_documents_tenant ON documents(tenant_id);
CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);
CREATE INDEX IF NOT EXISTS idx_chunks_doc ON chunks(doc_id);
CREATE INDEX IF NOT EXISTS idx_answers_agent ON answers(agent_id);
CREATE INDEX IF NOT EXISTS idx_citations_answer ON citations(answer_id);
"#;
