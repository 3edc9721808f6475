//! SQLite schema definition

/// SQL schema for the metadata database
pub const SCHEMA_SQL: &str = r#"
-- Materials: uploaded course documents
CREATE TABLE IF NOT EXISTS materials (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    file_url TEXT NOT NULL,
    course_id TEXT NOT NULL,
    processing_status TEXT NOT NULL DEFAULT 'pending',
    chunks_count INTEGER NOT NULL DEFAULT 0,
    processing_error TEXT,
    processing_started_at TEXT,
    processing_completed_at TEXT,
    processed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Material chunks: embedded text segments
CREATE TABLE IF NOT EXISTS material_chunks (
    id TEXT PRIMARY KEY,
    material_id TEXT NOT NULL REFERENCES materials(id),
    content TEXT NOT NULL,
    embedding BLOB NOT NULL,
    chunk_index INTEGER NOT NULL,
    page_number INTEGER,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    UNIQUE(material_id, chunk_index)
);

-- Processing queue: at most one job per material
CREATE TABLE IF NOT EXISTS processing_queue (
    id TEXT PRIMARY KEY,
    material_id TEXT NOT NULL UNIQUE REFERENCES materials(id),
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL DEFAULT 3,
    error TEXT,
    next_attempt_at TEXT NOT NULL,
    lease_expires_at TEXT,
    claim_token TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_materials_course ON materials(course_id, processed);
CREATE INDEX IF NOT EXISTS idx_chunks_material ON material_chunks(material_id);
CREATE INDEX IF NOT EXISTS idx_queue_claim ON processing_queue(status, next_attempt_at, created_at);
CREATE INDEX IF NOT EXISTS idx_queue_lease ON processing_queue(status, lease_expires_at);
"#;
