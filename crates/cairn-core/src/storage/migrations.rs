//! Schema migrations, applied in order against `schema_version`.
//!
//! Mirrors the teacher's migration-ledger pattern: a static array of
//! `(version, description, up-sql)` triples, applied in a loop that skips
//! anything already recorded in `schema_version`.

pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "core tables: memories, history, jobs, embeddings, entity graph, sessions",
        up: r#"
CREATE TABLE IF NOT EXISTS memories (
    id                  TEXT PRIMARY KEY,
    content             TEXT NOT NULL,
    normalized_content  TEXT NOT NULL,
    content_hash        TEXT NOT NULL,
    type                TEXT NOT NULL DEFAULT 'fact',
    importance          REAL NOT NULL DEFAULT 0.5,
    confidence          REAL NOT NULL DEFAULT 0.5,
    pinned              INTEGER NOT NULL DEFAULT 0,
    project             TEXT,
    session_id          TEXT,
    who                 TEXT,
    source_type         TEXT,
    tags                TEXT NOT NULL DEFAULT '[]',
    runtime_path        TEXT,
    version             INTEGER NOT NULL DEFAULT 1,
    is_deleted          INTEGER NOT NULL DEFAULT 0,
    deleted_at          TEXT,
    idempotency_key     TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    updated_by          TEXT,
    embedding_model     TEXT,
    extraction_status   TEXT NOT NULL DEFAULT 'pending'
);

CREATE TABLE IF NOT EXISTS memory_history (
    id          TEXT PRIMARY KEY,
    memory_id   TEXT NOT NULL,
    event       TEXT NOT NULL CHECK (event IN ('ADD','UPDATE','DELETE','RECOVER')),
    old_content TEXT,
    new_content TEXT,
    changed_by  TEXT,
    reason      TEXT,
    metadata    TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memory_jobs (
    id           TEXT PRIMARY KEY,
    memory_id    TEXT NOT NULL,
    job_type     TEXT NOT NULL CHECK (job_type IN ('extract','decide','embed','summarize')),
    status       TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending','processing','completed','failed','dead')),
    attempts     INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL DEFAULT 3,
    payload      TEXT,
    result       TEXT,
    error        TEXT,
    worker_id    TEXT,
    leased_at    TEXT,
    completed_at TEXT,
    failed_at    TEXT,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS embeddings (
    id          TEXT PRIMARY KEY,
    source_type TEXT NOT NULL,
    source_id   TEXT NOT NULL,
    model       TEXT,
    dimensions  INTEGER NOT NULL,
    vector      BLOB NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE(source_type, source_id)
);

CREATE TABLE IF NOT EXISTS entities (
    id             TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    canonical_name TEXT NOT NULL UNIQUE,
    entity_type    TEXT,
    mentions       INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS relations (
    id            TEXT PRIMARY KEY,
    source_entity TEXT NOT NULL,
    target_entity TEXT NOT NULL,
    relation_type TEXT NOT NULL,
    strength      REAL NOT NULL DEFAULT 0.5,
    mentions      INTEGER NOT NULL DEFAULT 0,
    confidence    REAL NOT NULL DEFAULT 0.5,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE(source_entity, target_entity, relation_type)
);

CREATE TABLE IF NOT EXISTS memory_entity_mentions (
    id         TEXT PRIMARY KEY,
    memory_id  TEXT NOT NULL,
    entity_id  TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(memory_id, entity_id)
);

CREATE TABLE IF NOT EXISTS session_memories (
    id               TEXT PRIMARY KEY,
    session_key      TEXT NOT NULL,
    memory_id        TEXT NOT NULL,
    source           TEXT NOT NULL CHECK (source IN ('effective','fts_only')),
    effective_score  REAL,
    final_score      REAL,
    rank             INTEGER,
    was_injected     INTEGER NOT NULL DEFAULT 0,
    relevance_score  REAL,
    fts_hit_count    INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL,
    UNIQUE(session_key, memory_id)
);

CREATE TABLE IF NOT EXISTS session_checkpoints (
    id                  TEXT PRIMARY KEY,
    session_key         TEXT NOT NULL,
    harness             TEXT,
    project             TEXT,
    project_normalized  TEXT,
    trigger             TEXT NOT NULL CHECK (trigger IN ('periodic','pre_compaction','agent','explicit')),
    digest              TEXT,
    prompt_count        INTEGER NOT NULL DEFAULT 0,
    memory_queries      TEXT,
    recent_remembers    TEXT,
    created_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS session_scores (
    id                    TEXT PRIMARY KEY,
    session_key           TEXT NOT NULL,
    project               TEXT,
    harness               TEXT,
    score                 REAL,
    memories_recalled     INTEGER,
    memories_used         INTEGER,
    novel_context_count   INTEGER,
    reasoning             TEXT,
    confidence            REAL,
    continuity_reasoning  TEXT,
    created_at            TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS summary_jobs (
    id           TEXT PRIMARY KEY,
    session_key  TEXT,
    harness      TEXT,
    project      TEXT,
    transcript   TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending','processing','completed','failed','dead')),
    attempts     INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL DEFAULT 3,
    result       TEXT,
    error        TEXT,
    worker_id    TEXT,
    leased_at    TEXT,
    completed_at TEXT,
    failed_at    TEXT,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS umap_cache (
    id            TEXT PRIMARY KEY,
    source_type   TEXT NOT NULL,
    source_id     TEXT NOT NULL,
    projection_x  REAL,
    projection_y  REAL,
    computed_at   TEXT NOT NULL,
    UNIQUE(source_type, source_id)
);

CREATE TABLE IF NOT EXISTS schema_version (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#,
    },
    Migration {
        version: 2,
        description: "FTS5 index over memories, kept in sync via triggers",
        up: r#"
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    id, content, tags, content='memories', content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, id, content, tags) VALUES (NEW.rowid, NEW.id, NEW.content, NEW.tags);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, content, tags) VALUES ('delete', OLD.rowid, OLD.id, OLD.content, OLD.tags);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, content, tags) VALUES ('delete', OLD.rowid, OLD.id, OLD.content, OLD.tags);
    INSERT INTO memories_fts(rowid, id, content, tags) VALUES (NEW.rowid, NEW.id, NEW.content, NEW.tags);
END;
"#,
    },
    Migration {
        version: 3,
        description: "secondary indices for dedup, retention sweeps, and job leasing",
        up: r#"
CREATE INDEX IF NOT EXISTS idx_memories_dedup ON memories(content_hash, project, who, is_deleted);
CREATE UNIQUE INDEX IF NOT EXISTS idx_memories_idempotency ON memories(idempotency_key) WHERE idempotency_key IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_memories_tombstone ON memories(is_deleted, deleted_at);
CREATE INDEX IF NOT EXISTS idx_memories_project ON memories(project);
CREATE INDEX IF NOT EXISTS idx_memories_session ON memories(session_id);

CREATE INDEX IF NOT EXISTS idx_history_memory ON memory_history(memory_id, created_at);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON memory_jobs(status, created_at);
CREATE INDEX IF NOT EXISTS idx_jobs_memory ON memory_jobs(memory_id, job_type);
CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_processing_unique ON memory_jobs(memory_id, job_type) WHERE status = 'processing';

CREATE INDEX IF NOT EXISTS idx_summary_jobs_status ON summary_jobs(status, created_at);

CREATE INDEX IF NOT EXISTS idx_mentions_entity ON memory_entity_mentions(entity_id);
CREATE INDEX IF NOT EXISTS idx_relations_source ON relations(source_entity);
CREATE INDEX IF NOT EXISTS idx_relations_target ON relations(target_entity);

CREATE INDEX IF NOT EXISTS idx_session_checkpoints_key ON session_checkpoints(session_key, created_at);
CREATE INDEX IF NOT EXISTS idx_session_checkpoints_project ON session_checkpoints(project_normalized, created_at);
CREATE INDEX IF NOT EXISTS idx_session_memories_key ON session_memories(session_key);
"#,
    },
];

/// Apply every migration whose version is newer than `schema_version`'s max,
/// returning the resulting schema version.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL);",
    )?;

    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
        .unwrap_or(0);

    let mut applied = current;
    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        conn.execute_batch(migration.up)?;
        conn.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.version, chrono::Utc::now().to_rfc3339()],
        )?;
        applied = migration.version;
        tracing::info!(version = migration.version, description = migration.description, "applied migration");
    }

    Ok(applied)
}
