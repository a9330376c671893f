pub const CREATE_DOCUMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    doc_id TEXT NOT NULL,
    data JSONB NOT NULL,
    inserted_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (collection, doc_id)
);
"#;

pub const CREATE_DOCUMENTS_ORDER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS documents_created_at_idx
ON documents (collection, (data->>'createdAt') DESC);
"#;

pub const SELECT_DOCUMENT: &str = r#"
SELECT data FROM documents WHERE collection = $1 AND doc_id = $2;
"#;

pub const INSERT_DOCUMENT: &str = r#"
INSERT INTO documents (collection, doc_id, data) VALUES ($1, $2, $3);
"#;

pub const UPSERT_DOCUMENT_MERGE: &str = r#"
INSERT INTO documents (collection, doc_id, data) VALUES ($1, $2, $3)
ON CONFLICT (collection, doc_id) DO UPDATE
SET data = documents.data || EXCLUDED.data;
"#;

pub const UPDATE_DOCUMENT_PATCH: &str = r#"
UPDATE documents SET data = data || $3 WHERE collection = $1 AND doc_id = $2;
"#;

pub const NOTIFY_COLLECTION_CHANGED: &str = r#"
SELECT pg_notify('documents_changed', $1);
"#;

pub const SELECT_SERVER_NOW: &str = "SELECT now();";

/// LISTEN/NOTIFY channel carrying the changed collection name as payload.
pub const CHANGE_CHANNEL: &str = "documents_changed";
