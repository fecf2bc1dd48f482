//! Database schema SQL.

/// One table holds every collection; `(collection, id)` is the document key.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id INTEGER NOT NULL,
    designation TEXT NOT NULL,
    description TEXT NOT NULL,
    image_binary BLOB NOT NULL,
    prdtypecode INTEGER,
    inserted_at INTEGER NOT NULL,
    PRIMARY KEY (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
"#;
