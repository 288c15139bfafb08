use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("schema conflict on {table}: {detail}")]
    SchemaConflict { table: String, detail: String },

    /// The change record or its link row could not be persisted. The
    /// mutation that triggered it is rolled back with it.
    #[error("audit write for {object_type} failed: {source}")]
    AuditWrite {
        object_type: String,
        source: Box<AuditError>,
    },

    #[error("integrity: {0}")]
    Integrity(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("multiple objects returned: {0}")]
    MultipleObjects(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuditError {
    pub fn audit_write(object_type: &str, source: AuditError) -> Self {
        Self::AuditWrite {
            object_type: object_type.to_string(),
            source: Box::new(source),
        }
    }
}
