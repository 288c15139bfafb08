use {
    super::row_repo::quote_ident,
    crate::domain::change_log::{ChangeAction, ChangeRecord},
    crate::domain::entity::LinkTable,
    crate::domain::error::AuditError,
    crate::domain::snapshot::Snapshot,
    chrono::{DateTime, Utc},
    serde_json::Value,
    sqlx::PgConnection,
    uuid::Uuid,
};

const RECORD_COLUMNS: &str = r#"c.id, c.action, c."timestamp", c.actor_id, c.object_type, c.target_id,
       c.old_state, c.new_state, c.changed_fields"#;

#[derive(sqlx::FromRow)]
struct ChangeLogRow {
    id: Uuid,
    action: String,
    timestamp: DateTime<Utc>,
    actor_id: Option<Uuid>,
    object_type: String,
    target_id: Uuid,
    old_state: Option<Value>,
    new_state: Option<Value>,
    changed_fields: Option<Value>,
}

impl TryFrom<ChangeLogRow> for ChangeRecord {
    type Error = AuditError;

    fn try_from(row: ChangeLogRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            action: ChangeAction::try_from(row.action.as_str())?,
            timestamp: row.timestamp,
            actor: row.actor_id.map(Into::into),
            object_type: row.object_type,
            target_id: row.target_id,
            old_state: row.old_state.map(into_snapshot).transpose()?,
            new_state: row.new_state.map(into_snapshot).transpose()?,
            changed_fields: row.changed_fields.map(serde_json::from_value).transpose()?,
        })
    }
}

fn into_snapshot(value: Value) -> Result<Snapshot, AuditError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(AuditError::Integrity(format!(
            "stored snapshot is not an object: {other}"
        ))),
    }
}

pub async fn insert_change_record(
    conn: &mut PgConnection,
    record: &ChangeRecord,
) -> Result<(), AuditError> {
    sqlx::query!(
        r#"
        INSERT INTO change_log
            (id, action, "timestamp", actor_id, object_type, target_id,
             old_state, new_state, changed_fields)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
        record.id,
        record.action.as_str(),
        record.timestamp,
        record.actor.map(|a| a.as_uuid()),
        &record.object_type,
        record.target_id,
        record.old_state.clone().map(Value::Object),
        record.new_state.clone().map(Value::Object),
        record.changed_fields.as_ref().map(|f| serde_json::json!(f)),
    )
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn insert_link(
    conn: &mut PgConnection,
    link: &LinkTable,
    entity_id: Uuid,
    change_log_id: Uuid,
) -> Result<(), AuditError> {
    let sql = format!(
        "INSERT INTO {} ({}, target_id, change_log_id) VALUES ($1, $2, $3)",
        quote_ident(&link.table),
        quote_ident(&link.entity_column),
    );
    sqlx::query(&sql)
        .bind(entity_id)
        .bind(entity_id)
        .bind(change_log_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Every record for one entity, newest first, found through the record's own
/// `target_id` so it still works once the entity is gone.
pub async fn change_history(
    conn: &mut PgConnection,
    object_type: &str,
    target_id: Uuid,
) -> Result<Vec<ChangeRecord>, AuditError> {
    let rows = sqlx::query_as!(
        ChangeLogRow,
        r#"
        SELECT id, action, "timestamp", actor_id, object_type, target_id,
               old_state, new_state, changed_fields
        FROM change_log
        WHERE object_type = $1 AND target_id = $2
        ORDER BY "timestamp" DESC, id DESC
        "#,
        object_type,
        target_id,
    )
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(ChangeRecord::try_from).collect()
}

pub async fn linked_history(
    conn: &mut PgConnection,
    link: &LinkTable,
    entity_id: Uuid,
) -> Result<Vec<ChangeRecord>, AuditError> {
    let sql = format!(
        r#"
        SELECT {RECORD_COLUMNS}
        FROM change_log c
        JOIN {link_table} l ON l.change_log_id = c.id
        WHERE l.{entity_column} = $1
        ORDER BY c."timestamp" DESC, c.id DESC
        "#,
        link_table = quote_ident(&link.table),
        entity_column = quote_ident(&link.entity_column),
    );
    let rows: Vec<ChangeLogRow> = sqlx::query_as(&sql)
        .bind(entity_id)
        .fetch_all(conn)
        .await?;

    rows.into_iter().map(ChangeRecord::try_from).collect()
}
