use {
    super::row_repo::quote_ident,
    crate::domain::entity::LinkTable,
    crate::domain::error::AuditError,
    sqlx::PgPool,
};

/// SQLSTATEs a concurrent `CREATE TABLE IF NOT EXISTS` can lose with.
const UNIQUE_VIOLATION: &str = "23505";
const DUPLICATE_TABLE: &str = "42P07";
const DUPLICATE_OBJECT: &str = "42710";

pub async fn ensure_link_table(pool: &PgPool, link: &LinkTable) -> Result<(), AuditError> {
    let table = quote_ident(&link.table);
    let entity_column = quote_ident(&link.entity_column);
    let entity_table = quote_ident(&link.entity_table);
    let index = quote_ident(&format!("{}_{}_idx", link.table, link.entity_column));

    let create = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id BIGSERIAL PRIMARY KEY,
            {entity_column} UUID NOT NULL REFERENCES {entity_table}(id) ON DELETE CASCADE,
            target_id UUID NOT NULL,
            change_log_id UUID NOT NULL REFERENCES change_log(id) ON DELETE CASCADE
        )
        "#
    );
    let create_index = format!("CREATE INDEX IF NOT EXISTS {index} ON {table} ({entity_column})");

    create_tolerating_races(pool, &create, link).await?;
    // Before the index, which would fail on a table missing the entity column.
    verify_link_table(pool, link).await?;
    create_tolerating_races(pool, &create_index, link).await
}

async fn create_tolerating_races(pool: &PgPool, statement: &str, link: &LinkTable) -> Result<(), AuditError> {
    if let Err(e) = sqlx::query(statement).execute(pool).await {
        let lost_race = e
            .as_database_error()
            .and_then(|d| d.code())
            .is_some_and(|code| {
                matches!(code.as_ref(), UNIQUE_VIOLATION | DUPLICATE_TABLE | DUPLICATE_OBJECT)
            });
        if !lost_race {
            return Err(e.into());
        }
        tracing::debug!(table = %link.table, "link table created concurrently");
    }
    Ok(())
}

/// An existing table only counts as the link table if its columns match.
async fn verify_link_table(pool: &PgPool, link: &LinkTable) -> Result<(), AuditError> {
    let columns: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT column_name::text, data_type::text
        FROM information_schema.columns
        WHERE table_schema = current_schema() AND table_name = $1
        ORDER BY ordinal_position
        "#,
    )
    .bind(&link.table)
    .fetch_all(pool)
    .await?;

    let expected = [
        ("id", "bigint"),
        (link.entity_column.as_str(), "uuid"),
        ("target_id", "uuid"),
        ("change_log_id", "uuid"),
    ];
    let matches = columns.len() == expected.len()
        && expected.iter().all(|(name, ty)| {
            columns
                .iter()
                .any(|(column, data_type)| column == name && data_type == ty)
        });

    if !matches {
        return Err(AuditError::SchemaConflict {
            table: link.table.clone(),
            detail: format!("existing columns {columns:?} do not match {expected:?}"),
        });
    }
    Ok(())
}
