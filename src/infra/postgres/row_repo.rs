//! Table-agnostic row access.
//!
//! Rows are read with `to_jsonb(t)` and written through
//! `jsonb_populate_record`, so PostgreSQL does the per-column casts. Table and
//! column names come from entity definitions and are always quoted.

use {
    crate::domain::error::AuditError,
    crate::domain::snapshot::Snapshot,
    crate::domain::store::RowQuery,
    serde_json::Value,
    sqlx::PgConnection,
    uuid::Uuid,
};

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_list<'a>(columns: impl Iterator<Item = &'a String>) -> String {
    columns.map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
}

fn into_snapshot(value: Value) -> Result<Snapshot, AuditError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(AuditError::Integrity(format!(
            "row did not decode to an object: {other}"
        ))),
    }
}

pub async fn fetch_row(
    conn: &mut PgConnection,
    table: &str,
    id: Uuid,
) -> Result<Option<Snapshot>, AuditError> {
    let sql = format!("SELECT to_jsonb(t) FROM {} t WHERE t.id = $1", quote_ident(table));
    let row: Option<Value> = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?;

    row.map(into_snapshot).transpose()
}

pub async fn insert_row(
    conn: &mut PgConnection,
    table: &str,
    row: &Snapshot,
) -> Result<(), AuditError> {
    let table = quote_ident(table);
    let columns = column_list(row.keys());
    let sql = format!(
        "INSERT INTO {table} ({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1)"
    );
    sqlx::query(&sql)
        .bind(Value::Object(row.clone()))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn update_row(
    conn: &mut PgConnection,
    table: &str,
    id: Uuid,
    row: &Snapshot,
) -> Result<bool, AuditError> {
    let quoted = quote_ident(table);
    let columns: Vec<&String> = row.keys().filter(|c| c.as_str() != "id").collect();

    let sql = match columns.as_slice() {
        // Subtype tables with no own columns: nothing to set, just report
        // whether the row is there.
        [] => format!("SELECT 1 FROM {quoted} WHERE id = $2 AND $1::jsonb IS NOT NULL"),
        [single] => {
            let column = quote_ident(single);
            format!(
                "UPDATE {quoted} SET {column} = (SELECT {column} FROM jsonb_populate_record(NULL::{quoted}, $1)) WHERE id = $2"
            )
        }
        many => {
            let list = column_list(many.iter().copied());
            format!(
                "UPDATE {quoted} SET ({list}) = (SELECT {list} FROM jsonb_populate_record(NULL::{quoted}, $1)) WHERE id = $2"
            )
        }
    };

    let query = sqlx::query(&sql).bind(Value::Object(row.clone())).bind(id);
    if columns.is_empty() {
        Ok(query.fetch_optional(conn).await?.is_some())
    } else {
        Ok(query.execute(conn).await?.rows_affected() > 0)
    }
}

pub async fn delete_row(conn: &mut PgConnection, table: &str, id: Uuid) -> Result<bool, AuditError> {
    let sql = format!("DELETE FROM {} WHERE id = $1", quote_ident(table));
    let result = sqlx::query(&sql).bind(id).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn select_rows(
    conn: &mut PgConnection,
    table: &str,
    query: &RowQuery,
) -> Result<Vec<Snapshot>, AuditError> {
    let direction = if query.order_by.descending { "DESC" } else { "ASC" };
    let mut sql = format!(
        "SELECT to_jsonb(t) FROM {} t WHERE to_jsonb(t) @> $1",
        quote_ident(table)
    );
    let mut param = 1;
    if query.exclude.is_some() {
        param += 1;
        sql.push_str(&format!(" AND NOT (to_jsonb(t) @> ${param})"));
    }
    if let Some((column, _)) = &query.one_of {
        param += 1;
        sql.push_str(&format!(" AND t.{}::text = ANY(${param})", quote_ident(column)));
    }
    sql.push_str(&format!(
        " ORDER BY t.{} {direction}, t.id {direction}",
        quote_ident(&query.order_by.column)
    ));
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let mut select = sqlx::query_scalar::<_, Value>(&sql).bind(Value::Object(query.filter.clone()));
    if let Some(exclude) = &query.exclude {
        select = select.bind(Value::Object(exclude.clone()));
    }
    if let Some((_, values)) = &query.one_of {
        select = select.bind(values.clone());
    }
    let rows = select.fetch_all(conn).await?;

    rows.into_iter().map(into_snapshot).collect()
}

pub async fn select_by_ids(
    conn: &mut PgConnection,
    table: &str,
    ids: &[Uuid],
) -> Result<Vec<Snapshot>, AuditError> {
    let sql = format!(
        "SELECT to_jsonb(t) FROM {} t WHERE t.id = ANY($1)",
        quote_ident(table)
    );
    let rows: Vec<Value> = sqlx::query_scalar(&sql)
        .bind(ids)
        .fetch_all(conn)
        .await?;

    rows.into_iter().map(into_snapshot).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("devices"), "\"devices\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
