use {
    crate::domain::entity::{Layout, Trackable},
    crate::domain::error::AuditError,
    crate::domain::snapshot::{self, Snapshot},
    crate::domain::store::{RowQuery, StoreTx},
    serde_json::Value,
    uuid::Uuid,
};

/// Load the persisted state of an entity, joining base and subtype rows for
/// inherited layouts. `None` if any part of it is missing.
pub async fn load<T: StoreTx, E: Trackable>(tx: &mut T, id: Uuid) -> Result<Option<E>, AuditError> {
    let row = match E::LAYOUT {
        Layout::Table(table) => tx.fetch_row(table, id).await?,
        Layout::Inherits { base, table, .. } => {
            let Some(mut base_row) = tx.fetch_row(base.table, id).await? else {
                return Ok(None);
            };
            let Some(own_row) = tx.fetch_row(table, id).await? else {
                return Ok(None);
            };
            base_row.extend(own_row);
            Some(base_row)
        }
    };

    row.map(|row| snapshot::deserialize(&row)).transpose()
}

pub async fn insert<T: StoreTx, E: Trackable>(
    tx: &mut T,
    id: Uuid,
    state: &Snapshot,
) -> Result<(), AuditError> {
    for (table, row) in E::LAYOUT.split(id, state) {
        tx.insert_row(table, &row).await?;
    }
    Ok(())
}

pub async fn update<T: StoreTx, E: Trackable>(
    tx: &mut T,
    id: Uuid,
    state: &Snapshot,
) -> Result<(), AuditError> {
    for (table, mut row) in E::LAYOUT.split(id, state) {
        // Discriminator is fixed at insert.
        if let Layout::Inherits { base, .. } = E::LAYOUT {
            row.remove(base.discriminator_column);
        }
        if !tx.update_row(table, id, &row).await? {
            return Err(AuditError::NotFound(format!(
                "{} {id} vanished during update",
                E::ENTITY_TYPE
            )));
        }
    }
    Ok(())
}

/// Delete the entity's rows, subtype row first.
pub async fn delete<T: StoreTx, E: Trackable>(tx: &mut T, id: Uuid) -> Result<bool, AuditError> {
    match E::LAYOUT {
        Layout::Table(table) => tx.delete_row(table, id).await,
        Layout::Inherits { base, table, .. } => {
            let own = tx.delete_row(table, id).await?;
            let shared = tx.delete_row(base.table, id).await?;
            Ok(own || shared)
        }
    }
}

/// Ids of the `E` rows whose `column` holds `value`. Inherited layouts are
/// narrowed to `E`'s discriminator when the column lives on the base table.
pub async fn ids_where<T: StoreTx, E: Trackable>(
    tx: &mut T,
    column: &str,
    value: Uuid,
) -> Result<Vec<Uuid>, AuditError> {
    let query = RowQuery::new().eq(column, value.to_string());
    let (table, query) = match E::LAYOUT {
        Layout::Inherits {
            base,
            discriminator,
            ..
        } if base.fields.contains(&column) => (
            base.table,
            query.eq(base.discriminator_column, discriminator),
        ),
        layout => (layout.table(), query),
    };

    tx.select_rows(table, &query)
        .await?
        .iter()
        .map(|row| {
            row.get("id")
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| AuditError::Integrity(format!("{table} row without a valid id")))
        })
        .collect()
}
