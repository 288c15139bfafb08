//! Reads over a polymorphic base table, always returning concrete variants.
//!
//! Resolution costs one base query plus one query per distinct
//! discriminator in the result, never one per row.

use {
    crate::domain::error::AuditError,
    crate::domain::polymorphic::{PolyQuery, Polymorphic},
    crate::domain::snapshot::Snapshot,
    crate::domain::store::{Store, StoreTx},
    std::{collections::HashMap, marker::PhantomData},
    uuid::Uuid,
};

pub struct PolymorphicStore<S, P> {
    store: S,
    _kind: PhantomData<fn() -> P>,
}

/// What to do with a base row whose subtype row is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orphans {
    Drop,
    Fail,
}

impl<S: Store, P: Polymorphic> PolymorphicStore<S, P> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            _kind: PhantomData,
        }
    }

    pub async fn all(&self) -> Result<Vec<P>, AuditError> {
        self.filter(PolyQuery::new()).await
    }

    /// Orphaned base rows are left out of the result and logged.
    pub async fn filter(&self, query: PolyQuery) -> Result<Vec<P>, AuditError> {
        let mut tx = self.store.begin().await?;
        let base_rows = tx
            .select_rows(P::BASE.table, &query.base_query::<P>())
            .await?;
        let resolved = resolve::<S::Tx, P>(&mut tx, base_rows, Orphans::Drop).await?;
        tx.commit().await?;
        Ok(resolved)
    }

    /// Exactly one match, resolved to its subtype.
    pub async fn get(&self, query: PolyQuery) -> Result<P, AuditError> {
        let mut tx = self.store.begin().await?;
        let rows = query.base_query::<P>().limit(2);
        let base_rows = tx.select_rows(P::BASE.table, &rows).await?;

        match base_rows.len() {
            0 => {
                return Err(AuditError::NotFound(format!(
                    "no {} row matches {:?}",
                    P::BASE.table,
                    query.rows.filter
                )));
            }
            1 => {}
            _ => {
                return Err(AuditError::MultipleObjects(format!(
                    "more than one {} row matches {:?}",
                    P::BASE.table,
                    query.rows.filter
                )));
            }
        }

        let mut resolved = resolve::<S::Tx, P>(&mut tx, base_rows, Orphans::Fail).await?;
        tx.commit().await?;
        resolved
            .pop()
            .ok_or_else(|| AuditError::Integrity("resolved row went missing".into()))
    }

    pub async fn first(&self, query: PolyQuery) -> Result<Option<P>, AuditError> {
        self.single_end(query).await
    }

    /// First row in reversed order.
    pub async fn last(&self, mut query: PolyQuery) -> Result<Option<P>, AuditError> {
        query.rows = query.rows.reversed();
        self.single_end(query).await
    }

    async fn single_end(&self, query: PolyQuery) -> Result<Option<P>, AuditError> {
        let mut tx = self.store.begin().await?;
        let rows = query.base_query::<P>().limit(1);
        let base_rows = tx.select_rows(P::BASE.table, &rows).await?;
        let mut resolved = resolve::<S::Tx, P>(&mut tx, base_rows, Orphans::Fail).await?;
        tx.commit().await?;
        Ok(resolved.pop())
    }
}

/// Resolve base rows to concrete variants, preserving base order.
async fn resolve<T: StoreTx, P: Polymorphic>(
    tx: &mut T,
    base_rows: Vec<Snapshot>,
    orphans: Orphans,
) -> Result<Vec<P>, AuditError> {
    let discriminator_column = P::BASE.discriminator_column;

    let mut keyed = Vec::with_capacity(base_rows.len());
    let mut groups: Vec<(String, Vec<Uuid>)> = Vec::new();
    for row in base_rows {
        let id = row_id(&row)?;
        let kind = row
            .get(discriminator_column)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AuditError::Integrity(format!(
                    "{} row {id} has no {discriminator_column}",
                    P::BASE.table
                ))
            })?
            .to_string();

        match groups.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, ids)) => ids.push(id),
            None => groups.push((kind.clone(), vec![id])),
        }
        keyed.push((id, kind, row));
    }

    let mut subtype_rows: HashMap<Uuid, Snapshot> = HashMap::new();
    for (kind, ids) in &groups {
        let table = P::subtype_table(kind).ok_or_else(|| {
            AuditError::Integrity(format!(
                "{} discriminator {kind:?} names no known subtype",
                P::BASE.table
            ))
        })?;
        for row in tx.select_by_ids(table, ids).await? {
            subtype_rows.insert(row_id(&row)?, row);
        }
    }

    let mut resolved = Vec::with_capacity(keyed.len());
    for (id, kind, mut base) in keyed {
        let Some(own) = subtype_rows.remove(&id) else {
            match orphans {
                Orphans::Drop => {
                    tracing::warn!(
                        table = P::BASE.table,
                        %id,
                        discriminator = %kind,
                        "base row has no subtype row, dropped from result"
                    );
                    continue;
                }
                Orphans::Fail => {
                    return Err(AuditError::Integrity(format!(
                        "{} row {id} says {kind} but has no {kind} row",
                        P::BASE.table
                    )));
                }
            }
        };
        base.extend(own);
        resolved.push(P::materialize(&kind, base)?);
    }

    Ok(resolved)
}

fn row_id(row: &Snapshot) -> Result<Uuid, AuditError> {
    row.get("id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| AuditError::Integrity(format!("row without a valid id: {row:?}")))
}
