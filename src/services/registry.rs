use {
    crate::domain::entity::{LinkTable, Trackable},
    crate::domain::error::AuditError,
    crate::domain::store::Store,
    std::{
        collections::HashMap,
        sync::{PoisonError, RwLock},
    },
};

/// Link tables known to this process, keyed by entity type.
///
/// The cache lock is never held across storage calls: two tasks missing the
/// cache at once both ask the store to create the table, which is idempotent.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    tables: RwLock<HashMap<String, LinkTable>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every link table up front. Call once at startup.
    pub async fn bootstrap<S: Store>(
        &self,
        store: &S,
        links: impl IntoIterator<Item = LinkTable>,
    ) -> Result<(), AuditError> {
        for link in links {
            self.ensure_link_table(store, link).await?;
        }
        Ok(())
    }

    pub async fn ensure<S: Store, E: Trackable>(&self, store: &S) -> Result<LinkTable, AuditError> {
        self.ensure_link_table(store, E::link_table()).await
    }

    pub async fn ensure_link_table<S: Store>(
        &self,
        store: &S,
        link: LinkTable,
    ) -> Result<LinkTable, AuditError> {
        if let Some(known) = self.cached(&link)? {
            return Ok(known);
        }

        store.ensure_link_table(&link).await?;

        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(known) = lookup(&tables, &link)? {
            return Ok(known);
        }
        tables.insert(link.entity_type.clone(), link.clone());
        tracing::info!(
            entity_type = %link.entity_type,
            table = %link.table,
            "link table registered"
        );
        Ok(link)
    }

    pub fn get(&self, entity_type: &str) -> Option<LinkTable> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_type)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.tables.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cached(&self, link: &LinkTable) -> Result<Option<LinkTable>, AuditError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        lookup(&tables, link)
    }
}

/// Known definition for the same entity type, or a conflict if the physical
/// table is already claimed by a different definition.
fn lookup(
    tables: &HashMap<String, LinkTable>,
    link: &LinkTable,
) -> Result<Option<LinkTable>, AuditError> {
    if let Some(known) = tables.get(&link.entity_type) {
        if known == link {
            return Ok(Some(known.clone()));
        }
        return Err(AuditError::SchemaConflict {
            table: known.table.clone(),
            detail: format!(
                "{} is already registered as {:?}, requested {:?}",
                link.entity_type, known, link
            ),
        });
    }

    if let Some(other) = tables.values().find(|t| t.table == link.table) {
        return Err(AuditError::SchemaConflict {
            table: link.table.clone(),
            detail: format!(
                "table already links {}, cannot also link {}",
                other.entity_type, link.entity_type
            ),
        });
    }

    Ok(None)
}
