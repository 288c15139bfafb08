use {
    super::error::AuditError,
    super::snapshot::Snapshot,
    serde::{Serialize, de::DeserializeOwned},
    serde_json::Value,
    std::{future::Future, pin::Pin},
    uuid::Uuid,
};

/// Shared table of a polymorphic hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseTable {
    pub table: &'static str,
    pub discriminator_column: &'static str,
    /// Columns stored on the base table, besides `id` and the discriminator.
    pub fields: &'static [&'static str],
}

/// Where an entity's columns live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// All columns in one table.
    Table(&'static str),
    /// Shared columns in `base`, the rest in `table`, keyed one-to-one on id.
    /// `discriminator` is written to the base row on insert.
    Inherits {
        base: BaseTable,
        table: &'static str,
        discriminator: &'static str,
    },
}

impl Layout {
    /// The entity's own table (the subtype table for inherited layouts).
    pub fn table(&self) -> &'static str {
        match self {
            Self::Table(table) | Self::Inherits { table, .. } => *table,
        }
    }

    /// Split a full snapshot into `(table, row)` pairs in insert order.
    pub fn split(&self, id: Uuid, snapshot: &Snapshot) -> Vec<(&'static str, Snapshot)> {
        match self {
            Self::Table(table) => {
                let mut row = snapshot.clone();
                row.insert("id".into(), Value::String(id.to_string()));
                vec![(*table, row)]
            }
            Self::Inherits {
                base,
                table,
                discriminator,
            } => {
                let mut base_row = Snapshot::new();
                let mut own_row = Snapshot::new();
                base_row.insert("id".into(), Value::String(id.to_string()));
                own_row.insert("id".into(), Value::String(id.to_string()));
                base_row.insert(
                    base.discriminator_column.into(),
                    Value::String((*discriminator).into()),
                );

                for (field, value) in snapshot {
                    if field == "id" {
                        continue;
                    }
                    if base.fields.contains(&field.as_str()) {
                        base_row.insert(field.clone(), value.clone());
                    } else {
                        own_row.insert(field.clone(), value.clone());
                    }
                }
                vec![(base.table, base_row), (*table, own_row)]
            }
        }
    }
}

/// Receives the tracked entities whose rows reference a row being deleted,
/// so each is deleted and recorded before the referenced row goes.
pub trait DependentSink: Send {
    /// Delete every `E` whose `column` equals `id`.
    fn remove<E: Trackable>(
        &mut self,
        column: &'static str,
        id: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<(), AuditError>> + Send + '_>>;
}

/// An entity whose mutations go through the change recorder.
pub trait Trackable: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Concrete type name, stored as the change record's `object_type` and
    /// used to name the link table.
    const ENTITY_TYPE: &'static str;
    const LAYOUT: Layout;

    fn id(&self) -> Option<Uuid>;

    fn assign_id(&mut self, id: Uuid);

    /// Entity-level constraints checked before every write.
    fn validate(&self) -> Result<(), AuditError> {
        Ok(())
    }

    /// Hand every tracked entity that references `id` through a cascading
    /// foreign key to `sink`. Mirrors the `ON DELETE CASCADE` keys of the
    /// schema.
    fn remove_dependents<D: DependentSink>(
        sink: &mut D,
        id: Uuid,
    ) -> impl Future<Output = Result<(), AuditError>> + Send {
        let _ = (sink, id);
        std::future::ready(Ok(()))
    }

    fn link_table() -> LinkTable {
        LinkTable::for_entity(Self::ENTITY_TYPE, Self::LAYOUT.table())
    }
}

/// Definition of the table linking one entity type to its change records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTable {
    pub entity_type: String,
    /// `<EntityType>ChangeLog`
    pub model_name: String,
    /// `<entity_type>_change_log`
    pub table: String,
    /// `<entity_type>_id`, FK to `entity_table` with cascading delete.
    pub entity_column: String,
    pub entity_table: String,
}

impl LinkTable {
    pub fn for_entity(entity_type: &str, entity_table: &str) -> Self {
        let snake = snake_case(entity_type);
        Self {
            entity_type: entity_type.to_string(),
            model_name: format!("{entity_type}ChangeLog"),
            table: format!("{snake}_change_log"),
            entity_column: format!("{snake}_id"),
            entity_table: entity_table.to_string(),
        }
    }
}

pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}
