//! In-process [`Store`] used by the test suite and for local experiments.
//!
//! Transactions are serialized: `begin` takes the state lock and keeps a copy
//! of the state, which is put back if the transaction drops uncommitted.
//! [`Constraints`] carry the row-table foreign keys and unique keys of the
//! migrations, so the same writes fail and the same deletes cascade as in
//! PostgreSQL. Link rows cascade with the entity row they point at.

use {
    crate::domain::change_log::ChangeRecord,
    crate::domain::entity::LinkTable,
    crate::domain::error::AuditError,
    crate::domain::id::{Actor, ActorId},
    crate::domain::snapshot::Snapshot,
    crate::domain::store::{RowQuery, Store, StoreTx},
    serde_json::Value,
    std::{
        cmp::Ordering as CmpOrdering,
        collections::{BTreeMap, HashMap},
        sync::{
            Arc,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
    },
    tokio::sync::{Mutex, OwnedMutexGuard},
    uuid::Uuid,
};

#[derive(Debug, Clone)]
struct LinkRow {
    entity_id: Uuid,
    change_log_id: Uuid,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tables: HashMap<String, BTreeMap<Uuid, Snapshot>>,
    change_log: Vec<ChangeRecord>,
    link_defs: HashMap<String, LinkTable>,
    links: HashMap<String, Vec<LinkRow>>,
    actors: HashMap<ActorId, Actor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    SetNull,
}

/// `table.column` references `references.id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: &'static str,
    pub column: &'static str,
    pub references: &'static str,
    pub on_delete: OnDelete,
}

/// Unique over `columns`, skipped when any of them is null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqueKey {
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

#[derive(Debug, Clone, Default)]
pub struct Constraints {
    pub foreign_keys: Vec<ForeignKey>,
    pub unique: Vec<UniqueKey>,
}

impl Constraints {
    /// Row-table constraints of `migrations/0002_inventory.sql`.
    pub fn inventory() -> Self {
        let fk = |table, column, references| ForeignKey {
            table,
            column,
            references,
            on_delete: OnDelete::Cascade,
        };
        Self {
            foreign_keys: vec![
                fk("data_sockets", "device_id", "devices"),
                fk("interfaces", "id", "data_sockets"),
                fk("consoles", "id", "data_sockets"),
                fk("cables", "side_a", "data_sockets"),
                fk("cables", "side_b", "data_sockets"),
            ],
            unique: vec![UniqueKey {
                table: "cables",
                columns: &["side_a", "side_b"],
            }],
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    constraints: Arc<Constraints>,
    reads: Arc<AtomicUsize>,
    fail_change_log: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Store with the inventory schema's constraints.
    pub fn new() -> Self {
        Self::with_constraints(Constraints::inventory())
    }

    pub fn with_constraints(constraints: Constraints) -> Self {
        Self {
            state: Arc::default(),
            constraints: Arc::new(constraints),
            reads: Arc::default(),
            fail_change_log: Arc::default(),
        }
    }

    /// Read queries (row fetches and selects) issued since the last reset.
    pub fn read_queries(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reset_read_queries(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }

    /// Make every change-log insert fail until switched off again.
    pub fn fail_change_log_writes(&self, fail: bool) {
        self.fail_change_log.store(fail, Ordering::SeqCst);
    }

    pub async fn change_records(&self) -> Vec<ChangeRecord> {
        self.state.lock().await.change_log.clone()
    }

    pub async fn row_count(&self, table: &str) -> usize {
        self.state
            .lock()
            .await
            .tables
            .get(table)
            .map_or(0, BTreeMap::len)
    }

    pub async fn link_count(&self, link_table: &str) -> usize {
        self.state
            .lock()
            .await
            .links
            .get(link_table)
            .map_or(0, Vec::len)
    }
}

impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, AuditError> {
        let state = Arc::clone(&self.state).lock_owned().await;
        let backup = Some(state.clone());
        Ok(MemoryTx {
            state,
            backup,
            constraints: Arc::clone(&self.constraints),
            reads: Arc::clone(&self.reads),
            fail_change_log: Arc::clone(&self.fail_change_log),
        })
    }

    async fn ensure_link_table(&self, link: &LinkTable) -> Result<(), AuditError> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.link_defs.get(&link.table) {
            if existing != link {
                return Err(AuditError::SchemaConflict {
                    table: link.table.clone(),
                    detail: format!("defined as {existing:?}"),
                });
            }
            return Ok(());
        }
        if state.tables.contains_key(&link.table) {
            return Err(AuditError::SchemaConflict {
                table: link.table.clone(),
                detail: "name is taken by an entity table".into(),
            });
        }

        state.link_defs.insert(link.table.clone(), link.clone());
        state.links.entry(link.table.clone()).or_default();
        Ok(())
    }

    async fn insert_actor(&self, actor: &Actor) -> Result<(), AuditError> {
        let mut state = self.state.lock().await;
        if state.actors.contains_key(&actor.id) {
            return Err(AuditError::Storage(format!("duplicate actor {}", actor.id)));
        }
        state.actors.insert(actor.id, actor.clone());
        Ok(())
    }

    async fn delete_actor(&self, id: ActorId) -> Result<bool, AuditError> {
        let mut state = self.state.lock().await;
        if state.actors.remove(&id).is_none() {
            return Ok(false);
        }
        for record in state.change_log.iter_mut().filter(|r| r.actor == Some(id)) {
            record.actor = None;
        }
        Ok(true)
    }
}

pub struct MemoryTx {
    state: OwnedMutexGuard<MemoryState>,
    backup: Option<MemoryState>,
    constraints: Arc<Constraints>,
    reads: Arc<AtomicUsize>,
    fail_change_log: Arc<AtomicBool>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(backup) = self.backup.take() {
            *self.state = backup;
        }
    }
}

impl MemoryTx {
    fn count_read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

impl StoreTx for MemoryTx {
    async fn fetch_row(&mut self, table: &str, id: Uuid) -> Result<Option<Snapshot>, AuditError> {
        self.count_read();
        Ok(self
            .state
            .tables
            .get(table)
            .and_then(|rows| rows.get(&id))
            .cloned())
    }

    async fn insert_row(&mut self, table: &str, row: &Snapshot) -> Result<(), AuditError> {
        let id = row_id(row)?;
        if self.state.link_defs.contains_key(table) {
            return Err(AuditError::Storage(format!("{table} is a link table")));
        }
        if self
            .state
            .tables
            .get(table)
            .is_some_and(|rows| rows.contains_key(&id))
        {
            return Err(AuditError::Storage(format!(
                "duplicate key {id} in {table}"
            )));
        }
        check_row(&self.state, &self.constraints, table, id, row)?;
        self.state
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(id, row.clone());
        Ok(())
    }

    async fn update_row(
        &mut self,
        table: &str,
        id: Uuid,
        row: &Snapshot,
    ) -> Result<bool, AuditError> {
        let Some(existing) = self.state.tables.get(table).and_then(|rows| rows.get(&id)) else {
            return Ok(false);
        };
        let mut updated = existing.clone();
        for (column, value) in row {
            if column != "id" {
                updated.insert(column.clone(), value.clone());
            }
        }
        check_row(&self.state, &self.constraints, table, id, &updated)?;

        if let Some(rows) = self.state.tables.get_mut(table) {
            rows.insert(id, updated);
        }
        Ok(true)
    }

    async fn delete_row(&mut self, table: &str, id: Uuid) -> Result<bool, AuditError> {
        let constraints = Arc::clone(&self.constraints);
        Ok(delete_cascading(&mut self.state, &constraints, table, id))
    }

    async fn select_rows(
        &mut self,
        table: &str,
        query: &RowQuery,
    ) -> Result<Vec<Snapshot>, AuditError> {
        self.count_read();
        let Some(rows) = self.state.tables.get(table) else {
            return Ok(Vec::new());
        };

        let mut selected: Vec<Snapshot> = rows
            .values()
            .filter(|row| contains(row, &query.filter))
            .filter(|row| query.exclude.as_ref().is_none_or(|ex| !contains(row, ex)))
            .filter(|row| match &query.one_of {
                Some((column, values)) => row
                    .get(column)
                    .and_then(Value::as_str)
                    .is_some_and(|v| values.iter().any(|allowed| allowed == v)),
                None => true,
            })
            .cloned()
            .collect();

        let column = query.order_by.column.as_str();
        selected.sort_by(|a, b| {
            let ord = compare_values(a.get(column), b.get(column))
                .then_with(|| compare_values(a.get("id"), b.get("id")));
            if query.order_by.descending {
                ord.reverse()
            } else {
                ord
            }
        });

        if let Some(limit) = query.limit {
            selected.truncate(limit as usize);
        }
        Ok(selected)
    }

    async fn select_by_ids(
        &mut self,
        table: &str,
        ids: &[Uuid],
    ) -> Result<Vec<Snapshot>, AuditError> {
        self.count_read();
        let Some(rows) = self.state.tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    async fn insert_change_record(&mut self, record: &ChangeRecord) -> Result<(), AuditError> {
        if self.fail_change_log.load(Ordering::SeqCst) {
            return Err(AuditError::Storage("change_log rejected the insert".into()));
        }
        if self.state.change_log.iter().any(|r| r.id == record.id) {
            return Err(AuditError::Storage(format!(
                "duplicate change record {}",
                record.id
            )));
        }
        if let Some(actor) = record.actor {
            if !self.state.actors.contains_key(&actor) {
                return Err(AuditError::Storage(format!("unknown actor {actor}")));
            }
        }
        self.state.change_log.push(record.clone());
        Ok(())
    }

    async fn insert_link(
        &mut self,
        link: &LinkTable,
        entity_id: Uuid,
        change_log_id: Uuid,
    ) -> Result<(), AuditError> {
        let Some(def) = self.state.link_defs.get(&link.table) else {
            return Err(AuditError::Storage(format!(
                "relation {} does not exist",
                link.table
            )));
        };
        let entity_exists = self
            .state
            .tables
            .get(&def.entity_table)
            .is_some_and(|rows| rows.contains_key(&entity_id));
        if !entity_exists {
            return Err(AuditError::Storage(format!(
                "{} references missing {} row {entity_id}",
                link.table, def.entity_table
            )));
        }
        if !self.state.change_log.iter().any(|r| r.id == change_log_id) {
            return Err(AuditError::Storage(format!(
                "{} references missing change record {change_log_id}",
                link.table
            )));
        }

        self.state
            .links
            .entry(link.table.clone())
            .or_default()
            .push(LinkRow {
                entity_id,
                change_log_id,
            });
        Ok(())
    }

    async fn change_history(
        &mut self,
        object_type: &str,
        target_id: Uuid,
    ) -> Result<Vec<ChangeRecord>, AuditError> {
        self.count_read();
        let records = self
            .state
            .change_log
            .iter()
            .filter(|r| r.object_type == object_type && r.target_id == target_id)
            .cloned()
            .collect();
        Ok(newest_first(records))
    }

    async fn linked_history(
        &mut self,
        link: &LinkTable,
        entity_id: Uuid,
    ) -> Result<Vec<ChangeRecord>, AuditError> {
        self.count_read();
        let ids: Vec<Uuid> = self
            .state
            .links
            .get(&link.table)
            .map(|links| {
                links
                    .iter()
                    .filter(|l| l.entity_id == entity_id)
                    .map(|l| l.change_log_id)
                    .collect()
            })
            .unwrap_or_default();
        let records = self
            .state
            .change_log
            .iter()
            .filter(|r| ids.contains(&r.id))
            .cloned()
            .collect();
        Ok(newest_first(records))
    }

    async fn commit(mut self) -> Result<(), AuditError> {
        self.backup = None;
        Ok(())
    }
}

/// Foreign keys and unique keys `row` must satisfy to be stored as `id`.
fn check_row(
    state: &MemoryState,
    constraints: &Constraints,
    table: &str,
    id: Uuid,
    row: &Snapshot,
) -> Result<(), AuditError> {
    for fk in constraints.foreign_keys.iter().filter(|fk| fk.table == table) {
        let Some(value) = row.get(fk.column).filter(|v| !v.is_null()) else {
            continue;
        };
        let exists = value
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .is_some_and(|target| {
                state
                    .tables
                    .get(fk.references)
                    .is_some_and(|rows| rows.contains_key(&target))
            });
        if !exists {
            return Err(AuditError::Storage(format!(
                "{table} violates foreign key constraint {table}_{}_fkey",
                fk.column
            )));
        }
    }

    for key in constraints.unique.iter().filter(|k| k.table == table) {
        let values: Option<Vec<&Value>> = key
            .columns
            .iter()
            .map(|c| row.get(*c).filter(|v| !v.is_null()))
            .collect();
        let Some(values) = values else {
            continue;
        };
        let clash = state.tables.get(table).is_some_and(|rows| {
            rows.iter().any(|(other, existing)| {
                *other != id
                    && key
                        .columns
                        .iter()
                        .zip(&values)
                        .all(|(c, v)| existing.get(*c) == Some(*v))
            })
        });
        if clash {
            return Err(AuditError::Storage(format!(
                "{table} violates unique constraint on {:?}",
                key.columns
            )));
        }
    }
    Ok(())
}

/// Delete a row and apply every `ON DELETE` rule that points at it.
fn delete_cascading(state: &mut MemoryState, constraints: &Constraints, table: &str, id: Uuid) -> bool {
    let removed = state
        .tables
        .get_mut(table)
        .and_then(|rows| rows.remove(&id))
        .is_some();
    if !removed {
        return false;
    }

    let link_tables: Vec<String> = state
        .link_defs
        .values()
        .filter(|def| def.entity_table == table)
        .map(|def| def.table.clone())
        .collect();
    for link_table in link_tables {
        if let Some(links) = state.links.get_mut(&link_table) {
            links.retain(|l| l.entity_id != id);
        }
    }

    let key = Value::String(id.to_string());
    for fk in constraints.foreign_keys.iter().filter(|fk| fk.references == table) {
        let referencing: Vec<Uuid> = state
            .tables
            .get(fk.table)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, row)| row.get(fk.column) == Some(&key))
                    .map(|(row_id, _)| *row_id)
                    .collect()
            })
            .unwrap_or_default();

        for row_id in referencing {
            match fk.on_delete {
                OnDelete::Cascade => {
                    delete_cascading(state, constraints, fk.table, row_id);
                }
                OnDelete::SetNull => {
                    if let Some(row) = state
                        .tables
                        .get_mut(fk.table)
                        .and_then(|rows| rows.get_mut(&row_id))
                    {
                        row.insert(fk.column.to_string(), Value::Null);
                    }
                }
            }
        }
    }
    true
}

fn newest_first(mut records: Vec<ChangeRecord>) -> Vec<ChangeRecord> {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
    records
}

fn row_id(row: &Snapshot) -> Result<Uuid, AuditError> {
    row.get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| AuditError::Storage("row has no valid id".into()))
}

fn contains(row: &Snapshot, expected: &Snapshot) -> bool {
    expected
        .iter()
        .all(|(column, value)| row.get(column) == Some(value))
}

/// Null and missing sort first, then booleans, numbers, strings.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x @ (Value::Array(_) | Value::Object(_))), Some(y @ (Value::Array(_) | Value::Object(_)))) => {
            x.to_string().cmp(&y.to_string())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}
