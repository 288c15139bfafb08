//! Persistence layer consumed by the recorder and the polymorphic store.
//!
//! Rows travel as [`Snapshot`]s keyed by column name. Every row table has a
//! UUID `id` primary key.

use {
    super::change_log::ChangeRecord,
    super::entity::LinkTable,
    super::error::AuditError,
    super::id::{Actor, ActorId},
    super::snapshot::Snapshot,
    serde_json::Value,
    std::future::Future,
    uuid::Uuid,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl Default for OrderBy {
    fn default() -> Self {
        Self {
            column: "id".into(),
            descending: false,
        }
    }
}

/// Row selection: equality filters, a negated equality conjunction, an
/// optional "column is one of" restriction, ordering and limit.
/// Ties on the order column are broken by `id` in the same direction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowQuery {
    pub filter: Snapshot,
    pub exclude: Option<Snapshot>,
    pub one_of: Option<(String, Vec<String>)>,
    pub order_by: OrderBy,
    pub limit: Option<u32>,
}

impl RowQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filter.insert(column.to_string(), value.into());
        self
    }

    pub fn exclude_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.exclude
            .get_or_insert_with(Snapshot::new)
            .insert(column.to_string(), value.into());
        self
    }

    pub fn one_of(mut self, column: &str, values: Vec<String>) -> Self {
        self.one_of = Some((column.to_string(), values));
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by.column = column.to_string();
        self
    }

    pub fn descending(mut self) -> Self {
        self.order_by.descending = true;
        self
    }

    pub fn reversed(mut self) -> Self {
        self.order_by.descending = !self.order_by.descending;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

pub trait Store: Send + Sync {
    type Tx: StoreTx;

    fn begin(&self) -> impl Future<Output = Result<Self::Tx, AuditError>> + Send;

    /// Create the link table if it does not exist and verify that an existing
    /// one is compatible. Safe to race: losing the create is not an error.
    fn ensure_link_table(
        &self,
        link: &LinkTable,
    ) -> impl Future<Output = Result<(), AuditError>> + Send;

    fn insert_actor(&self, actor: &Actor) -> impl Future<Output = Result<(), AuditError>> + Send;

    /// Remove an actor. Change records naming it keep existing with the
    /// actor cleared.
    fn delete_actor(&self, id: ActorId) -> impl Future<Output = Result<bool, AuditError>> + Send;
}

/// One transaction. Dropping it without [`StoreTx::commit`] rolls back.
pub trait StoreTx: Send {
    fn fetch_row(
        &mut self,
        table: &str,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Snapshot>, AuditError>> + Send;

    fn insert_row(
        &mut self,
        table: &str,
        row: &Snapshot,
    ) -> impl Future<Output = Result<(), AuditError>> + Send;

    /// Overwrite the columns present in `row`. Returns whether the row existed.
    fn update_row(
        &mut self,
        table: &str,
        id: Uuid,
        row: &Snapshot,
    ) -> impl Future<Output = Result<bool, AuditError>> + Send;

    /// Delete a row, cascading to link rows that reference it.
    fn delete_row(
        &mut self,
        table: &str,
        id: Uuid,
    ) -> impl Future<Output = Result<bool, AuditError>> + Send;

    fn select_rows(
        &mut self,
        table: &str,
        query: &RowQuery,
    ) -> impl Future<Output = Result<Vec<Snapshot>, AuditError>> + Send;

    /// Rows whose id is in `ids`, in no particular order.
    fn select_by_ids(
        &mut self,
        table: &str,
        ids: &[Uuid],
    ) -> impl Future<Output = Result<Vec<Snapshot>, AuditError>> + Send;

    fn insert_change_record(
        &mut self,
        record: &ChangeRecord,
    ) -> impl Future<Output = Result<(), AuditError>> + Send;

    fn insert_link(
        &mut self,
        link: &LinkTable,
        entity_id: Uuid,
        change_log_id: Uuid,
    ) -> impl Future<Output = Result<(), AuditError>> + Send;

    /// All records for `(object_type, target_id)`, newest first.
    fn change_history(
        &mut self,
        object_type: &str,
        target_id: Uuid,
    ) -> impl Future<Output = Result<Vec<ChangeRecord>, AuditError>> + Send;

    /// Records reachable through the link table for a live entity, newest first.
    fn linked_history(
        &mut self,
        link: &LinkTable,
        entity_id: Uuid,
    ) -> impl Future<Output = Result<Vec<ChangeRecord>, AuditError>> + Send;

    fn commit(self) -> impl Future<Output = Result<(), AuditError>> + Send;
}
