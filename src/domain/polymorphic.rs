use {
    super::entity::BaseTable,
    super::error::AuditError,
    super::snapshot::Snapshot,
    super::store::RowQuery,
};

/// Tagged union over the concrete subtypes sharing one base table.
pub trait Polymorphic: Sized + Send {
    const BASE: BaseTable;

    /// Subtype table for a discriminator value, `None` for an unknown value.
    fn subtype_table(discriminator: &str) -> Option<&'static str>;

    /// Build the concrete variant from the merged base and subtype columns.
    fn materialize(discriminator: &str, row: Snapshot) -> Result<Self, AuditError>;
}

/// Query against a polymorphic collection.
///
/// With `kinds` empty, the discriminators to resolve are discovered from the
/// base rows. Otherwise the base query is restricted to those kinds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolyQuery {
    pub rows: RowQuery,
    pub kinds: Vec<String>,
}

impl PolyQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<serde_json::Value>) -> Self {
        self.rows = self.rows.eq(column, value);
        self
    }

    pub fn exclude_eq(mut self, column: &str, value: impl Into<serde_json::Value>) -> Self {
        self.rows = self.rows.exclude_eq(column, value);
        self
    }

    pub fn of_kinds(mut self, kinds: &[&str]) -> Self {
        self.kinds = kinds.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.rows = self.rows.order_by(column);
        self
    }

    pub fn descending(mut self) -> Self {
        self.rows = self.rows.descending();
        self
    }

    /// Base-table query for this poly query, discriminator restriction applied.
    pub fn base_query<P: Polymorphic>(&self) -> RowQuery {
        let mut rows = self.rows.clone();
        if !self.kinds.is_empty() {
            rows = rows.one_of(P::BASE.discriminator_column, self.kinds.clone());
        }
        rows
    }
}
