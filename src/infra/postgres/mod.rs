pub mod audit_repo;
pub mod row_repo;
pub mod schema_repo;

use {
    crate::domain::change_log::ChangeRecord,
    crate::domain::entity::LinkTable,
    crate::domain::error::AuditError,
    crate::domain::id::{Actor, ActorId},
    crate::domain::snapshot::Snapshot,
    crate::domain::store::{RowQuery, Store, StoreTx},
    sqlx::{PgPool, Postgres, Transaction},
    uuid::Uuid,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, AuditError> {
        Ok(PgTx(self.pool.begin().await?))
    }

    async fn ensure_link_table(&self, link: &LinkTable) -> Result<(), AuditError> {
        schema_repo::ensure_link_table(&self.pool, link).await
    }

    async fn insert_actor(&self, actor: &Actor) -> Result<(), AuditError> {
        sqlx::query("INSERT INTO actors (id, name) VALUES ($1, $2)")
            .bind(actor.id.as_uuid())
            .bind(&actor.name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_actor(&self, id: ActorId) -> Result<bool, AuditError> {
        let result = sqlx::query("DELETE FROM actors WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Open transaction. sqlx rolls it back if it is dropped before commit.
pub struct PgTx(Transaction<'static, Postgres>);

impl StoreTx for PgTx {
    async fn fetch_row(&mut self, table: &str, id: Uuid) -> Result<Option<Snapshot>, AuditError> {
        row_repo::fetch_row(&mut self.0, table, id).await
    }

    async fn insert_row(&mut self, table: &str, row: &Snapshot) -> Result<(), AuditError> {
        row_repo::insert_row(&mut self.0, table, row).await
    }

    async fn update_row(
        &mut self,
        table: &str,
        id: Uuid,
        row: &Snapshot,
    ) -> Result<bool, AuditError> {
        row_repo::update_row(&mut self.0, table, id, row).await
    }

    async fn delete_row(&mut self, table: &str, id: Uuid) -> Result<bool, AuditError> {
        row_repo::delete_row(&mut self.0, table, id).await
    }

    async fn select_rows(
        &mut self,
        table: &str,
        query: &RowQuery,
    ) -> Result<Vec<Snapshot>, AuditError> {
        row_repo::select_rows(&mut self.0, table, query).await
    }

    async fn select_by_ids(
        &mut self,
        table: &str,
        ids: &[Uuid],
    ) -> Result<Vec<Snapshot>, AuditError> {
        row_repo::select_by_ids(&mut self.0, table, ids).await
    }

    async fn insert_change_record(&mut self, record: &ChangeRecord) -> Result<(), AuditError> {
        audit_repo::insert_change_record(&mut self.0, record).await
    }

    async fn insert_link(
        &mut self,
        link: &LinkTable,
        entity_id: Uuid,
        change_log_id: Uuid,
    ) -> Result<(), AuditError> {
        audit_repo::insert_link(&mut self.0, link, entity_id, change_log_id).await
    }

    async fn change_history(
        &mut self,
        object_type: &str,
        target_id: Uuid,
    ) -> Result<Vec<ChangeRecord>, AuditError> {
        audit_repo::change_history(&mut self.0, object_type, target_id).await
    }

    async fn linked_history(
        &mut self,
        link: &LinkTable,
        entity_id: Uuid,
    ) -> Result<Vec<ChangeRecord>, AuditError> {
        audit_repo::linked_history(&mut self.0, link, entity_id).await
    }

    async fn commit(self) -> Result<(), AuditError> {
        self.0.commit().await?;
        Ok(())
    }
}
