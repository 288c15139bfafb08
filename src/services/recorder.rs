//! Change recorder: every tracked mutation produces exactly one change record.
//!
//! A save runs three steps inside one store transaction:
//!
//! 1. [`before_write`] captures the persisted state, if any, into a
//!    [`WriteCapture`];
//! 2. the entity rows are inserted (empty capture) or updated;
//! 3. [`after_write`] turns the capture and the new state into a CREATE or
//!    UPDATE record plus a link row.
//!
//! A delete first deletes, depth first, every tracked entity that the
//! schema would cascade away with it, each with its own DELETE record. Then
//! it deletes the entity's rows and calls [`after_delete`]. If writing any
//! record or link fails, the transaction is dropped and every change in it is
//! rolled back.

use {
    super::entity_rows,
    super::registry::EntityRegistry,
    crate::domain::actor::ActorContext,
    crate::domain::change_log::ChangeRecord,
    crate::domain::entity::{DependentSink, LinkTable, Trackable},
    crate::domain::error::AuditError,
    crate::domain::snapshot::{self, Snapshot},
    crate::domain::store::{Store, StoreTx},
    std::{future::Future, pin::Pin, sync::Arc},
    uuid::Uuid,
};

/// Prior state carried from [`before_write`] to [`after_write`] for one save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteCapture {
    prior: Option<Snapshot>,
}

impl WriteCapture {
    pub fn prior(&self) -> Option<&Snapshot> {
        self.prior.as_ref()
    }

    pub fn is_create(&self) -> bool {
        self.prior.is_none()
    }
}

pub async fn before_write<T: StoreTx, E: Trackable>(
    tx: &mut T,
    entity: &E,
) -> Result<WriteCapture, AuditError> {
    let Some(id) = entity.id() else {
        return Ok(WriteCapture::default());
    };

    match entity_rows::load::<T, E>(tx, id).await? {
        Some(old) => Ok(WriteCapture {
            prior: snapshot::serialize(Some(&old))?,
        }),
        None => {
            tracing::debug!(
                entity_type = E::ENTITY_TYPE,
                %id,
                "no persisted row before write, treating as create"
            );
            Ok(WriteCapture::default())
        }
    }
}

pub async fn after_write<T: StoreTx, E: Trackable>(
    tx: &mut T,
    link: &LinkTable,
    actor: &ActorContext,
    capture: WriteCapture,
    entity: &E,
) -> Result<ChangeRecord, AuditError> {
    let id = require_id(entity)?;
    let new_state = state_of(entity)?;

    let record = match capture.prior {
        None => ChangeRecord::created(E::ENTITY_TYPE, id, actor.current(), new_state),
        Some(old_state) => {
            let changed = snapshot::diff(Some(&old_state), &new_state);
            ChangeRecord::updated(E::ENTITY_TYPE, id, actor.current(), old_state, new_state, changed)
        }
    };

    tx.insert_change_record(&record)
        .await
        .map_err(|e| AuditError::audit_write(E::ENTITY_TYPE, e))?;
    tx.insert_link(link, id, record.id)
        .await
        .map_err(|e| AuditError::audit_write(E::ENTITY_TYPE, e))?;

    Ok(record)
}

/// Record the deletion of `old`, the state as persisted right before the
/// delete. No link row: the entity's link rows cascade away with it.
pub async fn after_delete<T: StoreTx, E: Trackable>(
    tx: &mut T,
    actor: &ActorContext,
    old: &E,
) -> Result<ChangeRecord, AuditError> {
    let id = require_id(old)?;
    let record = ChangeRecord::deleted(E::ENTITY_TYPE, id, actor.current(), state_of(old)?);

    tx.insert_change_record(&record)
        .await
        .map_err(|e| AuditError::audit_write(E::ENTITY_TYPE, e))?;

    Ok(record)
}

fn require_id<E: Trackable>(entity: &E) -> Result<Uuid, AuditError> {
    entity.id().ok_or_else(|| {
        AuditError::Validation(format!("{} has no id", E::ENTITY_TYPE))
    })
}

fn state_of<E: Trackable>(entity: &E) -> Result<Snapshot, AuditError> {
    snapshot::serialize(Some(entity))?
        .ok_or_else(|| AuditError::Validation(format!("{} has no state", E::ENTITY_TYPE)))
}

/// Deletes entities depth first, recording one DELETE per removed entity.
struct CascadeDelete<'a, T> {
    tx: &'a mut T,
    actor: &'a ActorContext,
    records: Vec<ChangeRecord>,
}

impl<T: StoreTx> CascadeDelete<'_, T> {
    /// `None` if no `E` with this id is persisted.
    async fn delete_one<E: Trackable>(&mut self, id: Uuid) -> Result<Option<ChangeRecord>, AuditError> {
        let Some(old) = entity_rows::load::<T, E>(self.tx, id).await? else {
            return Ok(None);
        };
        E::remove_dependents(self, id).await?;
        entity_rows::delete::<T, E>(self.tx, id).await?;

        let record = after_delete(self.tx, self.actor, &old).await?;
        self.records.push(record.clone());
        Ok(Some(record))
    }
}

impl<T: StoreTx> DependentSink for CascadeDelete<'_, T> {
    fn remove<E: Trackable>(
        &mut self,
        column: &'static str,
        id: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<(), AuditError>> + Send + '_>> {
        Box::pin(async move {
            for dependent in entity_rows::ids_where::<T, E>(self.tx, column, id).await? {
                if self.delete_one::<E>(dependent).await?.is_some() {
                    tracing::debug!(
                        entity_type = E::ENTITY_TYPE,
                        id = %dependent,
                        via = column,
                        "cascaded delete recorded"
                    );
                }
            }
            Ok(())
        })
    }
}

pub struct ChangeRecorder<S> {
    store: S,
    registry: Arc<EntityRegistry>,
}

impl<S: Store> ChangeRecorder<S> {
    pub fn new(store: S, registry: Arc<EntityRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Insert or update `entity`, assigning an id if it has none.
    pub async fn save<E: Trackable>(
        &self,
        actor: &ActorContext,
        entity: &mut E,
    ) -> Result<ChangeRecord, AuditError> {
        entity.validate()?;
        let link = self.registry.ensure::<S, E>(&self.store).await?;
        let mut tx = self.store.begin().await?;

        let capture = before_write(&mut tx, &*entity).await?;

        let id = match entity.id() {
            Some(id) => id,
            None => {
                let id = Uuid::now_v7();
                entity.assign_id(id);
                id
            }
        };
        let state = state_of(entity)?;
        if capture.is_create() {
            entity_rows::insert::<S::Tx, E>(&mut tx, id, &state).await?;
        } else {
            entity_rows::update::<S::Tx, E>(&mut tx, id, &state).await?;
        }

        let record = after_write(&mut tx, &link, actor, capture, &*entity).await?;
        tx.commit().await?;

        tracing::info!(
            entity_type = E::ENTITY_TYPE,
            %id,
            action = %record.action,
            changed = ?record.changed_fields,
            "change recorded"
        );
        Ok(record)
    }

    /// Delete `entity` and record its last persisted state. Dependent
    /// entities are deleted and recorded first, in the same transaction.
    pub async fn delete<E: Trackable>(
        &self,
        actor: &ActorContext,
        entity: &E,
    ) -> Result<ChangeRecord, AuditError> {
        let id = require_id(entity)?;
        let mut tx = self.store.begin().await?;

        let mut cascade = CascadeDelete {
            tx: &mut tx,
            actor,
            records: Vec::new(),
        };
        let Some(record) = cascade.delete_one::<E>(id).await? else {
            return Err(AuditError::NotFound(format!("{} {id}", E::ENTITY_TYPE)));
        };
        let cascaded = cascade.records.len() - 1;
        tx.commit().await?;

        tracing::info!(entity_type = E::ENTITY_TYPE, %id, cascaded, "deletion recorded");
        Ok(record)
    }

    pub async fn load<E: Trackable>(&self, id: Uuid) -> Result<Option<E>, AuditError> {
        let mut tx = self.store.begin().await?;
        let entity = entity_rows::load::<S::Tx, E>(&mut tx, id).await?;
        tx.commit().await?;
        Ok(entity)
    }

    /// Full history of one entity, newest first. Works after the entity is
    /// deleted.
    pub async fn history(
        &self,
        object_type: &str,
        target_id: Uuid,
    ) -> Result<Vec<ChangeRecord>, AuditError> {
        let mut tx = self.store.begin().await?;
        let records = tx.change_history(object_type, target_id).await?;
        tx.commit().await?;
        Ok(records)
    }

    pub async fn history_of<E: Trackable>(&self, entity: &E) -> Result<Vec<ChangeRecord>, AuditError> {
        self.history(E::ENTITY_TYPE, require_id(entity)?).await
    }

    /// History reachable through the link table. Only covers live entities
    /// and never includes the DELETE record.
    pub async fn live_history<E: Trackable>(
        &self,
        entity: &E,
    ) -> Result<Vec<ChangeRecord>, AuditError> {
        let id = require_id(entity)?;
        let link = self.registry.ensure::<S, E>(&self.store).await?;
        let mut tx = self.store.begin().await?;
        let records = tx.linked_history(&link, id).await?;
        tx.commit().await?;
        Ok(records)
    }
}
