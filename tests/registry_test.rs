use change_trail::domain::entity::{LinkTable, Trackable};
use change_trail::domain::error::AuditError;
use change_trail::domain::inventory::{Device, tracked_link_tables};
use change_trail::infra::memory::MemoryStore;
use change_trail::services::registry::EntityRegistry;
use std::sync::Arc;

#[tokio::test]
async fn bootstrap_registers_every_tracked_type() {
    let store = MemoryStore::new();
    let registry = EntityRegistry::new();
    registry.bootstrap(&store, tracked_link_tables()).await.unwrap();

    assert_eq!(registry.len(), 4);
    let device = registry.get("Device").unwrap();
    assert_eq!(device.table, "device_change_log");
    assert_eq!(device.entity_column, "device_id");
    assert_eq!(device.entity_table, "devices");
    assert_eq!(registry.get("Console").unwrap().entity_table, "consoles");
}

#[tokio::test]
async fn registration_is_idempotent() {
    let store = MemoryStore::new();
    let registry = EntityRegistry::new();

    let first = registry.ensure::<_, Device>(&store).await.unwrap();
    let second = registry.ensure::<_, Device>(&store).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(registry.len(), 1);

    // A second process-level registry over the same store.
    let other = EntityRegistry::new();
    other.bootstrap(&store, tracked_link_tables()).await.unwrap();
    assert_eq!(other.get("Device"), Some(first));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_use_agrees() {
    let store = MemoryStore::new();
    let registry = Arc::new(EntityRegistry::new());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            registry.ensure::<_, Device>(&store).await.unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), Device::link_table());
    }
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn conflicting_definition_is_a_schema_conflict() {
    let store = MemoryStore::new();
    let registry = EntityRegistry::new();
    registry.ensure::<_, Device>(&store).await.unwrap();

    let mut other_entity = LinkTable::for_entity("Router", "routers");
    other_entity.table = "device_change_log".into();
    let err = registry
        .ensure_link_table(&store, other_entity)
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::SchemaConflict { ref table, .. } if table == "device_change_log"));

    let mut moved = Device::link_table();
    moved.entity_table = "switches".into();
    let err = registry.ensure_link_table(&store, moved).await.unwrap_err();
    assert!(matches!(err, AuditError::SchemaConflict { .. }));
}

#[tokio::test]
async fn store_rejects_an_incompatible_existing_table() {
    let store = MemoryStore::new();
    EntityRegistry::new()
        .ensure::<_, Device>(&store)
        .await
        .unwrap();

    // Fresh registry, so the conflict is caught by the store.
    let mut moved = Device::link_table();
    moved.entity_column = "switch_id".into();
    let err = EntityRegistry::new()
        .ensure_link_table(&store, moved)
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::SchemaConflict { .. }));
}
