//! Runs against a local PostgreSQL. `cargo test -- --ignored` to include.

mod common;

use change_trail::domain::actor::ActorContext;
use change_trail::domain::change_log::ChangeAction;
use change_trail::domain::entity::{LinkTable, Trackable};
use change_trail::domain::error::AuditError;
use change_trail::domain::inventory::{Cable, Console, Device, Socket};
use change_trail::domain::polymorphic::PolyQuery;
use change_trail::domain::store::Store;
use change_trail::infra::postgres::PgStore;
use common::*;
use serde_json::json;

const DB: &str = "change_trail_test_pg";

#[tokio::test]
#[ignore]
async fn device_lifecycle_round_trips_through_postgres() {
    let h = harness(PgStore::new(setup_pool(DB).await)).await;
    let alice = register_actor(&h.store, "alice").await;
    let mut ctx = ActorContext::new();

    let mut sw = device("pg-sw1");
    h.recorder.save(&ctx.with_actor(alice), &mut sw).await.unwrap();
    sw.name = "pg-sw2".into();
    h.recorder.save(&ctx, &mut sw).await.unwrap();

    let live = h.recorder.live_history(&sw).await.unwrap();
    assert_eq!(live.len(), 2);

    h.recorder.delete(&ctx, &sw).await.unwrap();

    let history = h.recorder.history_of(&sw).await.unwrap();
    let actions: Vec<ChangeAction> = history.iter().map(|r| r.action).collect();
    assert_eq!(
        actions,
        [ChangeAction::Delete, ChangeAction::Update, ChangeAction::Create]
    );
    assert_eq!(history[1].changed_fields, Some(vec!["name".to_string()]));
    assert_eq!(history[2].actor, Some(alice));
    assert!(h.recorder.live_history(&sw).await.unwrap().is_empty());

    // The immutability trigger lets the actor reference be cleared.
    assert!(h.store.delete_actor(alice).await.unwrap());
    let history = h.recorder.history_of(&sw).await.unwrap();
    assert!(history.iter().all(|r| r.actor.is_none()));
}

#[tokio::test]
#[ignore]
async fn change_log_rows_cannot_be_rewritten() {
    let h = harness(PgStore::new(setup_pool(DB).await)).await;
    let ctx = ActorContext::new();

    let mut sw = device("pg-frozen");
    let record = h.recorder.save(&ctx, &mut sw).await.unwrap();

    let result = sqlx::query("UPDATE change_log SET object_type = 'Cable' WHERE id = $1")
        .bind(record.id)
        .execute(h.store.pool())
        .await;
    assert!(result.is_err());

    let result = sqlx::query("DELETE FROM change_log WHERE id = $1")
        .bind(record.id)
        .execute(h.store.pool())
        .await;
    assert!(result.is_err());
}

#[tokio::test]
#[ignore]
async fn sockets_resolve_through_subtype_tables() {
    let h = harness(PgStore::new(setup_pool(DB).await)).await;
    let ctx = ActorContext::new();

    let mut sw = device("pg-sockets");
    h.recorder.save(&ctx, &mut sw).await.unwrap();
    let device_id = sw.id.unwrap();
    let mut eth = interface("eth0", device_id);
    let mut con = console("con0", device_id, 9600);
    h.recorder.save(&ctx, &mut eth).await.unwrap();
    h.recorder.save(&ctx, &mut con).await.unwrap();

    con.bauds = 19_200;
    let updated = h.recorder.save(&ctx, &mut con).await.unwrap();
    assert_eq!(updated.changed_fields, Some(vec!["bauds".to_string()]));
    assert_eq!(updated.new_state.unwrap()["bauds"], json!(19_200));

    let sockets = h
        .sockets
        .filter(PolyQuery::new().eq("device_id", device_id.to_string()).order_by("name"))
        .await
        .unwrap();
    assert_eq!(sockets.len(), 2);
    assert!(matches!(&sockets[0], Socket::Console(c) if c.bauds == 19_200));
    assert!(matches!(&sockets[1], Socket::Interface(i) if i.name == "eth0"));

    let loaded: Console = h.recorder.load(con.id.unwrap()).await.unwrap().unwrap();
    assert_eq!(loaded, con);
}

#[tokio::test]
#[ignore]
async fn failed_audit_write_rolls_back_in_postgres() {
    let h = harness(PgStore::new(setup_pool(DB).await)).await;
    let ghost = change_trail::domain::id::ActorId::new();
    let mut ctx = ActorContext::new();

    // Unknown actor: the change_log foreign key rejects the record.
    let mut sw = device("pg-rollback");
    let err = h
        .recorder
        .save(&ctx.with_actor(ghost), &mut sw)
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::AuditWrite { .. }));

    let loaded: Option<Device> = h.recorder.load(sw.id.unwrap()).await.unwrap();
    assert!(loaded.is_none());
}

#[tokio::test]
#[ignore]
async fn link_table_with_wrong_columns_is_a_conflict() {
    let store = PgStore::new(setup_pool(DB).await);
    sqlx::query("CREATE TABLE IF NOT EXISTS widget_change_log (id BIGSERIAL PRIMARY KEY, note TEXT)")
        .execute(store.pool())
        .await
        .unwrap();

    let err = store
        .ensure_link_table(&LinkTable::for_entity("Widget", "devices"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::SchemaConflict { .. }));

    store.ensure_link_table(&Device::link_table()).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn deletes_record_cascaded_sockets_and_cables_in_postgres() {
    let h = harness(PgStore::new(setup_pool(DB).await)).await;
    let ctx = ActorContext::new();

    let mut sw = device("pg-cascade");
    h.recorder.save(&ctx, &mut sw).await.unwrap();
    let device_id = sw.id.unwrap();
    let mut a = interface("eth0", device_id);
    let mut b = interface("eth1", device_id);
    let mut con = console("con0", device_id, 9600);
    h.recorder.save(&ctx, &mut a).await.unwrap();
    h.recorder.save(&ctx, &mut b).await.unwrap();
    h.recorder.save(&ctx, &mut con).await.unwrap();
    let mut link = cable("green", a.id, b.id);
    h.recorder.save(&ctx, &mut link).await.unwrap();

    h.recorder.delete(&ctx, &a).await.unwrap();
    let actions: Vec<ChangeAction> = h
        .recorder
        .history_of(&link)
        .await
        .unwrap()
        .iter()
        .map(|r| r.action)
        .collect();
    assert_eq!(actions, [ChangeAction::Delete, ChangeAction::Create]);
    assert!(h.recorder.load::<Cable>(link.id.unwrap()).await.unwrap().is_none());

    h.recorder.delete(&ctx, &sw).await.unwrap();
    for history in [
        h.recorder.history_of(&b).await.unwrap(),
        h.recorder.history_of(&con).await.unwrap(),
        h.recorder.history_of(&sw).await.unwrap(),
    ] {
        assert_eq!(history[0].action, ChangeAction::Delete);
    }

    let left = h
        .sockets
        .filter(PolyQuery::new().eq("device_id", device_id.to_string()))
        .await
        .unwrap();
    assert!(left.is_empty());
}

#[tokio::test]
#[ignore]
async fn cable_to_a_missing_socket_fails_in_postgres() {
    let h = harness(PgStore::new(setup_pool(DB).await)).await;
    let ctx = ActorContext::new();

    let mut c = cable("grey", Some(uuid::Uuid::now_v7()), None);
    let err = h.recorder.save(&ctx, &mut c).await.unwrap_err();
    assert!(matches!(err, AuditError::Database(_)));
    assert!(h.recorder.history_of(&c).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn concurrent_link_table_creation_all_succeeds() {
    let store = PgStore::new(setup_pool(DB).await);
    let suffix = uuid::Uuid::now_v7().simple().to_string();
    let link = LinkTable::for_entity(&format!("Race{}", &suffix[20..]), "devices");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let link = link.clone();
        handles.push(tokio::spawn(async move { store.ensure_link_table(&link).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let columns: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM information_schema.columns WHERE table_name = $1",
    )
    .bind(&link.table)
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(columns, 4);
}

#[test]
fn database_url_is_retargeted_per_binary() {
    assert_eq!(
        with_database("postgres://u:p@db:5433/app?sslmode=disable", "change_trail_test_pg"),
        "postgres://u:p@db:5433/change_trail_test_pg?sslmode=disable"
    );
    assert_eq!(
        with_database("postgresql://localhost", "postgres"),
        "postgresql://localhost/postgres"
    );
}
