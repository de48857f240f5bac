//! Two real clients against a live in-process relay.

use std::sync::Arc;
use std::time::Duration;

use records::{ChangeOrigin, ChangeStore, Record, RecordId};
use sync::{ClientConfig, ConnectionStatus, EngineEvent, HttpPersistence, WhiteboardClient};
use wire::Camera;

async fn spawn_relay() -> String {
    let state = relay::AppState::new();
    let app = relay::app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("127.0.0.1:{}", addr.port())
}

async fn connect_client(addr: &str, whiteboard_id: i64, user: &str) -> WhiteboardClient {
    let api = Arc::new(HttpPersistence::new(format!("http://{addr}")));
    let client = WhiteboardClient::connect(
        ClientConfig {
            relay_url: format!("ws://{addr}"),
            whiteboard_id,
            page_id: None,
            user_id: user.to_owned(),
            user_name: user.to_owned(),
        },
        api,
    )
    .await
    .expect("connect");

    let mut status = client.status();
    tokio::time::timeout(Duration::from_secs(5), async {
        while *status.borrow_and_update() != ConnectionStatus::Connected {
            status.changed().await.expect("status channel");
        }
    })
    .await
    .expect("client comes up");
    client
}

/// Poll the store until the predicate holds.
async fn wait_for(store: &ChangeStore, what: &str, predicate: impl Fn(&ChangeStore) -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !predicate(store) {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn shape(id: &str, page_id: i64) -> Record {
    Record::new(
        RecordId::new(id),
        serde_json::json!({ "id": id, "parentId": format!("page:{page_id}") }),
    )
}

#[tokio::test]
async fn drawn_shapes_appear_in_the_peers_store() {
    let addr = spawn_relay().await;
    let alice = connect_client(&addr, 3, "alice").await;
    let bob = connect_client(&addr, 3, "bob").await;
    let page = alice.current_page_id();
    assert_eq!(bob.current_page_id(), page, "both clients join the first page");

    alice
        .store()
        .put(shape("shape:s1", page), ChangeOrigin::User);

    let bob_store = bob.store();
    wait_for(&bob_store, "relayed shape", |store| {
        store.contains(&RecordId::new("shape:s1"))
    })
    .await;

    // The echo must not come back to alice as a remote batch duplicating it.
    assert_eq!(
        alice.store().get(&RecordId::new("shape:s1")).map(|record| record.id),
        Some(RecordId::new("shape:s1"))
    );

    alice.close().await;
    bob.close().await;
}

#[tokio::test]
async fn created_pages_materialize_for_every_peer() {
    let addr = spawn_relay().await;
    let alice = connect_client(&addr, 3, "alice").await;
    let bob = connect_client(&addr, 3, "bob").await;

    let created = alice.create_page("Sprint Plan").await.expect("create page");

    let bob_store = bob.store();
    wait_for(&bob_store, "broadcast page record", |store| {
        store.contains(&RecordId::page(created.page_id))
    })
    .await;
    let record = bob_store.get(&RecordId::page(created.page_id)).expect("page record");
    assert_eq!(record.name(), Some("Sprint Plan"));
    assert_eq!(record.sort_index(), Some(format!("a{}", created.page_id).as_str()));

    alice.close().await;
    bob.close().await;
}

#[tokio::test]
async fn deleting_a_viewed_page_prompts_the_viewer_to_reload() {
    let addr = spawn_relay().await;
    let alice = connect_client(&addr, 3, "alice").await;
    let mut bob = connect_client(&addr, 3, "bob").await;
    let viewed = bob.current_page_id();

    // A second page so the delete clears the last-page guard.
    alice.create_page("Spare").await.expect("create page");
    let bob_store = bob.store();
    wait_for(&bob_store, "spare page record", |store| {
        store.records_of(records::RecordKind::Page).len() == 2
    })
    .await;

    alice.delete_page(viewed).await.expect("delete viewed page");

    let event = tokio::time::timeout(Duration::from_secs(5), bob.next_event())
        .await
        .expect("event within deadline");
    assert_eq!(event, Some(EngineEvent::PageDeleted { page_id: viewed }));
    // The record is removed regardless of what the user decides at the prompt.
    assert!(!bob_store.contains(&RecordId::page(viewed)));

    alice.close().await;
    bob.close().await;
}

#[tokio::test]
async fn presence_flows_between_peers_and_clears_on_leave() {
    let addr = spawn_relay().await;
    let alice = connect_client(&addr, 3, "alice").await;
    let bob = connect_client(&addr, 3, "bob").await;

    alice.pointer_moved(42.0, 24.0, Camera { x: 0.0, y: 0.0, z: 1.0 });

    let bob_store = bob.store();
    wait_for(&bob_store, "alice's presence record", |store| {
        store.contains(&RecordId::presence("alice"))
    })
    .await;
    let record = bob_store.get(&RecordId::presence("alice")).expect("presence");
    assert_eq!(
        record.data.get("userName").and_then(serde_json::Value::as_str),
        Some("alice")
    );
    assert!(
        !alice.store().contains(&RecordId::presence("alice")),
        "own presence never lands in the local store"
    );

    alice.close().await;
    wait_for(&bob_store, "presence cleared by leave", |store| {
        !store.contains(&RecordId::presence("alice"))
    })
    .await;

    bob.close().await;
}

#[tokio::test]
async fn shapes_persisted_out_of_band_survive_a_fresh_join() {
    let addr = spawn_relay().await;
    let alice = connect_client(&addr, 3, "alice").await;
    let page = alice.current_page_id();

    // The editing surface saves shapes through the batch endpoint, out of
    // band of the live relay.
    let api = HttpPersistence::new(format!("http://{addr}"));
    use sync::PersistenceApi;
    api.save_shapes(3, page, &[sync::ShapeRow::from_record(&shape("shape:saved", page))])
        .await
        .expect("save shapes");

    let late = connect_client(&addr, 3, "late").await;
    assert!(
        late.store().contains(&RecordId::new("shape:saved")),
        "a fresh connection reloads canonical page state"
    );

    alice.close().await;
    late.close().await;
}
