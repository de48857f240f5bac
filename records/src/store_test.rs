use super::*;
use serde_json::json;

fn shape(id: &str, x: i64) -> Record {
    Record::new(
        RecordId::new(id),
        json!({"id": id, "parentId": "page:1", "x": x}),
    )
}

#[test]
fn apply_classifies_added_updated_removed() {
    let store = ChangeStore::new();
    store.put(shape("shape:a", 1), ChangeOrigin::User);
    store.put(shape("shape:b", 1), ChangeOrigin::User);

    let batch = store.apply(
        vec![shape("shape:a", 2), shape("shape:c", 1)],
        vec![RecordId::new("shape:b")],
        ChangeOrigin::User,
    );

    assert_eq!(batch.added.len(), 1);
    assert!(batch.added.contains_key(&RecordId::new("shape:c")));
    let update = batch.updated.get(&RecordId::new("shape:a")).expect("update entry");
    assert_eq!(update.from.data["x"], 1);
    assert_eq!(update.to.data["x"], 2);
    assert_eq!(batch.removed.len(), 1);
    assert_eq!(batch.removed[&RecordId::new("shape:b")].data["x"], 1);
}

#[test]
fn subscriber_sees_one_batch_per_apply_in_order() {
    let store = ChangeStore::new();
    let mut rx = store.subscribe();

    store.put(shape("shape:a", 1), ChangeOrigin::User);
    store.apply(
        vec![shape("shape:a", 2), shape("shape:b", 1)],
        Vec::new(),
        ChangeOrigin::Remote,
    );

    let first = rx.try_recv().expect("first batch");
    assert_eq!(first.origin, ChangeOrigin::User);
    assert_eq!(first.added.len(), 1);

    let second = rx.try_recv().expect("second batch");
    assert_eq!(second.origin, ChangeOrigin::Remote);
    assert_eq!(second.updated.len(), 1);
    assert_eq!(second.added.len(), 1);

    assert!(rx.try_recv().is_err());
}

#[test]
fn store_state_matches_batch_when_observed() {
    let store = ChangeStore::new();
    let mut rx = store.subscribe();

    store.apply(
        vec![shape("shape:a", 1), shape("shape:b", 2)],
        Vec::new(),
        ChangeOrigin::User,
    );

    let batch = rx.try_recv().expect("batch");
    for id in batch.added.keys() {
        assert!(store.contains(id), "record {id} visible with its batch");
    }
    assert_eq!(store.len(), 2);
}

#[test]
fn identical_re_put_is_silent() {
    let store = ChangeStore::new();
    store.put(shape("shape:a", 1), ChangeOrigin::User);

    let mut rx = store.subscribe();
    let batch = store.put(shape("shape:a", 1), ChangeOrigin::User);

    assert!(batch.is_empty());
    assert!(rx.try_recv().is_err());
}

#[test]
fn removing_absent_id_is_silent() {
    let store = ChangeStore::new();
    let mut rx = store.subscribe();

    let batch = store.remove(RecordId::new("shape:ghost"), ChangeOrigin::Remote);

    assert!(batch.is_empty());
    assert!(rx.try_recv().is_err());
}

#[test]
fn last_writer_wins_on_overwrite() {
    let store = ChangeStore::new();
    store.put(shape("shape:a", 1), ChangeOrigin::User);
    store.put(shape("shape:a", 9), ChangeOrigin::Remote);

    let current = store.get(&RecordId::new("shape:a")).expect("record");
    assert_eq!(current.data["x"], 9);
}

#[test]
fn dropped_subscriber_does_not_block_later_applies() {
    let store = ChangeStore::new();
    let rx = store.subscribe();
    drop(rx);

    store.put(shape("shape:a", 1), ChangeOrigin::User);

    let mut live = store.subscribe();
    store.put(shape("shape:b", 1), ChangeOrigin::User);
    let batch = live.try_recv().expect("live subscriber still notified");
    assert!(batch.added.contains_key(&RecordId::new("shape:b")));
}

#[test]
fn every_subscriber_gets_every_batch() {
    let store = ChangeStore::new();
    let mut first = store.subscribe();
    let mut second = store.subscribe();

    store.put(shape("shape:a", 1), ChangeOrigin::User);

    assert!(first.try_recv().is_ok());
    assert!(second.try_recv().is_ok());
}

#[test]
fn records_of_filters_by_kind() {
    let store = ChangeStore::new();
    store.apply(
        vec![
            Record::page(1, "Page 1"),
            shape("shape:a", 1),
            shape("shape:b", 2),
            Record::new(RecordId::new("binding:x"), json!({"parentId": "page:1"})),
        ],
        Vec::new(),
        ChangeOrigin::Remote,
    );

    assert_eq!(store.records_of(RecordKind::Page).len(), 1);
    assert_eq!(store.records_of(RecordKind::Shape).len(), 2);
    assert_eq!(store.records_of(RecordKind::Binding).len(), 1);
    assert!(store.records_of(RecordKind::InstancePresence).is_empty());
}

#[test]
fn records_of_returns_ids_in_stable_order() {
    let store = ChangeStore::new();
    store.apply(
        vec![shape("shape:c", 3), shape("shape:a", 1), shape("shape:b", 2)],
        Vec::new(),
        ChangeOrigin::User,
    );

    let ids: Vec<String> = store
        .records_of(RecordKind::Shape)
        .into_iter()
        .map(|r| r.id.as_str().to_owned())
        .collect();
    assert_eq!(ids, vec!["shape:a", "shape:b", "shape:c"]);
}

#[test]
fn empty_apply_notifies_nobody() {
    let store = ChangeStore::new();
    let mut rx = store.subscribe();

    let batch = store.apply(Vec::new(), Vec::new(), ChangeOrigin::User);

    assert!(batch.is_empty());
    assert!(rx.try_recv().is_err());
}
