use futures::executor::block_on;
use keepsake::memory::Failure;
use keepsake::{Document, DocumentStore, Filter, MemoryStore, StoreError, UpdateOutcome};
use serde_json::json;

fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().unwrap()
}

#[test]
fn test_get_missing_document() {
    let store = MemoryStore::new();
    assert!(block_on(store.get("progress", "device")).unwrap().is_none());
}

#[test]
fn test_merge_set_preserves_other_fields() {
    let store = MemoryStore::new();
    block_on(store.set(
        "progress",
        "device",
        doc(json!({"replies": {"1": "hello"}, "lastOpenAt": 5})),
        false,
    ))
    .unwrap();
    block_on(store.set(
        "progress",
        "device",
        doc(json!({"unlockedDays": [1, 2], "lastOpenAt": 10})),
        true,
    ))
    .unwrap();

    let stored = block_on(store.get("progress", "device")).unwrap().unwrap();
    assert_eq!(
        serde_json::Value::Object(stored),
        json!({"replies": {"1": "hello"}, "unlockedDays": [1, 2], "lastOpenAt": 10})
    );
}

#[test]
fn test_plain_set_replaces_document() {
    let store = MemoryStore::new();
    block_on(store.set("progress", "device", doc(json!({"a": 1})), false)).unwrap();
    block_on(store.set("progress", "device", doc(json!({"b": 2})), false)).unwrap();
    assert_eq!(
        store.document("progress", "device"),
        Some(doc(json!({"b": 2})))
    );
}

#[test]
fn test_update_uses_dotted_paths_and_never_creates() {
    let store = MemoryStore::new();
    let outcome =
        block_on(store.update("progress", "device", doc(json!({"replies.4": "hi"})))).unwrap();
    assert_eq!(outcome, UpdateOutcome::Missing);
    assert_eq!(store.count("progress"), 0);

    store.put_document("progress", "device", doc(json!({"replies": {"1": "one"}})));
    let outcome =
        block_on(store.update("progress", "device", doc(json!({"replies.4": "four"})))).unwrap();
    assert_eq!(outcome, UpdateOutcome::Updated);
    assert_eq!(
        store.document("progress", "device"),
        Some(doc(json!({"replies": {"1": "one", "4": "four"}})))
    );
}

#[test]
fn test_add_and_query() {
    let store = MemoryStore::new();
    let first = block_on(store.add("gifts", doc(json!({"deviceId": "a", "boxNumber": 1})))).unwrap();
    let second =
        block_on(store.add("gifts", doc(json!({"deviceId": "b", "boxNumber": 2})))).unwrap();
    assert_ne!(first, second);

    let found = block_on(store.query("gifts", &Filter::field_equals("deviceId", "b"))).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0, second);

    let none = block_on(store.query("other", &Filter::field_equals("deviceId", "b"))).unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_injected_failures() {
    let store = MemoryStore::new();
    store.set_failure(Some(Failure::Unavailable));
    assert!(matches!(
        block_on(store.get("progress", "device")),
        Err(StoreError::Unavailable(_))
    ));

    store.set_failure(Some(Failure::PermissionDenied));
    assert!(matches!(
        block_on(store.query("gifts", &Filter::field_equals("deviceId", "a"))),
        Err(StoreError::PermissionDenied)
    ));

    store.set_failure(None);
    assert!(block_on(store.get("progress", "device")).is_ok());
}
