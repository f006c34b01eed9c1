//! End-to-end store lifecycle: config file → store open → rows and yarns
//! bound to tokens → iteration with removal → bulk release → ordered close.

use skein_heap::{Heap, SystemHeap};
use skein_node::{Lifecycle, NodeId};
use skein_store::{Store, StoreConfig};
use skein_types::primitives::{Form, Token};
use skein_types::tags::{Access, Usage};
use skein_yarn::Yarn;

const MSG_FLAGS: Token = 0x1001;
const MSG_KEY: Token = 0x1002;
const DEST_FOLDER: Token = 0x1003;

/// Helper: allocate a yarn holding `text` and bind it to `token`. The
/// binding is left holding the only strong reference.
fn bind_text(store: &mut Store, token: Token, text: &str) -> NodeId {
    let mut slot = store.allocate_default_yarn().unwrap();
    let id = slot.id().unwrap();
    store
        .yarn_mut(id)
        .unwrap()
        .set(text.as_bytes(), Form::UTF8)
        .unwrap();
    store.bind_token(token, id).unwrap();
    store.release(&mut slot).unwrap();
    id
}

fn text_of(store: &Store, token: Token) -> Option<String> {
    let object = store.resolve_token(token)?;
    let yarn = object.as_yarn().ok()?;
    yarn.as_str().ok()?.map(str::to_string)
}

#[test]
fn test_bind_remove_during_iteration_then_release_all() {
    let mut store = Store::open(StoreConfig::default()).unwrap();
    bind_text(&mut store, 1, "A");
    let b = bind_text(&mut store, 2, "B");
    bind_text(&mut store, 3, "C");

    let mut visited = Vec::new();
    {
        let mut cursor = store.iterate_bindings();
        while let Some((token, _)) = cursor.next_binding() {
            if token == 2 {
                assert!(cursor.remove_current().unwrap());
            } else {
                let (_, object) = cursor.current().unwrap();
                let text = object.as_yarn().unwrap().as_str().unwrap().unwrap();
                visited.push(text.to_string());
            }
        }
    }
    visited.sort();
    assert_eq!(visited, vec!["A".to_string(), "C".to_string()]);
    assert!(store.resolve_token(2).is_none());
    assert!(!store.arena().contains(b));

    assert_eq!(store.release_all_bindings().unwrap(), 2);
    assert_eq!(store.iterate_bindings().count(), 0);
    assert!(store.arena().is_empty());
    store.close().unwrap();
}

#[test]
fn test_offline_operation_row_round_trip() {
    let heap = SystemHeap::shared();
    let mut store = Store::open_with_heap(StoreConfig::default(), heap.clone()).unwrap();

    let mut row = store.create_row().unwrap();
    let row_token: Token = 0x7700;
    store.bind_token(row_token, row.id().unwrap()).unwrap();
    store.release(&mut row).unwrap();

    store
        .set_property(row_token, MSG_FLAGS, &0x0000_0014u32.to_le_bytes(), Form::PLAIN)
        .unwrap();
    store
        .set_property(row_token, MSG_KEY, &4242u32.to_le_bytes(), Form::PLAIN)
        .unwrap();
    store
        .set_property(
            row_token,
            DEST_FOLDER,
            b"imap://user@mail.example.com/Archive",
            Form::UTF8,
        )
        .unwrap();

    // A caller-owned output buffer too small for the folder URI.
    let mut out = Yarn::new(Usage::Stack, heap.clone());
    out.set_buffer(vec![0; 12], 0, Form::PLAIN, true).unwrap();
    let readout = store.get_property(row_token, DEST_FOLDER, &mut out).unwrap();
    assert_eq!(readout.copied, 12);
    assert_eq!(readout.more, 24);
    assert_eq!(out.alias().unwrap(), b"imap://user@");

    // A heap-owned output buffer grows to fit.
    let mut grown = Yarn::new(Usage::Stack, heap.clone());
    let readout = store.get_property(row_token, DEST_FOLDER, &mut grown).unwrap();
    assert!(readout.is_complete());
    assert_eq!(
        grown.as_str().unwrap(),
        Some("imap://user@mail.example.com/Archive")
    );

    let key = store.property(row_token, MSG_KEY).unwrap().unwrap();
    assert_eq!(key.alias().unwrap(), &4242u32.to_le_bytes());

    out.close().unwrap();
    grown.close().unwrap();
    store.close().unwrap();
    assert_eq!(heap.stats().in_use, 0);
}

#[test]
fn test_store_from_config_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("skein.toml");
    std::fs::write(
        &path,
        "[registry]\nstart_slots = 8\n\n[yarn]\ninitial_capacity = 4\ngrowth = \"exact\"\n\n[heap]\nlimit_bytes = 65536\n",
    )
    .unwrap();

    let config = StoreConfig::load(path.to_str().unwrap()).unwrap();
    let mut store = Store::open(config).unwrap();
    for token in 0..100 {
        bind_text(&mut store, token, &format!("subject {token}"));
    }
    assert_eq!(text_of(&store, 42).as_deref(), Some("subject 42"));
    assert_eq!(store.heap().stats().failures, 0);

    let heap = store.heap().clone();
    store.close().unwrap();
    assert_eq!(heap.stats().in_use, 0);
}

#[test]
fn test_close_is_ordered_and_idempotent() {
    let mut store = Store::open(StoreConfig::default()).unwrap();
    let id = bind_text(&mut store, 5, "bound");
    let mut extra = store.strong(id).unwrap();
    store.release(&mut extra).unwrap();

    store.close().unwrap();
    assert_eq!(store.node().access(), Access::Shut);
    assert_eq!(store.binding_count(), 0);
    assert!(store.arena().is_empty());
    assert!(text_of(&store, 5).is_none());

    store.close().unwrap();
    assert_eq!(store.node().access(), Access::Shut);
}
