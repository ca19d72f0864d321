//! Behavior every local backend shares, exercised through a connected mount.

use mountstore::models::{ItemId, ItemKind, Property, PropertyId, PropertyValue, system};
use mountstore::{BackendKind, ErrorKind, Mount, MountConfig, connect};
use std::io::Read;
use tempfile::TempDir;
use test_case::test_case;

fn id(path: &str) -> ItemId {
    ItemId::parse(path).unwrap()
}

fn mount(backend: BackendKind) -> (TempDir, Mount) {
    let dir = tempfile::tempdir().unwrap();
    let location = match backend {
        BackendKind::Sqlite => dir.path().join("objects.db"),
        _ => dir.path().join("repo"),
    };
    let config = MountConfig::new("contract", backend, location.display().to_string());
    let mount = connect(&config).unwrap();
    (dir, mount)
}

fn read_all(mount: &Mount, item: &ItemId) -> Vec<u8> {
    let mut content = Vec::new();
    mount
        .data()
        .read(item)
        .unwrap()
        .read_to_end(&mut content)
        .unwrap();
    content
}

fn sorted_children(mount: &Mount, item: &ItemId) -> Vec<String> {
    let mut children: Vec<String> = mount
        .data()
        .children(item)
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();
    children.sort();
    children
}

#[test_case(BackendKind::Sqlite ; "sqlite")]
#[test_case(BackendKind::Git ; "git")]
fn test_write_then_read(backend: BackendKind) {
    let (_dir, mount) = mount(backend);
    let data = mount.data();
    data.create_collection(&id("/docs")).unwrap();
    data.write(&id("/docs/a.txt"), &mut "first".as_bytes()).unwrap();
    data.write(&id("/docs/a.txt"), &mut "second".as_bytes()).unwrap();

    assert_eq!(read_all(&mount, &id("/docs/a.txt")), b"second");
    assert_eq!(data.kind(&id("/docs")).unwrap(), ItemKind::Collection);
    assert_eq!(data.kind(&id("/docs/a.txt")).unwrap(), ItemKind::Leaf);
    assert!(data.exists(&id("/docs/a.txt")).unwrap());
    assert!(!data.exists(&id("/docs/b.txt")).unwrap());
}

#[test_case(BackendKind::Sqlite ; "sqlite")]
#[test_case(BackendKind::Git ; "git")]
fn test_missing_items_are_reported_uniformly(backend: BackendKind) {
    let (_dir, mount) = mount(backend);
    let data = mount.data();

    let err = data.read(&id("/nope.txt")).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::ItemNotFound);
    let err = data.delete(&id("/nope.txt")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ItemNotFound);
    let err = data.create_collection(&id("/missing/child")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ItemNotFound);
    let err = mount.metadata().retrieve(&id("/nope.txt"), &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ItemNotFound);
}

#[test_case(BackendKind::Sqlite ; "sqlite")]
#[test_case(BackendKind::Git ; "git")]
fn test_move_and_copy_subtrees(backend: BackendKind) {
    let (_dir, mount) = mount(backend);
    let data = mount.data();
    data.create_collection(&id("/a")).unwrap();
    data.write(&id("/a/one.txt"), &mut "1".as_bytes()).unwrap();
    data.write(&id("/a/two.txt"), &mut "2".as_bytes()).unwrap();

    data.copy_item(&id("/a"), &id("/b")).unwrap();
    data.move_item(&id("/a"), &id("/c")).unwrap();

    assert!(!data.exists(&id("/a")).unwrap());
    assert_eq!(sorted_children(&mount, &id("/b")), ["/b/one.txt", "/b/two.txt"]);
    assert_eq!(sorted_children(&mount, &id("/c")), ["/c/one.txt", "/c/two.txt"]);
    assert_eq!(read_all(&mount, &id("/b/two.txt")), b"2");

    data.delete(&id("/b")).unwrap();
    assert!(!data.exists(&id("/b/one.txt")).unwrap());
    assert_eq!(sorted_children(&mount, &ItemId::root()), ["/c"]);
}

#[test_case(BackendKind::Sqlite ; "sqlite")]
#[test_case(BackendKind::Git ; "git")]
fn test_subtrees_differing_only_in_case_stay_apart(backend: BackendKind) {
    let (_dir, mount) = mount(backend);
    let data = mount.data();
    data.create_collection(&id("/a")).unwrap();
    data.write(&id("/a/keep.txt"), &mut "keep".as_bytes()).unwrap();
    data.create_collection(&id("/A")).unwrap();

    data.move_item(&id("/A"), &id("/Z")).unwrap();
    assert!(data.exists(&id("/a/keep.txt")).unwrap());
    assert!(!data.exists(&id("/Z/keep.txt")).unwrap());

    data.delete(&id("/Z")).unwrap();
    assert_eq!(read_all(&mount, &id("/a/keep.txt")), b"keep");
    assert_eq!(sorted_children(&mount, &ItemId::root()), ["/a"]);
}

#[test_case(BackendKind::Sqlite ; "sqlite")]
#[test_case(BackendKind::Git ; "git")]
fn test_links_resolve_to_their_target(backend: BackendKind) {
    let (_dir, mount) = mount(backend);
    let data = mount.data();
    data.create_collection(&id("/docs")).unwrap();
    data.write(&id("/docs/a.txt"), &mut "x".as_bytes()).unwrap();
    data.create_link(&id("/latest"), &id("/docs/a.txt")).unwrap();

    assert_eq!(data.kind(&id("/latest")).unwrap(), ItemKind::Link);
    assert_eq!(data.link_target(&id("/latest")).unwrap(), Some(id("/docs/a.txt")));
    assert_eq!(data.link_target(&id("/docs/a.txt")).unwrap(), None);
}

#[test_case(BackendKind::Sqlite ; "sqlite")]
#[test_case(BackendKind::Git ; "git")]
fn test_properties_survive_a_round_trip(backend: BackendKind) {
    let (_dir, mount) = mount(backend);
    let item = id("/report.txt");
    mount.data().write(&item, &mut "hello".as_bytes()).unwrap();

    let metadata = mount.metadata();
    metadata
        .update(
            &item,
            &[
                Property::new("status", PropertyValue::from("draft")),
                Property::new("pages", PropertyValue::Integer(12)),
                Property::new("reviewed", PropertyValue::Boolean(false)),
            ],
        )
        .unwrap();

    let set = metadata.retrieve(&item, &[]).unwrap();
    assert_eq!(set.value("status"), Some(&PropertyValue::from("draft")));
    assert_eq!(set.value("pages"), Some(&PropertyValue::Integer(12)));
    assert_eq!(set.value("reviewed"), Some(&PropertyValue::Boolean(false)));
    assert_eq!(
        set.value(system::SIZE),
        Some(&PropertyValue::Integer(5))
    );

    metadata.delete(&item, &[PropertyId::new("pages")]).unwrap();
    let set = metadata.retrieve(&item, &[PropertyId::new("pages")]).unwrap();
    assert!(!set.contains("pages"));
}

#[test_case(BackendKind::Sqlite ; "sqlite")]
#[test_case(BackendKind::Git ; "git")]
fn test_disconnected_mount_refuses_operations(backend: BackendKind) {
    let (_dir, mount) = mount(backend);
    mount.data().write(&id("/a.txt"), &mut "x".as_bytes()).unwrap();
    mount.disconnect();

    let err = mount.data().exists(&id("/a.txt")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(mount.status().closed);
}

#[test_case(BackendKind::Sqlite ; "sqlite")]
#[test_case(BackendKind::Git ; "git")]
fn test_basic_round_trip_scenario(backend: BackendKind) {
    let (_dir, mount) = mount(backend);
    let item = id("/a/b.txt");
    mount.data().create_collection(&id("/a")).unwrap();
    mount.data().write(&item, &mut "".as_bytes()).unwrap();

    let metadata = mount.metadata();
    metadata
        .update(
            &item,
            &[
                Property::new("size", PropertyValue::Integer(0)),
                Property::new("format", PropertyValue::from("TEXT")),
            ],
        )
        .unwrap();

    let all = metadata.retrieve(&item, &[]).unwrap();
    assert_eq!(all.value("size"), Some(&PropertyValue::Integer(0)));
    assert_eq!(all.value("format"), Some(&PropertyValue::from("TEXT")));

    let selection = [PropertyId::new("format"), PropertyId::new("unknown")];
    let first = metadata.retrieve(&item, &selection).unwrap();
    let second = metadata.retrieve(&item, &selection).unwrap();
    assert_eq!(first, second);
    assert!(!first.contains("unknown"));

    metadata.delete(&item, &[PropertyId::new("size")]).unwrap();
    let after = metadata.retrieve(&item, &[]).unwrap();
    assert!(!after.contains("size"));
    assert!(after.contains("format"));
}
