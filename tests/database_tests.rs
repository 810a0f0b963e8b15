//! Database Tests
//!
//! Lazy scanning, handle lifecycle, cascade deletion, and property
//! access against real temporary directory trees.

use std::fs;

use tempfile::{tempdir, TempDir};

use mtpd::database::{Database, ObjectDb, PropValue};
use mtpd::protocol::consts::{format, property, response, PARENT_ROOT};

const SID: u32 = 0x0001_0001;

/// `/media` with two top-level children: a.txt (5 bytes) and b/
fn card_fixture() -> (TempDir, ObjectDb) {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"hello").unwrap();
    fs::create_dir(dir.path().join("b")).unwrap();

    let mut db = ObjectDb::new();
    db.add_storage_path(dir.path(), "card", SID, true);
    (dir, db)
}

// =============================================================================
// Storage Ingestion
// =============================================================================

#[test]
fn test_hidden_root_exposes_children_at_top_level() {
    let (_dir, mut db) = card_fixture();

    // Handle 1 is the parked root; its children list at the storage root.
    let handles = db.list(SID, 0, PARENT_ROOT);
    assert_eq!(handles, vec![2, 3]);

    // Scan order is name order: a.txt before b
    assert_eq!(
        db.get_prop(2, property::OBJECT_FILE_NAME).unwrap(),
        PropValue::Text("a.txt".into())
    );
    assert_eq!(
        db.get_prop(3, property::OBJECT_FORMAT).unwrap(),
        PropValue::U16(format::ASSOCIATION)
    );
}

#[test]
fn test_visible_root_is_the_single_top_level_entry() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"x").unwrap();

    let mut db = ObjectDb::new();
    db.add_storage_path(dir.path(), "card", SID, false);

    let top = db.list(SID, 0, PARENT_ROOT);
    assert_eq!(top, vec![1]);
    assert_eq!(
        db.get_prop(1, property::OBJECT_FILE_NAME).unwrap(),
        PropValue::Text("card".into())
    );
    // The child hangs off the named root folder
    assert_eq!(db.list(SID, 0, 1).len(), 1);
}

#[test]
fn test_missing_storage_path_ingests_nothing() {
    let mut db = ObjectDb::new();
    db.add_storage_path(std::path::Path::new("/definitely/not/here"), "x", SID, true);
    assert!(db.is_empty());
    assert!(db.list(SID, 0, PARENT_ROOT).is_empty());
}

#[test]
fn test_remove_storage_purges_records() {
    let (_dir, mut db) = card_fixture();
    assert!(!db.is_empty());
    db.remove_storage(SID);
    assert!(db.is_empty());
    // Handles stay burned even after the purge
    assert!(db.next_handle() > 3);
}

// =============================================================================
// Lazy Scanning
// =============================================================================

#[test]
fn test_directory_scans_on_first_listing_only() {
    let (dir, mut db) = card_fixture();

    // Populate b/ after ingestion; the lazy scan must still see it.
    fs::write(dir.path().join("b").join("c.txt"), b"xyz").unwrap();
    let children = db.list(SID, 0, 3);
    assert_eq!(children.len(), 1);
    let child = children[0];

    // Later listings answer from memory: removing the file on disk does
    // not change the answer.
    fs::remove_file(dir.path().join("b").join("c.txt")).unwrap();
    assert_eq!(db.list(SID, 0, 3), vec![child]);
    assert_eq!(
        db.get_prop(child, property::OBJECT_SIZE).unwrap(),
        PropValue::U32(3)
    );
}

#[test]
fn test_list_filters_by_format_and_wildcards() {
    let (_dir, mut db) = card_fixture();

    assert_eq!(db.list(SID, format::ASSOCIATION, PARENT_ROOT), vec![3]);
    assert_eq!(db.list(SID, format::PNG, PARENT_ROOT), Vec::<u32>::new());
    // 0xFFFFFFFF storage matches every storage
    assert_eq!(db.list(PARENT_ROOT, 0, PARENT_ROOT), vec![2, 3]);
    assert_eq!(db.count(SID, 0, PARENT_ROOT), 2);
}

// =============================================================================
// Handles
// =============================================================================

#[test]
fn test_handle_validity_and_monotonicity() {
    let (_dir, mut db) = card_fixture();

    assert!(!db.is_valid(0));
    assert!(db.is_valid(1));
    assert!(db.is_valid(3));
    assert!(!db.is_valid(4));

    let before = db.next_handle();
    db.delete(3).unwrap();
    // Deletion never frees handles for reuse
    let handle = db
        .begin_send(_dir.path().join("new.bin").as_path(), format::UNDEFINED, 0, SID, 1, 0)
        .unwrap();
    assert!(handle >= before);
    assert!(db.next_handle() > before);
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn test_property_values() {
    let (_dir, db) = {
        let (d, mut db) = card_fixture();
        db.list(SID, 0, PARENT_ROOT);
        (d, db)
    };

    assert_eq!(db.get_prop(2, property::STORAGE_ID).unwrap(), PropValue::U32(SID));
    assert_eq!(db.get_prop(2, property::PARENT_OBJECT).unwrap(), PropValue::U32(0));
    assert_eq!(db.get_prop(2, property::OBJECT_SIZE).unwrap(), PropValue::U32(5));
    assert_eq!(db.get_prop(2, property::PERSISTENT_UID).unwrap(), PropValue::U128(2));
    assert_eq!(db.get_prop(2, property::PROTECTION_STATUS).unwrap(), PropValue::U16(0));
    assert_eq!(db.get_prop(2, property::NON_CONSUMABLE).unwrap(), PropValue::U16(1));
    assert_eq!(db.get_prop(3, property::NON_CONSUMABLE).unwrap(), PropValue::U16(0));
    assert_eq!(
        db.get_prop(3, property::ASSOCIATION_TYPE).unwrap(),
        PropValue::U16(0x0001)
    );
    assert_eq!(
        db.get_prop(2, property::DATE_CREATED).unwrap(),
        PropValue::Text("19700101T000000".into())
    );

    assert_eq!(
        db.get_prop(99, property::OBJECT_SIZE),
        Err(response::INVALID_OBJECT_HANDLE)
    );
    assert_eq!(
        db.get_prop(0, property::OBJECT_SIZE),
        Err(response::INVALID_OBJECT_HANDLE)
    );
}

#[test]
fn test_rename_updates_disk_and_record() {
    let (dir, mut db) = card_fixture();

    db.set_prop(2, property::OBJECT_FILE_NAME, PropValue::Text("renamed.txt".into()))
        .unwrap();

    assert!(dir.path().join("renamed.txt").exists());
    assert!(!dir.path().join("a.txt").exists());
    let (path, _, _) = db.get_file_path(2).unwrap();
    assert!(path.ends_with("renamed.txt"));
    assert_eq!(
        db.get_prop(2, property::OBJECT_FILE_NAME).unwrap(),
        PropValue::Text("renamed.txt".into())
    );
}

#[test]
fn test_rename_failure_reports_device_busy() {
    let (dir, mut db) = card_fixture();
    fs::remove_file(dir.path().join("a.txt")).unwrap();

    assert_eq!(
        db.set_prop(2, property::OBJECT_FILE_NAME, PropValue::Text("x".into())),
        Err(response::DEVICE_BUSY)
    );
}

#[test]
fn test_reparent_is_record_only() {
    let (dir, mut db) = card_fixture();

    db.set_prop(2, property::PARENT_OBJECT, PropValue::U32(3)).unwrap();
    assert_eq!(db.get_prop(2, property::PARENT_OBJECT).unwrap(), PropValue::U32(3));
    // The file itself has not moved
    assert!(dir.path().join("a.txt").exists());

    assert_eq!(
        db.set_prop(2, property::OBJECT_SIZE, PropValue::U32(0)),
        Err(response::OPERATION_NOT_SUPPORTED)
    );
}

// =============================================================================
// Property Lists
// =============================================================================

#[test]
fn test_prop_list_selectors() {
    let (_dir, mut db) = card_fixture();

    assert_eq!(
        db.get_prop_list(2, 0, 0, 1, 0),
        Err(response::SPECIFICATION_BY_GROUP_UNSUPPORTED)
    );
    assert_eq!(
        db.get_prop_list(2, 0, 0xFFFF_FFFF, 0, 2),
        Err(response::SPECIFICATION_BY_DEPTH_UNSUPPORTED)
    );
    assert_eq!(
        db.get_prop_list(2, 0, 0, 0, 0),
        Err(response::PARAMETER_NOT_SUPPORTED)
    );
    assert_eq!(
        db.get_prop_list(0, 0, 0xFFFF_FFFF, 0, 0),
        Err(response::INVALID_OBJECT_HANDLE)
    );
}

#[test]
fn test_prop_list_single_object_all_properties() {
    let (_dir, mut db) = card_fixture();

    let rows = db.get_prop_list(2, 0, 0xFFFF_FFFF, 0, 0).unwrap();
    assert_eq!(rows.len(), 14);
    assert!(rows.iter().all(|(handle, _, _)| *handle == 2));
    assert!(rows
        .iter()
        .any(|(_, code, value)| *code == property::PERSISTENT_UID
            && *value == PropValue::U128(2)));
}

#[test]
fn test_prop_list_depth_one_lists_children() {
    let (_dir, mut db) = card_fixture();

    // Depth 1 on the storage root (handle 0) covers the two children.
    let rows = db.get_prop_list(0, 0, property::OBJECT_FILE_NAME as u32, 0, 1).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].1, property::OBJECT_FILE_NAME);

    // Depth 1 on an unscanned folder triggers its scan.
    let rows = db.get_prop_list(3, 0, 0xFFFF_FFFF, 0, 1).unwrap();
    assert!(rows.is_empty()); // b/ has no children
}

#[test]
fn test_prop_list_unknown_property() {
    let (_dir, mut db) = card_fixture();
    assert_eq!(
        db.get_prop_list(2, 0, 0x9999, 0, 0),
        Err(response::OBJECT_PROP_NOT_SUPPORTED)
    );
}

// =============================================================================
// Send Lifecycle
// =============================================================================

#[test]
fn test_begin_send_reserves_and_end_send_commits() {
    let (dir, mut db) = card_fixture();
    let target = dir.path().join("incoming.bin");

    let handle = db
        .begin_send(&target, format::UNDEFINED, 0, SID, 3, 0)
        .unwrap();
    assert!(db.is_valid(handle));
    assert_eq!(db.get_prop(handle, property::OBJECT_SIZE).unwrap(), PropValue::U32(3));

    // Success restats the real size from disk
    fs::write(&target, b"full contents").unwrap();
    db.end_send(handle, format::UNDEFINED, true);
    assert_eq!(
        db.get_prop(handle, property::OBJECT_SIZE).unwrap(),
        PropValue::U32(13)
    );
}

#[test]
fn test_end_send_failure_drops_the_reservation() {
    let (dir, mut db) = card_fixture();
    let handle = db
        .begin_send(&dir.path().join("x.bin"), format::UNDEFINED, 0, SID, 9, 0)
        .unwrap();

    db.end_send(handle, format::UNDEFINED, false);
    assert_eq!(
        db.get_prop(handle, property::OBJECT_SIZE),
        Err(response::INVALID_OBJECT_HANDLE)
    );
}

#[test]
fn test_begin_send_rejects_fixed_ram_root() {
    let dir = tempdir().unwrap();
    let mut db = ObjectDb::new();
    // Storage id 0x0003 is the fixed-RAM sentinel: no root-level sends.
    assert!(db
        .begin_send(&dir.path().join("x"), format::UNDEFINED, 0, 0x0003, 1, 0)
        .is_none());
    assert!(db
        .begin_send(&dir.path().join("x"), format::UNDEFINED, 7, 0x0003, 1, 0)
        .is_some());
}

// =============================================================================
// Deletion
// =============================================================================

#[test]
fn test_delete_cascades_through_descendants() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("d")).unwrap();
    fs::write(dir.path().join("d").join("e.txt"), b"e").unwrap();
    fs::create_dir(dir.path().join("d").join("f")).unwrap();
    fs::write(dir.path().join("d").join("f").join("g.txt"), b"g").unwrap();

    let mut db = ObjectDb::new();
    db.add_storage_path(dir.path(), "card", SID, true);

    let d = db.list(SID, 0, PARENT_ROOT)[0];
    let d_children = db.list(SID, 0, d);
    assert_eq!(d_children.len(), 2);
    let f = *d_children
        .iter()
        .find(|h| {
            db.get_prop(**h, property::OBJECT_FORMAT).unwrap()
                == PropValue::U16(format::ASSOCIATION)
        })
        .unwrap();
    let g = db.list(SID, 0, f)[0];

    db.delete(d).unwrap();

    for handle in [d, f, g] {
        assert_eq!(
            db.get_prop(handle, property::OBJECT_SIZE),
            Err(response::INVALID_OBJECT_HANDLE)
        );
    }
    assert_eq!(db.count(SID, 0, d), 0);
    assert_eq!(db.count(SID, 0, PARENT_ROOT), 0);
}

#[test]
fn test_delete_guards() {
    let (_dir, mut db) = card_fixture();
    assert_eq!(db.delete(0), Err(response::INVALID_OBJECT_HANDLE));
    assert_eq!(db.delete(PARENT_ROOT), Err(response::INVALID_OBJECT_HANDLE));
    assert_eq!(db.delete(99), Err(response::INVALID_OBJECT_HANDLE));
}

// =============================================================================
// Moves & References
// =============================================================================

#[test]
fn test_move_object_reparents() {
    let (_dir, mut db) = card_fixture();
    db.move_object(2, 3).unwrap();
    assert_eq!(db.list(SID, 0, 3), vec![2]);
    assert_eq!(db.move_object(42, 3), Err(response::INVALID_OBJECT_HANDLE));
}

#[test]
fn test_references_are_the_children() {
    let (dir, mut db) = card_fixture();
    fs::write(dir.path().join("b").join("c.txt"), b"c").unwrap();

    let refs = db.references(3).unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(
        db.get_prop(refs[0], property::OBJECT_FILE_NAME).unwrap(),
        PropValue::Text("c.txt".into())
    );

    // A file has no children
    assert!(db.references(2).unwrap().is_empty());
    // Unknown handles answer with an empty list rather than failing
    assert!(db.references(4242).unwrap().is_empty());
}

// =============================================================================
// Object Info
// =============================================================================

#[test]
fn test_object_info_dataset() {
    let (_dir, db) = {
        let (d, mut db) = card_fixture();
        db.list(SID, 0, PARENT_ROOT);
        (d, db)
    };

    let info = db.get_object_info(2).unwrap();
    assert_eq!(info.storage_id, SID);
    assert_eq!(info.format, format::UNDEFINED);
    assert_eq!(info.compressed_size, 5);
    assert_eq!(info.parent, 0);
    assert_eq!(info.association_type, 0);
    assert_eq!(info.name, "a.txt");

    let folder = db.get_object_info(3).unwrap();
    assert_eq!(folder.association_type, 0x0001);

    assert_eq!(db.get_object_info(0), Err(response::INVALID_OBJECT_HANDLE));
}
