use std::time::Duration;

use file_converter::store::{FileStore, StoreError};

#[tokio::test]
async fn test_file_store_create_and_read() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path()).unwrap();

    let path = store.create("abc_report.pdf", b"%PDF-1.4").await.unwrap();
    assert_eq!(path, dir.path().join("abc_report.pdf"));
    assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");
}

#[tokio::test]
async fn test_file_store_create_never_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path()).unwrap();

    store.create("key", b"first").await.unwrap();
    let result = store.create("key", b"second").await;
    assert!(matches!(result, Err(StoreError::AlreadyExists(_))));

    let path = store.resolve("key").unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"first");
}

#[tokio::test]
async fn test_file_store_rejects_escaping_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("uploads")).unwrap();

    for name in ["../outside", "/etc/passwd", "a/b", "..", ""] {
        assert!(
            matches!(store.create(name, b"x").await, Err(StoreError::Naming(_))),
            "{name:?} should be rejected"
        );
    }
    assert!(!dir.path().join("outside").exists());
}

#[tokio::test]
async fn test_file_store_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path()).unwrap();

    store.create("to-delete", b"data").await.unwrap();
    assert!(store.exists("to-delete").await.unwrap());

    assert!(store.delete("to-delete").await.unwrap());
    assert!(!store.exists("to-delete").await.unwrap());

    // Deleting a missing file is not an error
    assert!(!store.delete("to-delete").await.unwrap());
}

#[tokio::test]
async fn test_file_store_claim_is_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path()).unwrap();
    store.create("out_photo.png", b"png").await.unwrap();

    let claimed = store.claim("out_photo.png").await.unwrap().expect("first claim wins");
    assert!(store.claim("out_photo.png").await.unwrap().is_none());
    assert!(!store.exists("out_photo.png").await.unwrap());
    assert_eq!(std::fs::read(&claimed).unwrap(), b"png");

    store.unclaim(&claimed, "out_photo.png").await.unwrap();
    assert!(store.exists("out_photo.png").await.unwrap());
}

#[tokio::test]
async fn test_file_store_import_moves_source() {
    let dir = tempfile::tempdir().unwrap();
    let uploads = FileStore::new(dir.path().join("uploads")).unwrap();
    let outputs = FileStore::new(dir.path().join("outputs")).unwrap();

    let raw = uploads.create("raw.png", b"converted").await.unwrap();
    let staged = outputs.import(&raw, "staged.png").await.unwrap();

    assert!(!raw.exists());
    assert_eq!(std::fs::read(staged).unwrap(), b"converted");

    let other = uploads.create("raw2.png", b"again").await.unwrap();
    assert!(matches!(
        outputs.import(&other, "staged.png").await,
        Err(StoreError::AlreadyExists(_))
    ));
    assert!(other.exists());
    let staged = outputs.resolve("staged.png").unwrap();
    assert_eq!(std::fs::read(staged).unwrap(), b"converted");
}

#[tokio::test]
async fn test_file_store_import_refuses_target_created_by_another_writer() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("outputs")).unwrap();
    let source = dir.path().join("raw.png");
    std::fs::write(&source, b"mine").unwrap();

    // Written behind the store's back, as a racing writer would
    std::fs::write(store.root().join("taken.png"), b"theirs").unwrap();

    assert!(matches!(
        store.import(&source, "taken.png").await,
        Err(StoreError::AlreadyExists(_))
    ));
    assert_eq!(std::fs::read(store.root().join("taken.png")).unwrap(), b"theirs");
    assert_eq!(std::fs::read(&source).unwrap(), b"mine");
}

#[tokio::test]
async fn test_file_store_exists_reports_io_errors() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("uploads");
    let store = FileStore::new(&root).unwrap();
    assert!(!store.exists("missing.txt").await.unwrap());

    // The root is no longer a directory, so the lookup itself fails
    std::fs::remove_dir(&root).unwrap();
    std::fs::write(&root, b"not a directory").unwrap();

    assert!(matches!(
        store.exists("missing.txt").await,
        Err(StoreError::Io(_))
    ));
}

#[tokio::test]
async fn test_file_store_list_reports_modification_time() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path()).unwrap();
    store.create("old", b"1").await.unwrap();
    store.create("new", b"2").await.unwrap();
    std::fs::create_dir(dir.path().join("subdir")).unwrap();

    let old = filetime::FileTime::from_system_time(
        std::time::SystemTime::now() - Duration::from_secs(7200),
    );
    filetime::set_file_mtime(dir.path().join("old"), old).unwrap();

    let mut objects = store.list().await.unwrap();
    objects.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(objects.len(), 2);
    assert_eq!(objects[0].name, "new");
    assert_eq!(objects[1].name, "old");
    assert!(objects[0].modified - objects[1].modified > chrono::Duration::seconds(7000));
}
