use std::collections::HashSet;
use std::path::Path;

use file_converter::naming::{
    converted_display_name, display_name, resolve, sanitize, store_name, NamingError,
};

#[test]
fn test_store_name_round_trips_display_name() {
    let name = store_name("holiday photo.jpg");
    assert_eq!(display_name(&name), "holiday_photo.jpg");
    assert!(!name.contains('/'));
    assert!(!name.contains(".."));
}

#[test]
fn test_store_names_are_unique() {
    let names: HashSet<String> = (0..1000).map(|_| store_name("same.png")).collect();
    assert_eq!(names.len(), 1000);
}

#[test]
fn test_store_name_of_hostile_input_is_flat() {
    for original in ["../../etc/passwd", "C:\\Windows\\win.ini", "/abs/path.txt", "..", "\0"] {
        let name = store_name(original);
        assert!(resolve(Path::new("/srv/uploads"), &name).is_ok(), "{name}");
    }
}

#[test]
fn test_display_name_without_token_is_unchanged() {
    assert_eq!(display_name("plain_name.txt"), "plain_name.txt");
    assert_eq!(display_name("noseparator"), "noseparator");
}

#[test]
fn test_converted_display_name() {
    assert_eq!(converted_display_name("photo.jpg", ".png"), "photo.png");
    assert_eq!(converted_display_name("my.report.pdf", ".docx"), "my.report.docx");
    assert_eq!(converted_display_name("README", ".pdf"), "README.pdf");
}

#[test]
fn test_resolve_stays_inside_root() {
    let root = Path::new("/srv/uploads");
    let path = resolve(root, "abc_photo.jpg").unwrap();
    assert_eq!(path, root.join("abc_photo.jpg"));
}

#[test]
fn test_resolve_rejects_traversal_and_absolute_forms() {
    let root = Path::new("/srv/uploads");
    for name in [
        "../secret",
        "../../etc/passwd",
        "..",
        ".",
        "",
        "/etc/passwd",
        "sub/file.txt",
        "..\\windows",
        "C:\\boot.ini",
        "C:boot.ini",
        "nul\0byte",
    ] {
        assert_eq!(
            resolve(root, name),
            Err(NamingError::InvalidName(name.to_string())),
            "{name:?} should be rejected"
        );
    }
}

#[test]
fn test_sanitize_keeps_safe_names() {
    assert_eq!(sanitize("report-2024_final.pdf"), "report-2024_final.pdf");
    assert_eq!(sanitize(".hidden"), "hidden");
}
