use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use comic_shelf::domain::DownloadListEntry;
use comic_shelf::download_list::{AddOutcome, DownloadList};
use comic_shelf::error::ShelfError;

fn temp_path(temp: &tempfile::TempDir, name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().join(name)).unwrap()
}

#[test]
fn first_add_creates_the_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp_path(&temp, "queue.json");
    let list = DownloadList::new(path.clone());
    assert!(list.entries().unwrap().is_empty());

    let outcome = list
        .add_entry("42", "Answer", &["sci-fi".to_string()])
        .unwrap();
    assert_eq!(outcome, AddOutcome::Added);

    let content = fs::read_to_string(&path).unwrap();
    let entries: Vec<DownloadListEntry> = serde_json::from_str(&content).unwrap();
    assert_eq!(
        entries,
        vec![DownloadListEntry {
            id: "42".to_string(),
            title: "Answer".to_string(),
            tags: vec!["sci-fi".to_string()],
        }]
    );
}

#[test]
fn adding_twice_is_idempotent() {
    let temp = tempfile::tempdir().unwrap();
    let list = DownloadList::new(temp_path(&temp, "queue.json"));

    assert_eq!(list.add_entry("1", "One", &[]).unwrap(), AddOutcome::Added);
    assert_eq!(list.add_entry("2", "Two", &[]).unwrap(), AddOutcome::Added);
    assert_eq!(
        list.add_entry("1", "One again", &[]).unwrap(),
        AddOutcome::AlreadyPresent
    );

    let entries = list.entries().unwrap();
    let ids: Vec<&str> = entries.iter().map(|entry| entry.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert_eq!(entries[0].title, "One");
}

#[test]
fn numeric_ids_in_existing_lists_are_recognised() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp_path(&temp, "legacy.json");
    fs::write(&path, r#"[{"id": 7, "title": "Seven", "tags": []}]"#).unwrap();
    let list = DownloadList::new(path);

    assert_eq!(
        list.add_entry("7", "Seven", &[]).unwrap(),
        AddOutcome::AlreadyPresent
    );
}

#[test]
fn switching_to_missing_file_keeps_active_list() {
    let temp = tempfile::tempdir().unwrap();
    let original = temp_path(&temp, "queue.json");
    let mut list = DownloadList::new(original.clone());

    let missing = temp_path(&temp, "missing.json");
    assert_matches!(
        list.switch_list(missing.clone()),
        Err(ShelfError::ListNotFound(path)) if path == missing
    );
    assert_eq!(list.active_path(), original);
}

#[test]
fn switching_to_existing_file_changes_target() {
    let temp = tempfile::tempdir().unwrap();
    let other = temp_path(&temp, "other.json");
    fs::write(&other, "[]").unwrap();
    let mut list = DownloadList::new(temp_path(&temp, "queue.json"));

    assert_eq!(list.switch_list(other.clone()).unwrap(), other);
    list.add_entry("9", "Nine", &[]).unwrap();
    assert!(fs::read_to_string(&other).unwrap().contains("\"Nine\""));
    assert!(!temp.path().join("queue.json").exists());
}

#[test]
fn malformed_list_is_not_overwritten() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp_path(&temp, "broken.json");
    fs::write(&path, "{ not a list").unwrap();
    let list = DownloadList::new(path.clone());

    assert_matches!(
        list.add_entry("1", "One", &[]),
        Err(ShelfError::ListParse { .. })
    );
    assert_eq!(fs::read_to_string(&path).unwrap(), "{ not a list");
}
