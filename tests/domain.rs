use assert_matches::assert_matches;

use comic_shelf::domain::{AlbumMetadata, ComicId, DownloadListEntry, UNTITLED};
use comic_shelf::error::ShelfError;

#[test]
fn comic_id_accepts_common_forms() {
    for value in ["350234", "album_12", "v1.2-extra"] {
        let id: ComicId = value.parse().unwrap();
        assert_eq!(id.to_string(), value);
    }
}

#[test]
fn comic_id_rejects_path_components() {
    assert_matches!("../etc".parse::<ComicId>(), Err(ShelfError::InvalidComicId(_)));
    assert_matches!("   ".parse::<ComicId>(), Err(ShelfError::InvalidComicId(_)));
}

#[test]
fn comic_id_deserializes_through_validation() {
    let id: ComicId = serde_json::from_str("\"42\"").unwrap();
    assert_eq!(id.as_str(), "42");
    assert!(serde_json::from_str::<ComicId>("\"a/b\"").is_err());
}

#[test]
fn blank_title_uses_placeholder() {
    let meta: AlbumMetadata = serde_json::from_str(r#"{"title": "   "}"#).unwrap();
    assert_eq!(meta.display_title(), UNTITLED);
}

#[test]
fn list_entry_roundtrips_with_string_id() {
    let entry: DownloadListEntry =
        serde_json::from_str(r#"{"id": 350234, "title": "星", "tags": ["a", "b"]}"#).unwrap();
    assert_eq!(entry.id, "350234");
    let value = serde_json::to_value(&entry).unwrap();
    assert_eq!(value["id"], "350234");
    assert_eq!(value["tags"][1], "b");
}
