use std::fs;
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use comic_shelf::app::{App, LoadState};
use comic_shelf::config::{Config, ConfigLoader};
use comic_shelf::domain::ComicId;
use comic_shelf::download_list::AddOutcome;
use comic_shelf::error::ShelfError;
use comic_shelf::output::JsonOutput;
use comic_shelf::remote::{ClientFactory, ContentClient, ImageRef, PhotoDetail, RemoteAlbum};
use comic_shelf::store::RecordStore;

#[derive(Default)]
struct MockFactory {
    requested: Mutex<Vec<String>>,
}

struct MockClient<'a> {
    requested: &'a Mutex<Vec<String>>,
}

impl ContentClient for MockClient<'_> {
    fn album_detail(&self, id: &ComicId) -> Result<RemoteAlbum, ShelfError> {
        self.requested.lock().unwrap().push(id.to_string());
        if id.as_str() == "crash" {
            panic!("decoder exploded");
        }
        if id.as_str() == "404" {
            return Err(ShelfError::RemoteStatus {
                status: 404,
                message: "missing".to_string(),
            });
        }
        Ok(RemoteAlbum {
            album_id: id.to_string(),
            title: format!("remote {id}"),
            ..RemoteAlbum::default()
        })
    }

    fn photo_detail(&self, id: &ComicId) -> Result<PhotoDetail, ShelfError> {
        Ok(PhotoDetail {
            photo_id: id.to_string(),
            images: vec![
                ImageRef {
                    url: format!("https://cdn.invalid/{id}/1.jpg"),
                    filename: None,
                },
                ImageRef {
                    url: format!("https://cdn.invalid/{id}/2"),
                    filename: Some("2.webp".to_string()),
                },
            ],
        })
    }

    fn download_image(&self, _image: &ImageRef, destination: &Path) -> Result<(), ShelfError> {
        fs::write(destination, b"img").map_err(|err| ShelfError::Filesystem(err.to_string()))
    }
}

// Clients borrow the factory's log, so the factory itself is handed out by
// reference.
impl<'a> ClientFactory for &'a MockFactory {
    type Client = MockClient<'a>;

    fn create(&self) -> Result<Self::Client, ShelfError> {
        let factory: &'a MockFactory = *self;
        Ok(MockClient {
            requested: &factory.requested,
        })
    }
}

struct Fixture {
    temp: tempfile::TempDir,
    root: Utf8PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        Self { temp, root }
    }

    fn app<'a>(&self, factory: &'a MockFactory) -> App<&'a MockFactory> {
        let config = ConfigLoader::resolve_config(Config {
            records_dir: Some(self.root.join("details").to_string()),
            downloads_dir: Some(self.root.join("downloads").to_string()),
            list_path: Some(self.root.join("queue.json").to_string()),
            concurrency: Some(2),
            ..Config::default()
        })
        .unwrap();
        App::new(RecordStore::new(&config.records_dir), factory, &config)
    }

    fn write_record(&self, id: &str, json: &str) {
        let dir = self.root.join("details").join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("album.json"), json).unwrap();
    }
}

fn id(value: &str) -> ComicId {
    value.parse().unwrap()
}

const SOURCE: &str = r#"{
    "id": "1",
    "title": "Source",
    "tags": ["drama"],
    "related_list": [
        {"id": "10", "name": "Ten", "author": "A"},
        {"id": "", "name": "Blank", "author": "B"},
        {"id": 11, "name": "", "author": "C"},
        {"id": "404", "name": "Gone", "author": "D"}
    ]
}"#;

#[test]
fn list_reports_store_states() {
    let fixture = Fixture::new();
    let factory = MockFactory::default();
    let app = fixture.app(&factory);

    let result = app.list(None, &JsonOutput).unwrap();
    assert_eq!(result.state, LoadState::MissingRoot);

    fs::create_dir_all(fixture.root.join("details")).unwrap();
    assert_eq!(app.list(None, &JsonOutput).unwrap().state, LoadState::Empty);

    fs::create_dir_all(fixture.root.join("details/2")).unwrap();
    let result = app.list(None, &JsonOutput).unwrap();
    assert_eq!(result.state, LoadState::NoValidRecords);
    assert_eq!(result.skipped.len(), 1);

    fixture.write_record("1", SOURCE);
    let result = app.list(Some("SOUR"), &JsonOutput).unwrap();
    assert_eq!(result.state, LoadState::Loaded);
    assert_eq!(result.total, 1);
    assert_eq!(result.matched, 1);
    assert_eq!(result.records[0].tags, vec!["drama".to_string()]);
    assert_eq!(app.list(Some("zzz"), &JsonOutput).unwrap().matched, 0);
    assert_eq!(app.list(Some(" sour"), &JsonOutput).unwrap().matched, 0);
    assert_eq!(app.list(Some("  "), &JsonOutput).unwrap().matched, 1);
}

#[test]
fn fetch_all_related_skips_blank_ids() {
    let fixture = Fixture::new();
    let factory = MockFactory::default();
    let app = fixture.app(&factory);
    fixture.write_record("1", SOURCE);

    let result = app.fetch_all_related(&id("1"), None, &JsonOutput).unwrap();
    assert_eq!(result.report.total, 3);
    assert_eq!(result.report.succeeded, 2);
    assert_eq!(result.report.failed(), 1);
    assert_eq!(result.report.failures[0].id, "404");
    assert_eq!(result.records_after, 3);

    let mut requested = factory.requested.lock().unwrap().clone();
    requested.sort();
    assert_eq!(requested, vec!["10", "11", "404"]);
}

#[test]
fn fetch_related_requires_a_listed_id() {
    let fixture = Fixture::new();
    let factory = MockFactory::default();
    let app = fixture.app(&factory);
    fixture.write_record("1", SOURCE);

    assert_matches!(
        app.fetch_related(&id("1"), &id("99"), &JsonOutput),
        Err(ShelfError::RelatedNotFound { related_id, .. }) if related_id == "99"
    );

    let result = app.fetch_related(&id("1"), &id("11"), &JsonOutput).unwrap();
    assert!(result.success);
    assert_eq!(result.title, "unknown title");
    assert_eq!(app.store().find(&id("11")).unwrap().title(), "remote 11");
}

#[test]
fn related_requires_at_least_one_valid_id() {
    let fixture = Fixture::new();
    let factory = MockFactory::default();
    let app = fixture.app(&factory);
    fixture.write_record("3", r#"{"title": "Lonely", "related_list": [{"id": ""}]}"#);

    assert_matches!(
        app.fetch_all_related(&id("3"), None, &JsonOutput),
        Err(ShelfError::NoRelatedWorks(source)) if source == "3"
    );
    assert!(factory.requested.lock().unwrap().is_empty());
}

#[test]
fn single_fetch_failure_is_reported_not_raised() {
    let fixture = Fixture::new();
    let factory = MockFactory::default();
    let app = fixture.app(&factory);

    let result = app.fetch(&id("404"), &JsonOutput).unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("404"));
}

#[test]
fn single_fetch_panic_becomes_a_failed_result() {
    let fixture = Fixture::new();
    let factory = MockFactory::default();
    let app = fixture.app(&factory);

    let result = app.fetch(&id("crash"), &JsonOutput).unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("decoder exploded"));
    assert!(!fixture.root.join("details/crash/album.json").as_std_path().exists());
}

#[test]
fn zero_concurrency_override_is_rejected() {
    let fixture = Fixture::new();
    let factory = MockFactory::default();
    let app = fixture.app(&factory);
    fixture.write_record("1", SOURCE);

    assert_matches!(
        app.fetch_all_related(&id("1"), Some(0), &JsonOutput),
        Err(ShelfError::InvalidConcurrency(0))
    );
}

#[test]
fn queue_add_show_and_switch() {
    let fixture = Fixture::new();
    let factory = MockFactory::default();
    let app = fixture.app(&factory);
    fixture.write_record("1", SOURCE);

    let added = app.add_to_list(&id("1"), None, &JsonOutput).unwrap();
    assert_eq!(added.outcome, AddOutcome::Added);
    assert_eq!(added.title, "Source");
    let again = app.add_to_list(&id("1"), None, &JsonOutput).unwrap();
    assert_eq!(again.outcome, AddOutcome::AlreadyPresent);

    let shown = app.show_list(None, &JsonOutput).unwrap();
    assert_eq!(shown.entries.len(), 1);
    assert_eq!(shown.entries[0].tags, vec!["drama".to_string()]);

    let missing = fixture.root.join("other.json");
    assert_matches!(
        app.show_list(Some(missing.as_path()), &JsonOutput),
        Err(ShelfError::ListNotFound(_))
    );
    assert_eq!(app.active_list(), fixture.root.join("queue.json"));

    assert_matches!(
        app.add_to_list(&id("2"), None, &JsonOutput),
        Err(ShelfError::RecordNotFound(_))
    );
}

#[test]
fn delete_export_and_info() {
    let fixture = Fixture::new();
    let factory = MockFactory::default();
    let app = fixture.app(&factory);
    fixture.write_record("1", SOURCE);

    let info = app.info(&id("1"), &JsonOutput).unwrap();
    assert!(!info.has_cover);
    assert_eq!(info.metadata.related_list.len(), 4);

    let destination = fixture.root.join("export/1.json");
    let exported = app.export(&id("1"), &destination, &JsonOutput).unwrap();
    assert_eq!(exported.path, destination.to_string());
    assert!(destination.as_std_path().is_file());

    app.delete(&id("1"), &JsonOutput).unwrap();
    assert_matches!(app.info(&id("1"), &JsonOutput), Err(ShelfError::RecordNotFound(_)));
    assert!(fixture.temp.path().join("details").is_dir());
}

#[test]
fn album_download_lands_in_downloads_dir() {
    let fixture = Fixture::new();
    let factory = MockFactory::default();
    let app = fixture.app(&factory);

    let result = app.download_album(&id("5"), &JsonOutput).unwrap();
    assert_eq!(result.images, 2);
    assert!(fixture.root.join("downloads/5/00001.jpg").as_std_path().is_file());
    assert!(fixture.root.join("downloads/5/00002.webp").as_std_path().is_file());
}
