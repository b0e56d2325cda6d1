use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{AlbumMetadata, ComicId};
use crate::error::ShelfError;
use crate::fs_util;

pub const METADATA_FILE: &str = "album.json";
pub const COVER_FILE: &str = "cover.png";

/// Comic records kept on disk, one directory per comic under `root`.
#[derive(Debug, Clone)]
pub struct RecordStore {
    root: Utf8PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComicRecord {
    pub id: ComicId,
    pub dir: Utf8PathBuf,
    pub metadata: AlbumMetadata,
}

impl ComicRecord {
    pub fn title(&self) -> &str {
        self.metadata.display_title()
    }

    pub fn cover_path(&self) -> Utf8PathBuf {
        self.dir.join(COVER_FILE)
    }
}

/// A directory that was found under the root but could not become a record.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntry {
    pub dir: Utf8PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub enum LoadOutcome {
    MissingRoot,
    /// The root exists but holds no subdirectories.
    Empty,
    /// At least one subdirectory was seen; `records` may still be empty if
    /// every one of them was skipped.
    Loaded {
        records: Vec<ComicRecord>,
        skipped: Vec<SkippedEntry>,
    },
}

impl LoadOutcome {
    pub fn records(&self) -> &[ComicRecord] {
        match self {
            LoadOutcome::Loaded { records, .. } => records,
            LoadOutcome::MissingRoot | LoadOutcome::Empty => &[],
        }
    }

    pub fn skipped(&self) -> &[SkippedEntry] {
        match self {
            LoadOutcome::Loaded { skipped, .. } => skipped,
            LoadOutcome::MissingRoot | LoadOutcome::Empty => &[],
        }
    }
}

impl RecordStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn record_dir(&self, id: &ComicId) -> Utf8PathBuf {
        self.root.join(id.as_str())
    }

    pub fn metadata_path(&self, id: &ComicId) -> Utf8PathBuf {
        self.record_dir(id).join(METADATA_FILE)
    }

    pub fn cover_path(&self, id: &ComicId) -> Utf8PathBuf {
        self.record_dir(id).join(COVER_FILE)
    }

    pub fn ensure_record_dir(&self, id: &ComicId) -> Result<Utf8PathBuf, ShelfError> {
        let dir = self.record_dir(id);
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| ShelfError::Filesystem(format!("create {dir}: {err}")))?;
        Ok(dir)
    }

    /// Scans the immediate subdirectories of the root. Unusable directories
    /// are logged and reported in `skipped`; they never fail the scan.
    pub fn load(&self) -> Result<LoadOutcome, ShelfError> {
        if !self.root.as_std_path().is_dir() {
            tracing::warn!(root = %self.root, "records directory does not exist");
            return Ok(LoadOutcome::MissingRoot);
        }

        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| ShelfError::Filesystem(format!("read {}: {err}", self.root)))?;

        let mut seen = 0usize;
        let mut records = Vec::new();
        let mut skipped = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| ShelfError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            seen += 1;

            let dir = match Utf8PathBuf::from_path_buf(path) {
                Ok(dir) => dir,
                Err(path) => {
                    tracing::warn!(path = %path.display(), "skipping non-utf8 directory");
                    skipped.push(SkippedEntry {
                        dir: Utf8PathBuf::from(path.to_string_lossy().into_owned()),
                        reason: "directory name is not valid UTF-8".to_string(),
                    });
                    continue;
                }
            };

            match Self::load_record(&dir) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(dir = %dir, error = %err, "skipping comic directory");
                    skipped.push(SkippedEntry {
                        dir,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if seen == 0 {
            return Ok(LoadOutcome::Empty);
        }
        tracing::info!(
            root = %self.root,
            loaded = records.len(),
            directories = seen,
            "loaded comic records"
        );
        Ok(LoadOutcome::Loaded { records, skipped })
    }

    pub fn find(&self, id: &ComicId) -> Result<ComicRecord, ShelfError> {
        let dir = self.record_dir(id);
        if !dir.as_std_path().is_dir() {
            return Err(ShelfError::RecordNotFound(id.to_string()));
        }
        Self::load_record(&dir)
    }

    pub fn write_metadata(
        &self,
        id: &ComicId,
        metadata: &AlbumMetadata,
    ) -> Result<Utf8PathBuf, ShelfError> {
        self.ensure_record_dir(id)?;
        let path = self.metadata_path(id);
        fs_util::write_json_atomic(&path, metadata)?;
        Ok(path)
    }

    pub fn delete(&self, id: &ComicId) -> Result<Utf8PathBuf, ShelfError> {
        let dir = self.record_dir(id);
        if !dir.as_std_path().is_dir() {
            return Err(ShelfError::RecordNotFound(id.to_string()));
        }
        fs::remove_dir_all(dir.as_std_path())
            .map_err(|err| ShelfError::Filesystem(format!("remove {dir}: {err}")))?;
        tracing::info!(id = %id, dir = %dir, "deleted comic record");
        Ok(dir)
    }

    pub fn export(&self, id: &ComicId, destination: &Utf8Path) -> Result<(), ShelfError> {
        let record = self.find(id)?;
        fs_util::write_json_atomic(destination, &record.metadata)
    }

    fn load_record(dir: &Utf8Path) -> Result<ComicRecord, ShelfError> {
        let name = dir.file_name().unwrap_or_default();
        let id = ComicId::from_dir_name(name)?;
        let metadata_path = dir.join(METADATA_FILE);
        if !metadata_path.as_std_path().is_file() {
            return Err(ShelfError::MetadataMissing(metadata_path));
        }
        let content = fs::read_to_string(metadata_path.as_std_path()).map_err(|err| {
            ShelfError::MetadataParse {
                path: metadata_path.clone(),
                message: err.to_string(),
            }
        })?;
        let metadata: AlbumMetadata =
            serde_json::from_str(&content).map_err(|err| ShelfError::MetadataParse {
                path: metadata_path.clone(),
                message: err.to_string(),
            })?;
        Ok(ComicRecord {
            id,
            dir: dir.to_path_buf(),
            metadata,
        })
    }
}

/// Case-insensitive substring match on id or title, preserving order. A blank
/// query matches everything; otherwise the query is used as given.
pub fn filter<'a>(records: &'a [ComicRecord], query: &str) -> Vec<&'a ComicRecord> {
    if query.trim().is_empty() {
        return records.iter().collect();
    }
    let needle = query.to_lowercase();
    records
        .iter()
        .filter(|record| {
            record.id.as_str().to_lowercase().contains(&needle)
                || record.metadata.title.to_lowercase().contains(&needle)
        })
        .collect()
}
