use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::DownloadListEntry;
use crate::error::ShelfError;
use crate::fs_util;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

/// A JSON array of `{id, title, tags}` entries the user queued for later.
#[derive(Debug, Clone)]
pub struct DownloadList {
    active: Utf8PathBuf,
}

impl DownloadList {
    /// Adopts `path` as the active list. The file is created on first add.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            active: path.into(),
        }
    }

    /// Per-session list name, one file per program start.
    pub fn session_path() -> Utf8PathBuf {
        Utf8PathBuf::from(format!(
            "download-list-{}.json",
            chrono::Utc::now().timestamp()
        ))
    }

    pub fn active_path(&self) -> &Utf8Path {
        &self.active
    }

    /// Switches to an existing list file; the active list is unchanged on
    /// error.
    pub fn switch_list(&mut self, path: impl Into<Utf8PathBuf>) -> Result<&Utf8Path, ShelfError> {
        let path = path.into();
        if !path.as_std_path().exists() {
            tracing::error!(path = %path, "download list does not exist");
            return Err(ShelfError::ListNotFound(path));
        }
        tracing::info!(path = %path, "switched download list");
        self.active = path;
        Ok(&self.active)
    }

    pub fn entries(&self) -> Result<Vec<DownloadListEntry>, ShelfError> {
        if !self.active.as_std_path().exists() {
            return Ok(Vec::new());
        }
        self.read_entries()
    }

    /// Appends an entry unless one with the same id is already listed.
    pub fn add_entry(
        &self,
        id: &str,
        title: &str,
        tags: &[String],
    ) -> Result<AddOutcome, ShelfError> {
        let mut entries = if self.active.as_std_path().exists() {
            tracing::info!(path = %self.active, "reading download list");
            self.read_entries()?
        } else {
            tracing::info!(path = %self.active, "creating download list");
            Vec::new()
        };

        if entries.iter().any(|entry| entry.id == id) {
            return Ok(AddOutcome::AlreadyPresent);
        }
        entries.push(DownloadListEntry {
            id: id.to_string(),
            title: title.to_string(),
            tags: tags.to_vec(),
        });
        fs_util::write_json_atomic(&self.active, &entries)?;
        Ok(AddOutcome::Added)
    }

    fn read_entries(&self) -> Result<Vec<DownloadListEntry>, ShelfError> {
        let content =
            fs::read_to_string(self.active.as_std_path()).map_err(|err| ShelfError::ListRead {
                path: self.active.clone(),
                message: err.to_string(),
            })?;
        serde_json::from_str(&content).map_err(|err| ShelfError::ListParse {
            path: self.active.clone(),
            message: err.to_string(),
        })
    }
}
