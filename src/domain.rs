use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ShelfError;

pub const UNTITLED: &str = "untitled";
pub const UNKNOWN_TITLE: &str = "unknown title";

static COMIC_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^/\\\x00]+$").expect("comic id pattern is valid"));

/// Identifier of a comic; doubles as the name of its record directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ComicId(String);

impl ComicId {
    /// Takes an existing record directory name verbatim, without trimming.
    pub fn from_dir_name(name: &str) -> Result<Self, ShelfError> {
        if !Self::is_valid(name) {
            return Err(ShelfError::InvalidComicId(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // A single path component: no separators, not `.` or `..`.
    fn is_valid(value: &str) -> bool {
        !value.is_empty() && value != "." && value != ".." && COMIC_ID_RE.is_match(value)
    }
}

impl fmt::Display for ComicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ComicId {
    type Err = ShelfError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if !Self::is_valid(normalized) {
            return Err(ShelfError::InvalidComicId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for ComicId {
    type Error = ShelfError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ComicId> for String {
    fn from(value: ComicId) -> Self {
        value.0
    }
}

/// Another comic referenced by a record. The id is not guaranteed to exist
/// locally, and may be empty in data coming from the remote source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedWork {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: String,
}

/// Contents of a record's `album.json`. Missing keys resolve to defaults when
/// the file is parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumMetadata {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub comment_count: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub likes: u64,
    #[serde(default)]
    pub works: Value,
    #[serde(default)]
    pub related_list: Vec<RelatedWork>,
}

impl AlbumMetadata {
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            UNTITLED
        } else {
            &self.title
        }
    }
}

/// One unit of work for the bulk orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub id: ComicId,
    pub title: String,
}

impl DownloadTask {
    pub fn new(id: ComicId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadListEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(value) => Ok(value),
        Value::Number(value) => Ok(value.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

// Remote sources report counts as text ("1.2K"); anything unparseable is 0.
pub(crate) fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let count = match Value::deserialize(deserializer)? {
        Value::Number(value) => value
            .as_u64()
            .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
            .unwrap_or(0),
        Value::String(value) => value.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    };
    Ok(count)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_comic_id_trims() {
        let id: ComicId = " 350234 ".parse().unwrap();
        assert_eq!(id.as_str(), "350234");
    }

    #[test]
    fn parse_comic_id_rejects_traversal() {
        for value in ["", "  ", "..", ".", " .. ", "a/b", "..\\x", "a\0b"] {
            let err = value.parse::<ComicId>().unwrap_err();
            assert_matches!(err, ShelfError::InvalidComicId(_));
        }
    }

    #[test]
    fn dir_names_keep_spaces_and_punctuation() {
        for name in ["100 (copy)", "漫画 2", " 5", "v1.2-extra"] {
            let id = ComicId::from_dir_name(name).unwrap();
            assert_eq!(id.as_str(), name);
        }
        assert_matches!(
            ComicId::from_dir_name(".."),
            Err(ShelfError::InvalidComicId(_))
        );
    }

    #[test]
    fn metadata_defaults_resolve_at_parse_time() {
        let meta: AlbumMetadata = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert_eq!(meta.title, "x");
        assert!(meta.tags.is_empty());
        assert_eq!(meta.likes, 0);
        assert_eq!(meta.works, Value::Null);
        assert!(meta.related_list.is_empty());
    }

    #[test]
    fn metadata_accepts_text_counts_and_numeric_ids() {
        let meta: AlbumMetadata = serde_json::from_str(
            r#"{"id": 42, "likes": "17", "comment_count": "1.2K",
                "related_list": [{"id": 7, "name": "n", "author": "a"}]}"#,
        )
        .unwrap();
        assert_eq!(meta.id, "42");
        assert_eq!(meta.likes, 17);
        assert_eq!(meta.comment_count, 0);
        assert_eq!(meta.related_list[0].id, "7");
    }

    #[test]
    fn display_title_falls_back() {
        let meta = AlbumMetadata::default();
        assert_eq!(meta.display_title(), UNTITLED);
    }
}
