use std::fs;
use std::io::Write;

use camino::Utf8Path;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use tempfile::Builder;

use crate::error::ShelfError;

/// Serializes `value` as UTF-8 JSON with a four-space indent. Non-ASCII text
/// is written as-is.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, ShelfError> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(&mut buffer, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|err| ShelfError::Filesystem(err.to_string()))?;
    buffer.push(b'\n');
    Ok(buffer)
}

pub fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Utf8Path,
    value: &T,
) -> Result<(), ShelfError> {
    let content = to_pretty_json(value)?;
    write_bytes_atomic(path, &content)
}

/// Writes through a sibling temp file and renames it over `path`, so readers
/// never observe a partially written file.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), ShelfError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| ShelfError::Filesystem(format!("create {parent}: {err}")))?;
    let mut temp = Builder::new()
        .prefix(".comic-shelf")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| ShelfError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| ShelfError::Filesystem(format!("write {path}: {err}")))?;
    temp.persist(path.as_std_path())
        .map_err(|err| ShelfError::Filesystem(format!("persist {path}: {}", err.error)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn pretty_json_keeps_unicode_and_indents_four() {
        let bytes = to_pretty_json(&serde_json::json!({"title": "漫画"})).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\n    \"title\": \"漫画\""));
    }

    #[test]
    fn atomic_write_overwrites() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("nested/file.bin")).unwrap();
        write_bytes_atomic(&path, b"one").unwrap();
        write_bytes_atomic(&path, b"two").unwrap();
        assert_eq!(std::fs::read(path.as_std_path()).unwrap(), b"two");
    }
}
