use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const BACKUP_SUFFIX: &str = ".bk";
const TEMP_SUFFIX: &str = ".tmp";

/// Returns `<path><suffix>`, e.g. `apps.json` -> `apps.json.bk`.
pub fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Read a JSON document. A missing file yields `None`.
///
/// Decode failures keep the underlying `serde_json::Error` reachable through
/// `anyhow::Error::downcast_ref` so callers can tell a type mismatch from
/// corruption.
pub fn read<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to open {}", path.display()));
        }
    };

    let value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to decode {}", path.display()))?;

    Ok(Some(value))
}

/// Persist the full collection to `path`.
///
/// With `backup` set, the current file is first copied to `<path>.bk`. The new
/// content goes through a temp file and a rename, so the target holds either
/// the old or the new document. If the write fails the backup is copied back
/// over the target and the original error is returned.
pub fn write<T: Serialize>(value: &T, path: &Path, backup: bool) -> Result<()> {
    let content = serde_json::to_vec_pretty(value)
        .with_context(|| format!("Failed to encode {}", path.display()))?;

    let backup_path = sibling(path, BACKUP_SUFFIX);
    let mut backed_up = false;
    if backup {
        match copy(path, &backup_path) {
            Ok(()) => backed_up = true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to back up {}", path.display()));
            }
        }
    }

    if let Err(e) = replace(path, &content) {
        if backed_up {
            if let Err(restore_err) = copy(&backup_path, path) {
                tracing::error!(
                    "Failed to restore {} from backup: {}",
                    path.display(),
                    restore_err
                );
            }
        }
        return Err(e);
    }

    Ok(())
}

/// Write `content` to a temp file next to `path` and rename it over `path`.
pub fn replace(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = sibling(path, TEMP_SUFFIX);

    let result = (|| -> Result<()> {
        let mut file = File::create(&temp_path)
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;
        file.write_all(content)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync {}", temp_path.display()))?;
        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    })();

    if result.is_err() && temp_path.is_file() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

pub fn copy(src: &Path, dst: &Path) -> io::Result<()> {
    let mut src_file = File::open(src)?;
    let mut dst_file = File::create(dst)?;
    io::copy(&mut src_file, &mut dst_file)?;
    dst_file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let value: Option<Vec<String>> = read(&dir.path().join("test.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.json");

        write(&"test".to_string(), &path, true).unwrap();
        assert!(path.exists());
        // Nothing to back up on first write
        assert!(!sibling(&path, BACKUP_SUFFIX).exists());

        let value: Option<String> = read(&path).unwrap();
        assert_eq!(value.as_deref(), Some("test"));

        write(&"test2".to_string(), &path, true).unwrap();
        let backup: Option<String> = read(&sibling(&path, BACKUP_SUFFIX)).unwrap();
        assert_eq!(backup.as_deref(), Some("test"));

        let value: Option<String> = read(&path).unwrap();
        assert_eq!(value.as_deref(), Some("test2"));
        assert!(!sibling(&path, TEMP_SUFFIX).exists());
    }

    #[test]
    fn test_failed_write_keeps_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.json");

        let before = HashMap::from([("a".to_string(), 1)]);
        write(&before, &path, true).unwrap();

        // A directory in place of the temp file makes the write fail
        fs::create_dir(sibling(&path, TEMP_SUFFIX)).unwrap();

        let after = HashMap::from([("b".to_string(), 2)]);
        assert!(write(&after, &path, true).is_err());

        let on_disk: Option<HashMap<String, i32>> = read(&path).unwrap();
        assert_eq!(on_disk, Some(before));
    }

    #[test]
    fn test_decode_error_is_classifiable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.json");
        fs::write(&path, "[\"a\"]").unwrap();

        let err = read::<HashMap<String, String>>(&path).unwrap_err();
        let json_err = err.downcast_ref::<serde_json::Error>().unwrap();
        assert_eq!(json_err.classify(), serde_json::error::Category::Data);
    }
}
