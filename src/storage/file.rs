use super::KeyValueStore;
use crate::error::StorageError;
use serde_json::{Map, Value};
use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::{debug, warn};

/// Stores every key in one JSON object file.
///
/// Reads always go to disk so a token written by another client instance is
/// seen immediately. Writes are read-modify-write under a mutex and land via a
/// temp file plus rename, so the file holds either the old or the new record.
/// A file that does not parse is reported on read and replaced on write.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<Map<String, Value>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if raw.trim().is_empty() {
            return Ok(Map::new());
        }

        serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }

        let content = serde_json::to_vec_pretty(map)?;
        let tmp_path = self.path.with_extension("json.tmp");

        // mode only applies on create
        match fs::remove_file(&tmp_path) {
            Err(err) if err.kind() != ErrorKind::NotFound => return Err(io_err(&tmp_path)(err)),
            _ => {}
        }

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        // tokens live in this file
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&tmp_path).map_err(io_err(&tmp_path))?;
        file.write_all(&content)
            .and_then(|()| file.sync_all())
            .map_err(io_err(&tmp_path))?;
        drop(file);

        fs::rename(&tmp_path, &self.path).map_err(io_err(&self.path))?;

        debug!("session record written to {}", self.path.display());

        Ok(())
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError {
    let path = path.to_path_buf();
    move |source| StorageError::Io { path, source }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let map = self.read_map()?;
        Ok(map.get(key).and_then(Value::as_str).map(str::to_string))
    }

    fn apply(&self, changes: &[(&str, Option<&str>)]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut map = match self.read_map() {
            Ok(map) => map,
            Err(err @ StorageError::Corrupt { .. }) => {
                warn!("Replacing unreadable session record: {}", err);
                Map::new()
            }
            Err(err) => return Err(err),
        };

        for (key, value) in changes {
            match value {
                Some(value) => map.insert((*key).to_string(), Value::String((*value).to_string())),
                None => map.remove(*key),
            };
        }

        self.write_map(&map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("session.json"));

        assert_eq!(store.get("access_token").unwrap(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn writes_are_visible_to_a_fresh_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let first = FileStore::new(&path);
        first
            .apply(&[("access_token", Some("AT1")), ("refresh_token", Some("RT1"))])
            .unwrap();
        first.remove("refresh_token").unwrap();

        let second = FileStore::new(&path);
        assert_eq!(second.get("access_token").unwrap().as_deref(), Some("AT1"));
        assert_eq!(second.get("refresh_token").unwrap(), None);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "[1, 2, 3]").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(
            store.get("access_token"),
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[test]
    fn writes_replace_a_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, r#"{"access_token": "AT0", trunc"#).unwrap();

        let store = FileStore::new(&path);
        store
            .apply(&[("access_token", None), ("refresh_token", None)])
            .unwrap();
        assert_eq!(store.get("access_token").unwrap(), None);

        store.set("access_token", "AT1").unwrap();
        assert_eq!(store.get("access_token").unwrap().as_deref(), Some("AT1"));
    }

    #[cfg(unix)]
    #[test]
    fn file_is_private_to_the_owner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("session.json"));
        store.set("access_token", "AT1").unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn leftover_temp_file_does_not_leak_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, "stale").unwrap();
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileStore::new(&path);
        store.set("access_token", "AT1").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!tmp_path.exists());
    }
}
