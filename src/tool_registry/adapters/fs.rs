//! File-backed registry snapshot store.
//!
//! The snapshot is a single JSON array at the configured path. Commits write a
//! sibling temp file (`<name>.tmp-<pid>`), sync it, and rename it over the
//! canonical file, so the canonical file is always a complete snapshot.

use crate::tool_registry::{
    domain::RegistryRecord,
    ports::{PersistenceError, RegistrySnapshotStore, RegistryStoreResult},
};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use std::io::Write;

/// Registry store persisting snapshots to one JSON file.
#[derive(Debug, Clone)]
pub struct FileRegistryStore {
    directory: Utf8PathBuf,
    file_name: String,
}

/// A fully written temp snapshot that has not replaced the canonical file.
///
/// Dropping it without [`StagedSnapshot::promote`] leaves the canonical file
/// untouched, which is exactly the state after a crash mid-commit.
#[derive(Debug)]
pub struct StagedSnapshot {
    dir: Dir,
    temp_name: String,
    file_name: String,
}

impl FileRegistryStore {
    /// Creates a store for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Io`] when the path has no file name.
    pub fn new(registry_path: impl AsRef<Utf8Path>) -> RegistryStoreResult<Self> {
        let path = registry_path.as_ref();
        let file_name = path
            .file_name()
            .ok_or_else(|| {
                PersistenceError::io(std::io::Error::other(format!(
                    "registry path '{path}' must include a file name"
                )))
            })?
            .to_owned();
        let directory = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."))
            .to_owned();
        Ok(Self {
            directory,
            file_name,
        })
    }

    /// Returns the canonical snapshot path.
    #[must_use]
    pub fn path(&self) -> Utf8PathBuf {
        self.directory.join(&self.file_name)
    }

    /// Returns the temp file name used by this process.
    #[must_use]
    pub fn temp_file_name(&self) -> String {
        format!("{}.tmp-{}", self.file_name, std::process::id())
    }

    fn open_dir(&self) -> RegistryStoreResult<Dir> {
        Dir::open_ambient_dir(&self.directory, ambient_authority()).map_err(PersistenceError::io)
    }

    /// Reads the canonical snapshot synchronously.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Corrupt`] for undecodable content and
    /// [`PersistenceError::Io`] for filesystem failures.
    pub fn read_snapshot(&self) -> RegistryStoreResult<Vec<RegistryRecord>> {
        let dir = self.open_dir()?;
        let contents = match dir.read_to_string(&self.file_name) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(PersistenceError::io(err)),
        };
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&contents).map_err(|err| PersistenceError::Corrupt(err.to_string()))
    }

    /// Writes `records` to the temp file and syncs it, without renaming.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when serialisation or the write fails.
    pub fn stage(&self, records: &[RegistryRecord]) -> RegistryStoreResult<StagedSnapshot> {
        let bytes = serde_json::to_vec_pretty(records).map_err(PersistenceError::serialize)?;
        let dir = self.open_dir()?;
        let temp_name = self.temp_file_name();
        let mut file = dir.create(&temp_name).map_err(PersistenceError::io)?;
        file.write_all(&bytes).map_err(PersistenceError::io)?;
        file.sync_all().map_err(PersistenceError::io)?;
        Ok(StagedSnapshot {
            dir,
            temp_name,
            file_name: self.file_name.clone(),
        })
    }
}

impl StagedSnapshot {
    /// Renames the temp file over the canonical file.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Io`] when the rename fails.
    pub fn promote(self) -> RegistryStoreResult<()> {
        self.dir
            .rename(&self.temp_name, &self.dir, &self.file_name)
            .map_err(PersistenceError::io)
    }
}

async fn run_blocking<F, T>(operation: F) -> RegistryStoreResult<T>
where
    F: FnOnce() -> RegistryStoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(|err| PersistenceError::Task(err.to_string()))?
}

#[async_trait]
impl RegistrySnapshotStore for FileRegistryStore {
    async fn load(&self) -> RegistryStoreResult<Vec<RegistryRecord>> {
        let store = self.clone();
        run_blocking(move || store.read_snapshot()).await
    }

    async fn commit(&self, records: Vec<RegistryRecord>) -> RegistryStoreResult<()> {
        let store = self.clone();
        run_blocking(move || store.stage(&records)?.promote()).await
    }
}
