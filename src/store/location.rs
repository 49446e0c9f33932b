//! On-disk location of a store and its side files.
//!
//! A SQLite store in WAL mode is three files: the main database plus the
//! `-wal` and `-shm` side files. They always move and get deleted together.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StoreError;

/// How a connection treats the files on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Open an existing store without changing its journal mode.
    Existing,
    /// Create the store if missing and switch it to WAL.
    Create,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLocation {
    path: PathBuf,
}

impl StoreLocation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn wal_path(&self) -> PathBuf {
        self.with_suffix("-wal")
    }

    pub fn shm_path(&self) -> PathBuf {
        self.with_suffix("-shm")
    }

    pub fn side_files(&self) -> [PathBuf; 2] {
        [self.wal_path(), self.shm_path()]
    }

    /// Main file first, then the side files.
    pub fn files(&self) -> [PathBuf; 3] {
        [self.path.clone(), self.wal_path(), self.shm_path()]
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// A store next to this one, named by appending `suffix`.
    pub fn sibling(&self, suffix: &str) -> StoreLocation {
        StoreLocation::new(self.with_suffix(suffix))
    }

    /// Deletes the side files. Missing files are not an error.
    pub fn remove_side_files(&self) -> Result<(), StoreError> {
        for path in self.side_files() {
            remove_if_exists(&path)?;
        }
        Ok(())
    }

    /// Deletes the main file and the side files. Missing files are not an error.
    pub fn remove_all(&self) -> Result<(), StoreError> {
        for path in self.files() {
            remove_if_exists(&path)?;
        }
        Ok(())
    }

    pub fn connect_options(&self, mode: OpenMode, busy_timeout: Duration) -> SqliteConnectOptions {
        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .busy_timeout(busy_timeout)
            .foreign_keys(true);
        match mode {
            OpenMode::Existing => options.create_if_missing(false),
            OpenMode::Create => options
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
        }
    }

    /// Opens a single-connection pool on this store.
    pub async fn connect(
        &self,
        mode: OpenMode,
        busy_timeout: Duration,
    ) -> Result<SqlitePool, StoreError> {
        if mode == OpenMode::Create {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(self.connect_options(mode, busy_timeout))
            .await?;
        Ok(pool)
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }
}

fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_side_file_paths() {
        let location = StoreLocation::new("/data/run.sqlite");
        assert_eq!(location.wal_path(), PathBuf::from("/data/run.sqlite-wal"));
        assert_eq!(location.shm_path(), PathBuf::from("/data/run.sqlite-shm"));
        assert_eq!(
            location.sibling(".migrating").path(),
            Path::new("/data/run.sqlite.migrating")
        );
        assert_eq!(
            location.sibling(".migrating").wal_path(),
            PathBuf::from("/data/run.sqlite.migrating-wal")
        );
    }

    #[test]
    fn test_remove_all_deletes_every_file() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("run.sqlite"));
        for path in location.files() {
            fs::write(&path, b"x").unwrap();
        }

        location.remove_all().unwrap();

        for path in location.files() {
            assert!(!path.exists());
        }
    }

    #[test]
    fn test_remove_missing_files_is_ok() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("absent.sqlite"));
        assert!(location.remove_all().is_ok());
        assert!(location.remove_side_files().is_ok());
    }

    #[tokio::test]
    async fn test_connect_create_makes_parent_dirs() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("nested").join("run.sqlite"));

        let pool = location
            .connect(OpenMode::Create, Duration::from_secs(1))
            .await
            .unwrap();
        pool.close().await;

        assert!(location.exists());
    }

    #[tokio::test]
    async fn test_connect_existing_fails_when_missing() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("absent.sqlite"));
        assert!(location
            .connect(OpenMode::Existing, Duration::from_secs(1))
            .await
            .is_err());
        assert!(!location.exists());
    }
}
