//! Store directory management.
//!
//! ```text
//! <dir>/
//! ├─ LOCK          # Advisory lock for single-writer
//! └─ records.log   # Record log
//! ```

use crate::error::{XdbError, XdbResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "records.log";

/// An opened store directory.
///
/// Holds an exclusive lock on `<dir>/LOCK` for as long as it lives, so only
/// one process writes a store at a time. The lock is released on drop.
#[derive(Debug)]
pub struct LogDir {
    path: PathBuf,
    _lock_file: File,
}

impl LogDir {
    /// Opens (and with `create_if_missing`, creates) the directory at `path`
    /// and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the directory doesn't exist and `create_if_missing` is false
    /// - `path` is not a directory
    /// - another process holds the lock (`StoreLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> XdbResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path).map_err(io_error)?;
            } else {
                return Err(XdbError::invalid_argument(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(XdbError::invalid_argument(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))
            .map_err(io_error)?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(XdbError::StoreLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the record log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }
}

fn io_error(e: std::io::Error) -> XdbError {
    XdbError::Storage(e.into())
}
