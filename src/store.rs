use crate::device::DeviceId;
use crate::AppConfig;
use anyhow::{anyhow, Result};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::{
    fs::{self, create_dir_all, File, OpenOptions},
    io::AsyncWriteExt,
};

/// Directories below the user's home that hold the record files.
pub const RECORD_DIRS: [&str; 2] = ["of-controller-db", "floodlight"];

/// File name prefix of a switch record file.
pub const FILE_PREFIX: &str = "switchaggports";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record file {} unavailable: {source}", path.display())]
    FileUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn unavailable(path: &Path, source: io::Error) -> Self {
        Self::FileUnavailable {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One append-only record file per switch under a fixed root directory.
#[derive(Debug, Clone)]
pub struct FlatFileStore {
    root: PathBuf,
}

impl FlatFileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Store rooted at `<home>/of-controller-db/floodlight`.
    pub fn in_home_dir() -> Result<Self> {
        Ok(Self::new(default_root()?))
    }

    /// Uses `record_directory` when configured, the home directory layout otherwise.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        match &config.record_directory {
            Some(dir) => Ok(Self::new(dir)),
            None => Self::in_home_dir(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic file path for a switch; does not touch the filesystem.
    pub fn record_path(&self, device: DeviceId) -> PathBuf {
        self.root
            .join(format!("{FILE_PREFIX}_{}.log", device.as_u64()))
    }

    /// Opens the switch's file for appending, creating it and its directory if absent.
    pub async fn open_for_append(&self, device: DeviceId) -> Result<RecordWriter, StoreError> {
        create_dir_all(&self.root)
            .await
            .map_err(|err| StoreError::unavailable(&self.root, err))?;
        let path = self.record_path(device);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| StoreError::unavailable(&path, err))?;
        Ok(RecordWriter { path, file })
    }

    /// All lines of the switch's file, oldest first.
    ///
    /// `Ok(None)` means the file was never created, which is different from an
    /// empty file.
    pub async fn read_all(&self, device: DeviceId) -> Result<Option<Vec<String>>, StoreError> {
        read_lines(&self.record_path(device)).await
    }
}

/// Reads a record file into memory, one entry per line.
///
/// Lines that are not valid UTF-8 are dropped; the rest of the file is still
/// returned.
pub async fn read_lines(path: &Path) -> Result<Option<Vec<String>>, StoreError> {
    let raw = match fs::read(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(StoreError::unavailable(path, err)),
    };
    if raw.is_empty() {
        return Ok(Some(Vec::new()));
    }

    let body = raw.strip_suffix(b"\n").unwrap_or(&raw[..]);
    let mut lines = Vec::new();
    for (idx, chunk) in body.split(|byte| *byte == b'\n').enumerate() {
        let chunk = chunk.strip_suffix(b"\r").unwrap_or(chunk);
        match String::from_utf8(chunk.to_vec()) {
            Ok(line) => lines.push(line),
            Err(err) => tracing::debug!(
                path = %path.display(),
                line = idx + 1,
                error = %err,
                "skipping line that is not UTF-8"
            ),
        }
    }
    Ok(Some(lines))
}

/// Exclusive append handle on one switch's record file.
pub struct RecordWriter {
    path: PathBuf,
    file: File,
}

impl RecordWriter {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `line` plus a newline and flushes before returning.
    pub async fn append(&mut self, line: &str) -> Result<(), StoreError> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.file
            .write_all(&buf)
            .await
            .map_err(|err| StoreError::unavailable(&self.path, err))?;
        self.file
            .flush()
            .await
            .map_err(|err| StoreError::unavailable(&self.path, err))
    }

    /// Flushes and releases the handle.
    pub async fn close(mut self) -> Result<(), StoreError> {
        self.file
            .flush()
            .await
            .map_err(|err| StoreError::unavailable(&self.path, err))
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    const HOME_VAR: &str = "USERPROFILE";
    #[cfg(not(windows))]
    const HOME_VAR: &str = "HOME";

    std::env::var_os(HOME_VAR)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// `<home>/of-controller-db/floodlight`.
pub fn default_root() -> Result<PathBuf> {
    let home = home_dir().ok_or_else(|| anyhow!("cannot resolve the user's home directory"))?;
    Ok(RECORD_DIRS.iter().fold(home, |path, dir| path.join(dir)))
}
