//! JSON files on disk: exports, import sources, failure artifacts and sessions.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::record::ContactRecord;

/// Load an array of contact records
pub fn read_records(path: &Path) -> Result<Vec<ContactRecord>> {
    read_json(path)
}

/// Write contact records as a pretty-printed JSON array
pub fn write_records(path: &Path, records: &[ContactRecord]) -> Result<()> {
    write_json(path, records)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }

    let raw = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
    serde_json::from_str(&raw).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    write_atomic(path, &to_json_bytes(path, value)?, Access::Shared)
}

/// Like [`write_json`], but the file is readable by its owner only from the
/// moment it is created
pub fn write_private_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    write_atomic(path, &to_json_bytes(path, value)?, Access::Private)
}

fn to_json_bytes<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<Vec<u8>> {
    let mut data = serde_json::to_vec_pretty(value).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    data.push(b'\n');
    Ok(data)
}

/// Who may read a written file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Default permissions (subject to the umask)
    Shared,
    /// Owner read/write only
    Private,
}

/// Write through a sibling temp file and rename over the target
pub fn write_atomic(target: &Path, data: &[u8], access: Access) -> Result<()> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|source| io_error(&parent, source))?;

    let file_name = target
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("peoplesync");

    let mut counter: u32 = 0;
    let (temp_path, mut file) = loop {
        let candidate = if counter == 0 {
            parent.join(format!(".{file_name}.tmp"))
        } else {
            parent.join(format!(".{file_name}.{counter}.tmp"))
        };
        match create_new(&candidate, access) {
            Ok(file) => break (candidate, file),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => counter += 1,
            Err(source) => return Err(io_error(&candidate, source)),
        }
    };

    let written = file.write_all(data).and_then(|_| file.sync_all());
    drop(file);
    if let Err(source) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(io_error(&temp_path, source));
    }

    fs::rename(&temp_path, target).map_err(|source| {
        let _ = fs::remove_file(&temp_path);
        io_error(target, source)
    })
}

pub fn remove_file(path: &Path) -> Result<()> {
    fs::remove_file(path).map_err(|source| io_error(path, source))
}

fn create_new(path: &Path, access: Access) -> std::io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if access == Access::Private {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = access;
    options.open(path)
}

fn io_error(path: &Path, source: std::io::Error) -> Error {
    Error::Io {
        path: path.to_path_buf(),
        source,
    }
}
