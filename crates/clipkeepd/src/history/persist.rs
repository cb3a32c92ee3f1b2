//! Reads and writes tab files in the record format.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clipkeep_types::MimeData;
use clipkeep_types::records::{RecordError, decode_items, encode_items};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::HistoryError;
use crate::files::atomic_write;

/// File holding the items of `tab` inside `dir`.
pub(crate) fn tab_path(dir: &Path, tab: &str) -> PathBuf {
    dir.join(format!("tab_{}.dat", utf8_percent_encode(tab, NON_ALPHANUMERIC)))
}

/// Loads the items stored at `path`.
///
/// A missing file yields `Ok(None)`; any integrity failure is reported as
/// [`HistoryError::Corrupted`] and no item is returned.
pub(crate) fn read_items(path: &Path) -> Result<Option<Vec<MimeData>>, HistoryError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(HistoryError::io(path, source)),
    };
    decode_items(&bytes)
        .map(Some)
        .map_err(|source| corrupted(path, source))
}

/// Writes `items` to `path`, replacing the file atomically.
pub(crate) fn write_items<'a, I>(path: &Path, items: I) -> Result<(), HistoryError>
where
    I: IntoIterator<Item = &'a MimeData>,
    I::IntoIter: ExactSizeIterator,
{
    let bytes = encode_items(items).map_err(|source| {
        HistoryError::io(path, io::Error::new(io::ErrorKind::InvalidData, source))
    })?;
    atomic_write(path, &bytes).map_err(|source| HistoryError::io(path, source))
}

/// Deletes a tab file, ignoring files that do not exist.
pub(crate) fn remove_file(path: &Path) -> Result<(), HistoryError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(HistoryError::io(path, source)),
    }
}

fn corrupted(path: &Path, source: RecordError) -> HistoryError {
    HistoryError::Corrupted {
        path: path.to_path_buf(),
        source,
    }
}
