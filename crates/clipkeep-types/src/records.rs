//! Integrity-checked item record files.
//!
//! Layout: the magic bytes `CLIPKEEP`, a `u32` format version, a `u32` item
//! count, one MIME map per item, then a SHA-256 digest of every preceding
//! byte. History tabs and exported tabs share the layout.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::MimeData;
use crate::codec::{ByteReader, ByteWriter, CodecError};

/// Leading bytes of every record file.
pub const MAGIC: &[u8; 8] = b"CLIPKEEP";

/// Version written by [`encode_items`].
pub const FORMAT_VERSION: u32 = 1;

const DIGEST_BYTES: usize = 32;

/// Errors raised while decoding a record file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The file does not start with [`MAGIC`].
    #[error("not a clipkeep item file")]
    BadMagic,
    /// The file was written by an unknown format version.
    #[error("unsupported item file version {version}")]
    UnsupportedVersion {
        /// Version found in the header.
        version: u32,
    },
    /// The trailing digest does not match the content.
    #[error("item file checksum mismatch")]
    DigestMismatch,
    /// The body could not be decoded.
    #[error("malformed item file: {0}")]
    Decode(#[from] CodecError),
}

/// Encodes items, newest first, into a record file image.
///
/// # Errors
///
/// Returns an error when an item is too large for 32-bit lengths.
pub fn encode_items<'a, I>(items: I) -> Result<Vec<u8>, RecordError>
where
    I: IntoIterator<Item = &'a MimeData>,
    I::IntoIter: ExactSizeIterator,
{
    let iter = items.into_iter();
    let mut writer = ByteWriter::new();
    writer.raw(MAGIC);
    writer.u32(FORMAT_VERSION);
    writer.length("item count", iter.len())?;
    for item in iter {
        writer.mime_data(item)?;
    }
    let digest = Sha256::digest(writer.as_slice());
    writer.raw(&digest);
    Ok(writer.into_inner())
}

/// Decodes a record file image.
///
/// # Errors
///
/// Returns an error for a missing magic, an unknown version, a digest
/// mismatch, a truncated record or trailing bytes.
pub fn decode_items(bytes: &[u8]) -> Result<Vec<MimeData>, RecordError> {
    if !bytes.starts_with(MAGIC) {
        return Err(RecordError::BadMagic);
    }
    let body_len = bytes
        .len()
        .checked_sub(DIGEST_BYTES)
        .ok_or(CodecError::Truncated {
            needed: DIGEST_BYTES,
            available: bytes.len(),
        })?;
    let (body, digest) = bytes.split_at(body_len);
    if Sha256::digest(body).as_slice() != digest {
        return Err(RecordError::DigestMismatch);
    }

    let mut reader = ByteReader::new(body);
    reader.take(MAGIC.len())?;
    let version = reader.u32()?;
    if version != FORMAT_VERSION {
        return Err(RecordError::UnsupportedVersion { version });
    }
    let count = reader.length()?;
    let mut items = Vec::new();
    for _ in 0..count {
        items.push(reader.mime_data()?);
    }
    reader.finish()?;
    Ok(items)
}
