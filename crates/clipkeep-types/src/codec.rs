//! Byte-level primitives shared by the channel and record formats.
//!
//! Integers are unsigned 32-bit big-endian. Strings and blobs are prefixed
//! with their length. A MIME map is a count followed by `(name, payload)`
//! pairs.

use thiserror::Error;

use crate::MimeData;

/// Smallest encoding of one MIME map entry: two empty length prefixes.
const MIN_ENTRY_BYTES: usize = 8;

/// Errors raised while decoding or encoding primitive values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A declared length points past the end of the available bytes.
    #[error("truncated data: needed {needed} bytes but only {available} remain")]
    Truncated {
        /// Bytes the field declared.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },
    /// A text field was not valid UTF-8.
    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 {
        /// Name of the offending field.
        field: &'static str,
    },
    /// Bytes remained after the last expected field.
    #[error("{count} unexpected trailing bytes")]
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },
    /// A value is too large to be described by a 32-bit length.
    #[error("{field} of {size} bytes exceeds the 32-bit length limit")]
    TooLarge {
        /// Name of the offending field.
        field: &'static str,
        /// Size of the value.
        size: usize,
    },
}

/// Cursor over an encoded buffer.
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub(crate) const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub(crate) const fn remaining(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn take(&mut self, count: usize) -> Result<&'a [u8], CodecError> {
        match self.bytes.split_at_checked(count) {
            Some((head, tail)) => {
                self.bytes = tail;
                Ok(head)
            }
            None => Err(CodecError::Truncated {
                needed: count,
                available: self.bytes.len(),
            }),
        }
    }

    pub(crate) fn u8(&mut self) -> Result<u8, CodecError> {
        let bytes = self.take(1)?;
        bytes.first().copied().ok_or(CodecError::Truncated {
            needed: 1,
            available: 0,
        })
    }

    #[expect(
        clippy::big_endian_bytes,
        reason = "wire integers are encoded in network byte order"
    )]
    pub(crate) fn u32(&mut self) -> Result<u32, CodecError> {
        let available = self.bytes.len();
        let bytes: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| CodecError::Truncated {
                needed: 4,
                available,
            })?;
        Ok(u32::from_be_bytes(bytes))
    }

    pub(crate) fn length(&mut self) -> Result<usize, CodecError> {
        let value = self.u32()?;
        usize::try_from(value).map_err(|_| CodecError::Truncated {
            needed: usize::MAX,
            available: self.bytes.len(),
        })
    }

    pub(crate) fn blob(&mut self) -> Result<&'a [u8], CodecError> {
        let length = self.length()?;
        self.take(length)
    }

    pub(crate) fn string(&mut self, field: &'static str) -> Result<String, CodecError> {
        let bytes = self.blob()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8 { field })
    }

    pub(crate) fn mime_data(&mut self) -> Result<MimeData, CodecError> {
        let count = self.length()?;
        let minimum = count.saturating_mul(MIN_ENTRY_BYTES);
        if minimum > self.bytes.len() {
            return Err(CodecError::Truncated {
                needed: minimum,
                available: self.bytes.len(),
            });
        }
        let mut data = MimeData::new();
        for _ in 0..count {
            let mime = self.string("mime type")?;
            let payload = self.blob()?;
            data.insert(mime, payload.to_vec());
        }
        Ok(data)
    }

    pub(crate) const fn finish(self) -> Result<(), CodecError> {
        if self.bytes.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes {
                count: self.bytes.len(),
            })
        }
    }
}

/// Growable encoding buffer.
#[derive(Debug, Default)]
pub(crate) struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    #[expect(
        clippy::big_endian_bytes,
        reason = "wire integers are encoded in network byte order"
    )]
    pub(crate) fn u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn length(&mut self, field: &'static str, size: usize) -> Result<(), CodecError> {
        let value = u32::try_from(size).map_err(|_| CodecError::TooLarge { field, size })?;
        self.u32(value);
        Ok(())
    }

    pub(crate) fn blob(&mut self, field: &'static str, bytes: &[u8]) -> Result<(), CodecError> {
        self.length(field, bytes.len())?;
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    pub(crate) fn raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub(crate) fn mime_data(&mut self, data: &MimeData) -> Result<(), CodecError> {
        self.length("mime map", data.len())?;
        for (mime, payload) in data.iter() {
            self.blob("mime type", mime.as_bytes())?;
            self.blob("payload", payload)?;
        }
        Ok(())
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}
