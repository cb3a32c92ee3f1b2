//! Snapshot channel spoken between the server and its clipboard watcher.
//!
//! Every frame is a four-byte big-endian payload length followed by the
//! payload. The payload starts with a kind byte:
//!
//! | Kind | Direction | Body |
//! |------|-----------|------|
//! | `1` snapshot | watcher to server | source, optional window title, MIME map |
//! | `2` set content | server to watcher | source, MIME map |
//! | `3` configure | server to watcher | format list, four flags |
//!
//! Decoding never panics. A stream that ends exactly on a frame boundary
//! yields `Ok(None)`; anything else that ends early is an error.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::codec::{ByteReader, ByteWriter, CodecError};
use crate::{MimeData, Source};

/// Largest accepted payload length.
pub const MAX_FRAME_BYTES: usize = 32 * 1024 * 1024;

const HEADER_BYTES: usize = 4;

const KIND_SNAPSHOT: u8 = 1;
const KIND_SET_CONTENT: u8 = 2;
const KIND_CONFIGURE: u8 = 3;

const SOURCE_CLIPBOARD: u8 = 0;
const SOURCE_SELECTION: u8 = 1;

/// Monitoring settings pushed to the watcher after it starts and whenever the
/// relevant options change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherSettings {
    /// MIME types to capture, in priority order.
    pub formats: Vec<String>,
    /// Report clipboard changes.
    pub check_clipboard: bool,
    /// Report selection changes.
    pub check_selection: bool,
    /// Mirror selection changes into the clipboard.
    pub copy_clipboard: bool,
    /// Mirror clipboard changes into the selection.
    pub copy_selection: bool,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            formats: vec!["text/plain".to_owned()],
            check_clipboard: true,
            check_selection: true,
            copy_clipboard: true,
            copy_selection: true,
        }
    }
}

/// One message on the snapshot channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A clipboard change observed by the watcher.
    Snapshot {
        /// Buffer the content was read from.
        source: Source,
        /// Title of the window that owned the content, when known.
        window_title: Option<String>,
        /// Captured representations.
        data: MimeData,
    },
    /// Request to place content on a clipboard buffer.
    SetContent {
        /// Buffer to write.
        source: Source,
        /// Representations to offer.
        data: MimeData,
    },
    /// Replaces the watcher's monitoring settings.
    Configure(WatcherSettings),
}

/// Errors raised while reading or writing frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The declared payload length is zero or above [`MAX_FRAME_BYTES`].
    #[error("invalid frame length {length}")]
    InvalidLength {
        /// Declared payload length.
        length: usize,
    },
    /// The stream ended inside a frame.
    #[error("channel closed in the middle of a frame")]
    UnexpectedEof,
    /// The payload kind byte is not recognised.
    #[error("unknown frame kind {0}")]
    UnknownKind(u8),
    /// The source byte is not recognised.
    #[error("unknown clipboard source {0}")]
    UnknownSource(u8),
    /// The payload body could not be decoded.
    #[error("malformed frame: {0}")]
    Decode(#[from] CodecError),
    /// The underlying stream failed.
    #[error("channel I/O failed: {0}")]
    Io(#[source] io::Error),
}

impl FrameError {
    /// Returns true when the stream can no longer be trusted to be positioned
    /// on a frame boundary.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidLength { .. } | Self::UnexpectedEof | Self::Io(_)
        )
    }
}

impl Frame {
    /// Encodes the frame including its length prefix.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload exceeds [`MAX_FRAME_BYTES`] or a
    /// field cannot be described by a 32-bit length.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let payload = self.encode_payload()?;
        if payload.len() > MAX_FRAME_BYTES {
            return Err(FrameError::InvalidLength {
                length: payload.len(),
            });
        }
        let mut writer = ByteWriter::new();
        writer.length("frame", payload.len())?;
        writer.raw(&payload);
        Ok(writer.into_inner())
    }

    /// Decodes one complete frame, length prefix included.
    ///
    /// # Errors
    ///
    /// Returns an error when the declared length is invalid or exceeds the
    /// supplied bytes, or when the payload is malformed.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let mut reader = ByteReader::new(bytes);
        let length = reader.length()?;
        check_length(length)?;
        let payload = reader.take(length)?;
        reader.finish()?;
        Self::decode_payload(payload)
    }

    fn encode_payload(&self) -> Result<Vec<u8>, CodecError> {
        let mut writer = ByteWriter::new();
        match self {
            Self::Snapshot {
                source,
                window_title,
                data,
            } => {
                writer.u8(KIND_SNAPSHOT);
                writer.u8(source_byte(*source));
                match window_title {
                    Some(title) => {
                        writer.u8(1);
                        writer.blob("window title", title.as_bytes())?;
                    }
                    None => writer.u8(0),
                }
                writer.mime_data(data)?;
            }
            Self::SetContent { source, data } => {
                writer.u8(KIND_SET_CONTENT);
                writer.u8(source_byte(*source));
                writer.mime_data(data)?;
            }
            Self::Configure(settings) => {
                writer.u8(KIND_CONFIGURE);
                writer.length("format list", settings.formats.len())?;
                for format in &settings.formats {
                    writer.blob("format", format.as_bytes())?;
                }
                for flag in [
                    settings.check_clipboard,
                    settings.check_selection,
                    settings.copy_clipboard,
                    settings.copy_selection,
                ] {
                    writer.u8(u8::from(flag));
                }
            }
        }
        Ok(writer.into_inner())
    }

    fn decode_payload(payload: &[u8]) -> Result<Self, FrameError> {
        let mut reader = ByteReader::new(payload);
        let frame = match reader.u8()? {
            KIND_SNAPSHOT => {
                let source = parse_source(reader.u8()?)?;
                let window_title = match reader.u8()? {
                    0 => None,
                    _ => Some(reader.string("window title")?),
                };
                let data = reader.mime_data()?;
                Self::Snapshot {
                    source,
                    window_title,
                    data,
                }
            }
            KIND_SET_CONTENT => {
                let source = parse_source(reader.u8()?)?;
                let data = reader.mime_data()?;
                Self::SetContent { source, data }
            }
            KIND_CONFIGURE => {
                let count = reader.length()?;
                if count.saturating_mul(HEADER_BYTES) > reader.remaining() {
                    return Err(CodecError::Truncated {
                        needed: count.saturating_mul(HEADER_BYTES),
                        available: reader.remaining(),
                    }
                    .into());
                }
                let mut formats = Vec::with_capacity(count);
                for _ in 0..count {
                    formats.push(reader.string("format")?);
                }
                Self::Configure(WatcherSettings {
                    formats,
                    check_clipboard: reader.u8()? != 0,
                    check_selection: reader.u8()? != 0,
                    copy_clipboard: reader.u8()? != 0,
                    copy_selection: reader.u8()? != 0,
                })
            }
            other => return Err(FrameError::UnknownKind(other)),
        };
        reader.finish()?;
        Ok(frame)
    }
}

const fn source_byte(source: Source) -> u8 {
    match source {
        Source::Clipboard => SOURCE_CLIPBOARD,
        Source::Selection => SOURCE_SELECTION,
    }
}

const fn parse_source(value: u8) -> Result<Source, FrameError> {
    match value {
        SOURCE_CLIPBOARD => Ok(Source::Clipboard),
        SOURCE_SELECTION => Ok(Source::Selection),
        other => Err(FrameError::UnknownSource(other)),
    }
}

const fn check_length(length: usize) -> Result<(), FrameError> {
    if length == 0 || length > MAX_FRAME_BYTES {
        Err(FrameError::InvalidLength { length })
    } else {
        Ok(())
    }
}

/// Reads frames from a byte stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
}

impl<R: Read> FrameReader<R> {
    /// Wraps a stream.
    pub const fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads the next frame.
    ///
    /// Returns `Ok(None)` when the stream ends on a frame boundary.
    ///
    /// # Errors
    ///
    /// Returns an error when the stream fails, ends mid-frame or carries a
    /// malformed frame. Only errors for which [`FrameError::is_fatal`] is
    /// true leave the stream desynchronised.
    pub fn read_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let mut header = [0_u8; HEADER_BYTES];
        if !self.fill(&mut header, true)? {
            return Ok(None);
        }
        let length = ByteReader::new(&header).length()?;
        check_length(length)?;
        let mut payload = vec![0_u8; length];
        self.fill(&mut payload, false)?;
        Frame::decode_payload(&payload).map(Some)
    }

    /// Consumes the reader, returning the stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fill(&mut self, buffer: &mut [u8], allow_clean_eof: bool) -> Result<bool, FrameError> {
        let mut filled = 0;
        while let Some(rest) = buffer.get_mut(filled..) {
            if rest.is_empty() {
                break;
            }
            match self.inner.read(rest) {
                Ok(0) if filled == 0 && allow_clean_eof => return Ok(false),
                Ok(0) => return Err(FrameError::UnexpectedEof),
                Ok(count) => filled += count,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(FrameError::Io(error)),
            }
        }
        Ok(true)
    }
}

/// Writes frames to a byte stream.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: Write> FrameWriter<W> {
    /// Wraps a stream.
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Encodes and writes one frame, then flushes the stream.
    ///
    /// # Errors
    ///
    /// Returns an error when the frame cannot be encoded or the stream
    /// rejects the write.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), FrameError> {
        let bytes = frame.encode()?;
        self.inner.write_all(&bytes).map_err(FrameError::Io)?;
        self.inner.flush().map_err(FrameError::Io)
    }

    /// Consumes the writer, returning the stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::io::Cursor;

    #[fixture]
    fn snapshot() -> Frame {
        Frame::Snapshot {
            source: Source::Selection,
            window_title: Some("Terminal".to_owned()),
            data: MimeData::from_text("hello").with("text/html", "<b>hello</b>"),
        }
    }

    fn stream_of(frames: &[Frame]) -> Vec<u8> {
        let mut writer = FrameWriter::new(Vec::new());
        for frame in frames {
            writer.write_frame(frame).expect("encode frame");
        }
        writer.into_inner()
    }

    #[rstest]
    fn reader_yields_frames_then_clean_end(snapshot: Frame) {
        let settings = Frame::Configure(WatcherSettings::default());
        let bytes = stream_of(&[snapshot.clone(), settings.clone()]);
        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert_eq!(reader.read_frame().expect("first"), Some(snapshot));
        assert_eq!(reader.read_frame().expect("second"), Some(settings));
        assert_eq!(reader.read_frame().expect("end"), None);
    }

    #[rstest]
    fn declared_length_beyond_buffer_is_rejected(snapshot: Frame) {
        let mut bytes = snapshot.encode().expect("encode");
        bytes.truncate(bytes.len() - 3);
        let error = Frame::decode(&bytes).expect_err("short frame");
        assert!(matches!(
            error,
            FrameError::Decode(CodecError::Truncated { .. })
        ));
    }

    #[rstest]
    #[case(0)]
    #[case(u32::MAX)]
    fn reader_rejects_invalid_lengths(#[case] length: u32) {
        let mut writer = ByteWriter::new();
        writer.u32(length);
        writer.raw(&[KIND_SNAPSHOT]);
        let mut reader = FrameReader::new(Cursor::new(writer.into_inner()));
        let error = reader.read_frame().expect_err("invalid length");
        assert!(matches!(error, FrameError::InvalidLength { .. }));
        assert!(error.is_fatal());
    }

    #[rstest]
    fn stream_ending_mid_frame_is_unexpected_eof(snapshot: Frame) {
        let mut bytes = snapshot.encode().expect("encode");
        bytes.truncate(6);
        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::UnexpectedEof)
        ));
    }

    #[rstest]
    fn malformed_payload_keeps_stream_aligned(snapshot: Frame) {
        let mut writer = ByteWriter::new();
        writer.u32(2);
        writer.raw(&[9, 9]);
        let mut bytes = writer.into_inner();
        bytes.extend(snapshot.encode().expect("encode"));
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let error = reader.read_frame().expect_err("unknown kind");
        assert!(matches!(error, FrameError::UnknownKind(9)));
        assert!(!error.is_fatal());
        assert_eq!(reader.read_frame().expect("next"), Some(snapshot));
    }

    #[rstest]
    fn unknown_source_is_rejected() {
        let mut writer = ByteWriter::new();
        writer.u32(3);
        writer.raw(&[KIND_SET_CONTENT, 7, 0]);
        let error = Frame::decode(&writer.into_inner()).expect_err("bad source");
        assert!(matches!(error, FrameError::UnknownSource(7)));
    }
}
