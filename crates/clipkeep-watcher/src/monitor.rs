//! Change detection and synchronisation between the clipboard buffers.

use clipkeep_types::channel::{Frame, WatcherSettings};
use clipkeep_types::{MimeData, Source};
use tracing::{debug, info, warn};

use crate::backend::ClipboardBackend;
use crate::error::BackendError;

const LOG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::monitor");

/// Polls the buffers and turns changes into snapshot frames.
///
/// The last content seen on each buffer is remembered so a buffer that did
/// not change is never reported twice.
#[derive(Debug)]
pub struct Monitor<B> {
    backend: B,
    settings: WatcherSettings,
    clipboard_seen: Option<MimeData>,
    selection_seen: Option<MimeData>,
}

impl<B: ClipboardBackend> Monitor<B> {
    /// Monitor with default settings until the server configures it.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            settings: WatcherSettings::default(),
            clipboard_seen: None,
            selection_seen: None,
        }
    }

    /// Settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &WatcherSettings {
        &self.settings
    }

    /// Applies a frame received from the server.
    ///
    /// # Errors
    ///
    /// Fails when content cannot be placed on a buffer.
    pub fn apply(&mut self, frame: Frame) -> Result<(), BackendError> {
        match frame {
            Frame::Configure(settings) => {
                info!(
                    target: LOG_TARGET,
                    formats = ?settings.formats,
                    check_clipboard = settings.check_clipboard,
                    check_selection = settings.check_selection,
                    "settings updated"
                );
                self.settings = settings;
                Ok(())
            }
            Frame::SetContent { source, data } => self.backend.write(source, &data),
            Frame::Snapshot { source, .. } => {
                warn!(target: LOG_TARGET, %source, "ignoring snapshot frame sent to the watcher");
                Ok(())
            }
        }
    }

    /// Checks every enabled buffer once.
    ///
    /// Returns one snapshot frame per buffer whose content changed since the
    /// previous poll. Mirroring copies a change to the other buffer when the
    /// settings ask for it.
    ///
    /// # Errors
    ///
    /// Fails when the clipboard tools cannot be run.
    pub fn poll(&mut self) -> Result<Vec<Frame>, BackendError> {
        let mut frames = Vec::new();
        for source in [Source::Clipboard, Source::Selection] {
            if !self.checks(source) {
                continue;
            }
            let Some(data) = self.capture(source)? else {
                continue;
            };
            if self
                .seen(source)
                .is_some_and(|previous| previous.same_content(&data))
            {
                continue;
            }
            debug!(target: LOG_TARGET, %source, formats = data.len(), "buffer changed");
            self.mirror(source, &data)?;
            *self.seen_mut(source) = Some(data.clone());
            frames.push(Frame::Snapshot {
                source,
                window_title: self.backend.window_title(),
                data,
            });
        }
        Ok(frames)
    }

    fn capture(&self, source: Source) -> Result<Option<MimeData>, BackendError> {
        let available = self.backend.formats(source)?;
        let mut data = MimeData::new();
        for format in &self.settings.formats {
            if !available.contains(format) {
                continue;
            }
            if let Some(payload) = self.backend.read(source, format)? {
                data.insert(format.clone(), payload);
            }
        }
        Ok((!data.is_empty()).then_some(data))
    }

    fn mirror(&mut self, source: Source, data: &MimeData) -> Result<(), BackendError> {
        let target = match source {
            Source::Clipboard if self.settings.copy_selection => Source::Selection,
            Source::Selection if self.settings.copy_clipboard => Source::Clipboard,
            _ => return Ok(()),
        };
        if self
            .seen(target)
            .is_some_and(|current| current.same_content(data))
        {
            return Ok(());
        }
        self.backend.write(target, data)?;
        // The copy is not a new change of the target buffer.
        *self.seen_mut(target) = Some(data.clone());
        Ok(())
    }

    const fn checks(&self, source: Source) -> bool {
        match source {
            Source::Clipboard => self.settings.check_clipboard,
            Source::Selection => self.settings.check_selection,
        }
    }

    const fn seen(&self, source: Source) -> Option<&MimeData> {
        match source {
            Source::Clipboard => self.clipboard_seen.as_ref(),
            Source::Selection => self.selection_seen.as_ref(),
        }
    }

    const fn seen_mut(&mut self, source: Source) -> &mut Option<MimeData> {
        match source {
            Source::Clipboard => &mut self.clipboard_seen,
            Source::Selection => &mut self.selection_seen,
        }
    }
}
