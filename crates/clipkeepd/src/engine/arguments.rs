//! Positional command arguments and row resolution.

use crate::dispatch::DispatchError;
use crate::history::HistoryError;

/// Decoded arguments of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct Arguments {
    values: Vec<Vec<u8>>,
}

impl Arguments {
    pub(super) const fn new(values: Vec<Vec<u8>>) -> Self {
        Self { values }
    }

    pub(super) fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            words
                .into_iter()
                .map(|word| word.into().into_bytes())
                .collect(),
        )
    }

    pub(super) const fn len(&self) -> usize {
        self.values.len()
    }

    pub(super) const fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(super) fn bytes(&self, index: usize) -> Option<&[u8]> {
        self.values.get(index).map(Vec::as_slice)
    }

    pub(super) fn text(&self, index: usize) -> Option<String> {
        self.bytes(index)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Text of a required argument.
    pub(super) fn require(&self, index: usize, usage: &str) -> Result<String, DispatchError> {
        self.text(index)
            .ok_or_else(|| DispatchError::invalid_arguments(usage))
    }

    /// True when the argument parses as a (possibly negative) row.
    pub(super) fn is_row(&self, index: usize) -> bool {
        self.text(index).is_some_and(|text| parse_index(&text).is_some())
    }

    /// Number of leading arguments that are rows.
    pub(super) fn leading_rows(&self) -> usize {
        (0..self.len())
            .take_while(|index| self.is_row(*index))
            .count()
    }

    /// Raw row values of arguments `from..to`.
    pub(super) fn rows(&self, from: usize, to: usize) -> Result<Vec<i64>, DispatchError> {
        (from..to)
            .map(|index| {
                let text = self.text(index).unwrap_or_default();
                parse_index(&text)
                    .ok_or_else(|| DispatchError::invalid_arguments(format!("'{text}' is not a row")))
            })
            .collect()
    }

    /// Arguments from `index` on.
    pub(super) fn tail(&self, index: usize) -> Self {
        Self::new(self.values.get(index..).map(<[_]>::to_vec).unwrap_or_default())
    }

    /// Consecutive `MIME DATA` pairs starting at `from`.
    pub(super) fn pairs(&self, from: usize) -> Option<Vec<(String, Vec<u8>)>> {
        let rest = self.values.get(from..)?;
        if rest.is_empty() || !rest.len().is_multiple_of(2) {
            return None;
        }
        Some(
            rest.chunks_exact(2)
                .filter_map(|pair| match pair {
                    [mime, data] => Some((String::from_utf8_lossy(mime).into_owned(), data.clone())),
                    _ => None,
                })
                .collect(),
        )
    }
}

pub(super) fn parse_index(text: &str) -> Option<i64> {
    text.trim().parse().ok()
}

/// Resolves a row against a tab of `len` items; negative rows count from
/// the end. The row must name an existing item.
pub(super) fn resolve_row(row: i64, len: usize) -> Result<usize, HistoryError> {
    resolve(row, len).filter(|index| *index < len).ok_or(HistoryError::RowOutOfRange { row, len })
}

/// Like [`resolve_row`] but also accepts `len`, the position after the
/// oldest item.
pub(super) fn resolve_position(row: i64, len: usize) -> Result<usize, HistoryError> {
    resolve(row, len).filter(|index| *index <= len).ok_or(HistoryError::RowOutOfRange { row, len })
}

fn resolve(row: i64, len: usize) -> Option<usize> {
    if row >= 0 {
        return usize::try_from(row).ok();
    }
    let back = usize::try_from(row.unsigned_abs()).ok()?;
    len.checked_sub(back)
}
