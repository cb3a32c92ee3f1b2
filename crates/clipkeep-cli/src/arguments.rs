//! Argument preparation: escape expansion and stdin substitution.
//!
//! `\n`, `\t`, `\r` and `\\` are expanded in every argument until a bare
//! `--` appears; the marker itself is dropped and later arguments are sent
//! verbatim. A bare `-` before the marker stands for the client's standard
//! input, which is read once and reused for every `-`.

use std::ffi::OsStr;
use std::io::Read;

use clipkeep_types::session::Argument;

use crate::AppError;

const RAW_MARKER: &[u8] = b"--";
const STDIN_MARKER: &[u8] = b"-";

pub(crate) fn prepare_arguments<'a, I, R>(raw: I, stdin: &mut R) -> Result<Vec<Argument>, AppError>
where
    I: IntoIterator<Item = &'a OsStr>,
    R: Read,
{
    let mut stdin_bytes: Option<Vec<u8>> = None;
    let mut expand = true;
    let mut prepared = Vec::new();
    for argument in raw {
        let bytes = os_bytes(argument);
        if expand && bytes == RAW_MARKER {
            expand = false;
            continue;
        }
        if expand && bytes == STDIN_MARKER {
            let data = match &stdin_bytes {
                Some(data) => data.clone(),
                None => {
                    let mut data = Vec::new();
                    stdin.read_to_end(&mut data).map_err(AppError::ReadStdin)?;
                    stdin_bytes = Some(data.clone());
                    data
                }
            };
            prepared.push(Argument::from_bytes(data));
            continue;
        }
        let value = if expand { expand_escapes(&bytes) } else { bytes };
        prepared.push(Argument::from_bytes(value));
    }
    Ok(prepared)
}

/// Expands `\n`, `\t`, `\r` and `\\`. Other backslash sequences and a
/// trailing backslash are kept as written.
pub(crate) fn expand_escapes(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    let mut bytes = input.iter().copied();
    while let Some(byte) = bytes.next() {
        if byte != b'\\' {
            output.push(byte);
            continue;
        }
        match bytes.next() {
            Some(b'n') => output.push(b'\n'),
            Some(b't') => output.push(b'\t'),
            Some(b'r') => output.push(b'\r'),
            Some(b'\\') => output.push(b'\\'),
            Some(other) => output.extend_from_slice(&[b'\\', other]),
            None => output.push(b'\\'),
        }
    }
    output
}

#[cfg(unix)]
fn os_bytes(argument: &OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    argument.as_bytes().to_vec()
}

#[cfg(not(unix))]
fn os_bytes(argument: &OsStr) -> Vec<u8> {
    argument.to_string_lossy().into_owned().into_bytes()
}
