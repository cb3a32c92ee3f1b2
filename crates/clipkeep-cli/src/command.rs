//! Command modelling for clipkeep requests.
//!
//! This module turns the words captured after the configuration flags into
//! the JSONL request sent to the server so the main runtime remains focused
//! on IO orchestration.

use std::ffi::OsString;
use std::io::{Read, Write};

use clipkeep_types::session::CommandRequest;

use crate::AppError;
use crate::arguments::prepare_arguments;

#[derive(Debug)]
pub(crate) struct CommandInvocation {
    pub(crate) request: CommandRequest,
}

impl CommandInvocation {
    /// Builds the request from the command word and its raw arguments.
    pub(crate) fn from_words<R: Read>(words: &[OsString], stdin: &mut R) -> Result<Self, AppError> {
        let Some((name, arguments)) = words.split_first() else {
            return Err(AppError::InvalidCommand {
                name: String::new(),
            });
        };
        let command = name
            .to_str()
            .ok_or_else(|| AppError::InvalidCommand {
                name: name.to_string_lossy().into_owned(),
            })?
            .to_owned();
        let arguments = prepare_arguments(arguments.iter().map(OsString::as_os_str), stdin)?;
        Ok(Self {
            request: CommandRequest::new(command, arguments),
        })
    }
}

/// Writes the request as a single JSON line.
pub(crate) fn write_jsonl<W>(request: &CommandRequest, writer: &mut W) -> Result<(), AppError>
where
    W: Write,
{
    serde_json::to_writer(&mut *writer, request).map_err(AppError::SerialiseRequest)?;
    writer.write_all(b"\n").map_err(AppError::SendRequest)?;
    writer.flush().map_err(AppError::SendRequest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    #[test]
    fn serialises_a_oneshot_request_line() {
        let words: Vec<OsString> = ["read", "text/plain", "0"]
            .iter()
            .map(OsString::from)
            .collect();
        let invocation =
            CommandInvocation::from_words(&words, &mut io::empty()).expect("invocation");
        let mut buffer: Vec<u8> = Vec::new();
        write_jsonl(&invocation.request, &mut buffer).expect("serialises request");
        assert_eq!(
            String::from_utf8(buffer).expect("request utf8"),
            "{\"command\":\"read\",\"arguments\":[\"text/plain\",\"0\"],\"session\":\"oneshot\"}\n"
        );
    }

    #[test]
    fn binary_stdin_travels_as_base64() {
        let words: Vec<OsString> = ["write", "image/png", "-"]
            .iter()
            .map(OsString::from)
            .collect();
        let mut stdin = Cursor::new(vec![0x89, 0x50, 0xff]);
        let invocation = CommandInvocation::from_words(&words, &mut stdin).expect("invocation");
        let line = serde_json::to_string(&invocation.request).expect("serialise");
        assert!(line.contains("{\"base64\":\"iVD/\"}"), "line was {line}");
    }
}
