//! Request deserialization for the session handler.
//!
//! A request line is a [`CommandRequest`] from `clipkeep-types`; this module
//! bounds and parses it and decodes binary arguments into raw bytes for the
//! engine.

use clipkeep_types::session::{CommandRequest, SessionRole};

use super::errors::DispatchError;

/// A validated request with its arguments decoded.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ParsedRequest {
    /// Trimmed command verb.
    pub command: String,
    /// Raw argument bytes.
    pub arguments: Vec<Vec<u8>>,
    /// Requested session role.
    pub session: SessionRole,
}

impl ParsedRequest {
    /// Parses a JSONL line into a request.
    ///
    /// Trailing whitespace (including the newline delimiter) is trimmed
    /// before parsing.
    ///
    /// # Errors
    ///
    /// Returns `MalformedJsonl` when the line is empty or not a request,
    /// `InvalidStructure` when the command verb is blank and
    /// `InvalidPayload` when a binary argument is not valid base64.
    pub fn parse(line: &[u8]) -> Result<Self, DispatchError> {
        let trimmed = trim_trailing_whitespace(line);
        if trimmed.is_empty() {
            return Err(DispatchError::malformed("empty request line"));
        }
        let request: CommandRequest =
            serde_json::from_slice(trimmed).map_err(DispatchError::from_json_error)?;
        let command = request.command.trim();
        if command.is_empty() {
            return Err(DispatchError::invalid_structure("command field is empty"));
        }
        let arguments = request
            .arguments
            .into_iter()
            .map(|argument| argument.into_bytes())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            command: command.to_owned(),
            arguments,
            session: request.session,
        })
    }
}

/// Trims trailing ASCII whitespace from a byte slice.
fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn parses_minimal_request() {
        let request = ParsedRequest::parse(br#"{"command":"count"}"#).expect("parse minimal");
        assert_eq!(request.command, "count");
        assert!(request.arguments.is_empty());
        assert_eq!(request.session, SessionRole::Oneshot);
    }

    #[rstest]
    fn decodes_text_and_binary_arguments() {
        let line = br#"{"command":"write","arguments":["image/png",{"base64":"/wAQ"}],"session":"oneshot"}"#;
        let request = ParsedRequest::parse(line).expect("parse");
        assert_eq!(
            request.arguments,
            vec![b"image/png".to_vec(), vec![0xff, 0x00, 0x10]]
        );
    }

    #[rstest]
    fn interactive_role_is_kept() {
        let request = ParsedRequest::parse(br#"{"command":"monitoring","session":"interactive"}"#)
            .expect("parse");
        assert_eq!(request.session, SessionRole::Interactive);
    }

    #[rstest]
    fn trims_whitespace_around_the_verb() {
        let request =
            ParsedRequest::parse(b"{\"command\":\" read \"}  \n").expect("parse with whitespace");
        assert_eq!(request.command, "read");
    }

    #[rstest]
    #[case(b"".as_slice())]
    #[case(b"   \n".as_slice())]
    #[case(b"not json".as_slice())]
    #[case(br#"{"arguments":[]}"#.as_slice())]
    fn rejects_malformed_lines(#[case] line: &[u8]) {
        assert!(matches!(
            ParsedRequest::parse(line),
            Err(DispatchError::MalformedJsonl { .. })
        ));
    }

    #[rstest]
    fn rejects_blank_command() {
        assert!(matches!(
            ParsedRequest::parse(br#"{"command":"  "}"#),
            Err(DispatchError::InvalidStructure { .. })
        ));
    }

    #[rstest]
    fn rejects_bad_base64() {
        assert!(matches!(
            ParsedRequest::parse(br#"{"command":"write","arguments":[{"base64":"!!"}]}"#),
            Err(DispatchError::InvalidPayload(_))
        ));
    }
}
