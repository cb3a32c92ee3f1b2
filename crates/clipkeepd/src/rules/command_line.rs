//! Shell-style word splitting without a shell.
//!
//! Command lines typed by users (`action` programs, edited confirmations,
//! rule `command` strings, `eval` scripts) are split into argv vectors here.
//! Quotes and backslashes group words; an unquoted `|` separates chain
//! stages; an unquoted newline or `;` ends a script command; `#` at the start
//! of a word begins a comment. Nothing is expanded besides escapes.

use thiserror::Error;

/// Failures while splitting a command line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandLineError {
    /// A quote was opened but never closed.
    #[error("unterminated {quote} quote")]
    UnterminatedQuote {
        /// The quote character.
        quote: char,
    },
    /// A `|` had no command on one of its sides.
    #[error("empty command in pipeline")]
    EmptyStage,
    /// The line held no command at all.
    #[error("empty command line")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Pipe,
    Break,
}

#[derive(Default)]
struct Tokenizer {
    tokens: Vec<Token>,
    word: String,
    in_word: bool,
}

impl Tokenizer {
    fn push_char(&mut self, ch: char) {
        self.word.push(ch);
        self.in_word = true;
    }

    fn finish_word(&mut self) {
        if self.in_word {
            self.tokens.push(Token::Word(std::mem::take(&mut self.word)));
            self.in_word = false;
        }
    }

    fn push_token(&mut self, token: Token) {
        self.finish_word();
        self.tokens.push(token);
    }
}

fn tokenize(line: &str) -> Result<Vec<Token>, CommandLineError> {
    let mut state = Tokenizer::default();
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' => {
                state.in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(inner) => state.word.push(inner),
                        None => return Err(CommandLineError::UnterminatedQuote { quote: '\'' }),
                    }
                }
            }
            '"' => {
                state.in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped) => state.word.push(unescape(escaped)),
                            None => {
                                return Err(CommandLineError::UnterminatedQuote { quote: '"' });
                            }
                        },
                        Some(inner) => state.word.push(inner),
                        None => return Err(CommandLineError::UnterminatedQuote { quote: '"' }),
                    }
                }
            }
            '\\' => match chars.next() {
                Some('\n') | None => {}
                Some(escaped) => state.push_char(escaped),
            },
            '#' if !state.in_word => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        state.push_token(Token::Break);
                        break;
                    }
                }
            }
            '|' => state.push_token(Token::Pipe),
            '\n' | ';' => state.push_token(Token::Break),
            other if other.is_whitespace() => state.finish_word(),
            other => state.push_char(other),
        }
    }
    state.finish_word();
    Ok(state.tokens)
}

const fn unescape(ch: char) -> char {
    match ch {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        other => other,
    }
}

/// Splits a single command into words. A bare `|` becomes the word `"|"`.
///
/// # Errors
///
/// Fails on unterminated quotes.
pub fn split_words(line: &str) -> Result<Vec<String>, CommandLineError> {
    Ok(tokenize(line)?
        .into_iter()
        .filter_map(|token| match token {
            Token::Word(word) => Some(word),
            Token::Pipe => Some("|".to_owned()),
            Token::Break => None,
        })
        .collect())
}

/// Splits a script into commands, one per line or `;`-separated segment.
/// Blank lines and comments yield nothing.
///
/// # Errors
///
/// Fails on unterminated quotes.
pub fn split_script(script: &str) -> Result<Vec<Vec<String>>, CommandLineError> {
    let mut commands = Vec::new();
    let mut current = Vec::new();
    for token in tokenize(script)? {
        match token {
            Token::Word(word) => current.push(word),
            Token::Pipe => current.push("|".to_owned()),
            Token::Break => {
                if !current.is_empty() {
                    commands.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.is_empty() {
        commands.push(current);
    }
    Ok(commands)
}

/// Parses `prog args | prog args` into chain stages.
///
/// # Errors
///
/// Fails on unterminated quotes, empty stages or an empty line.
pub fn parse_chain(line: &str) -> Result<Vec<Vec<String>>, CommandLineError> {
    let mut stages = Vec::new();
    let mut current = Vec::new();
    let mut saw_pipe = false;
    for token in tokenize(line)? {
        match token {
            Token::Word(word) => current.push(word),
            Token::Pipe => {
                if current.is_empty() {
                    return Err(CommandLineError::EmptyStage);
                }
                stages.push(std::mem::take(&mut current));
                saw_pipe = true;
            }
            Token::Break => {}
        }
    }
    if current.is_empty() {
        return Err(if saw_pipe {
            CommandLineError::EmptyStage
        } else {
            CommandLineError::Empty
        });
    }
    stages.push(current);
    Ok(stages)
}

/// Renders chain stages back into a command line that [`parse_chain`]
/// reads as the same stages.
#[must_use]
pub fn format_chain(stages: &[Vec<String>]) -> String {
    stages
        .iter()
        .map(|stage| {
            stage
                .iter()
                .map(|word| quote(word))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word.chars().all(|ch| {
            ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '%' | '=' | '+' | ',' | '@')
        });
    if plain {
        word.to_owned()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| (*item).to_owned()).collect()
    }

    #[rstest]
    #[case("curl -s %1", &["curl", "-s", "%1"])]
    #[case("echo 'a b' \"c d\"", &["echo", "a b", "c d"])]
    #[case("printf \"x\\ty\"", &["printf", "x\ty"])]
    #[case("echo a\\ b", &["echo", "a b"])]
    #[case("echo ''", &["echo", ""])]
    #[case("add x # trailing comment", &["add", "x"])]
    fn splits_words(#[case] line: &str, #[case] expected: &[&str]) {
        assert_eq!(split_words(line).expect("line should split"), words(expected));
    }

    #[test]
    fn reports_unterminated_quotes() {
        assert_eq!(
            split_words("echo 'oops"),
            Err(CommandLineError::UnterminatedQuote { quote: '\'' })
        );
    }

    #[test]
    fn parses_pipelines() {
        let stages = parse_chain("curl -s %1|links -dump -stdin").expect("chain");
        assert_eq!(
            stages,
            vec![words(&["curl", "-s", "%1"]), words(&["links", "-dump", "-stdin"])]
        );
        assert_eq!(parse_chain("echo '|'").expect("quoted pipe"), vec![words(&["echo", "|"])]);
    }

    #[rstest]
    #[case("| tr a b")]
    #[case("cat |")]
    #[case("cat | | tr a b")]
    fn rejects_empty_stages(#[case] line: &str) {
        assert_eq!(parse_chain(line), Err(CommandLineError::EmptyStage));
    }

    #[test]
    fn rejects_blank_lines() {
        assert_eq!(parse_chain("  "), Err(CommandLineError::Empty));
    }

    #[test]
    fn splits_scripts_into_commands() {
        let script = "# setup\nadd one\n\ntab notes; add 'two words'\n";
        assert_eq!(
            split_script(script).expect("script"),
            vec![
                words(&["add", "one"]),
                words(&["tab", "notes"]),
                words(&["add", "two words"]),
            ]
        );
    }

    #[test]
    fn formatted_chains_parse_back() {
        let stages = vec![
            words(&["sh", "-c", "echo 'hi' | wc"]),
            words(&["tr", "a-z", "A-Z"]),
        ];
        let line = format_chain(&stages);
        assert_eq!(parse_chain(&line).expect("round trip"), stages);
    }
}
