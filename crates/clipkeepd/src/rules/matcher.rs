//! Rule predicates and placeholder substitution.

use clipkeep_types::MimeData;

use super::model::Rule;

/// What a predicate captured from a matching item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleMatch {
    /// Whole item text, substituted for `%1`.
    pub text: String,
    /// Capture groups 1.. of the content pattern, substituted for `%2`..`%9`.
    pub captures: Vec<String>,
}

impl RuleMatch {
    /// A match carrying only the item text.
    #[must_use]
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            captures: Vec::new(),
        }
    }
}

impl Rule {
    /// Evaluates the predicate against `item` and the optional window title.
    ///
    /// Every configured constraint must pass: the input format must be
    /// present, the content pattern must be found in the item text and the
    /// window pattern must be found in the title. A rule with a window
    /// pattern never matches content without a title.
    #[must_use]
    pub fn matches(&self, item: &MimeData, window_title: Option<&str>) -> Option<RuleMatch> {
        if !self.enabled {
            return None;
        }
        if let Some(input) = &self.input
            && !item.contains(input)
        {
            return None;
        }
        if let Some(window) = &self.window {
            let title = window_title?;
            if !window.is_match(title) {
                return None;
            }
        }
        let text = item.text_or_empty();
        let captures = match &self.content {
            None => Vec::new(),
            Some(pattern) => {
                let found = pattern.captures(&text)?;
                found
                    .iter()
                    .skip(1)
                    .map(|group| group.map_or_else(String::new, |group| group.as_str().to_owned()))
                    .collect()
            }
        };
        Some(RuleMatch { text, captures })
    }

    /// Bytes fed to the chain's stdin: the input format's payload when the
    /// rule names one, the item text otherwise.
    #[must_use]
    pub fn input_bytes(&self, item: &MimeData) -> Vec<u8> {
        self.input
            .as_deref()
            .and_then(|mime| item.get(mime))
            .map_or_else(|| item.text_or_empty().into_bytes(), <[u8]>::to_vec)
    }
}

/// Replaces placeholders in one argument.
///
/// `%1` is the whole item text, `%2`..`%9` the capture groups 1..8, `%%` a
/// literal percent sign. Numbered placeholders without a matching capture
/// stay as written.
#[must_use]
pub fn substitute(template: &str, found: &RuleMatch) -> String {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            output.push(ch);
            continue;
        }
        match chars.peek().copied() {
            Some('%') => {
                chars.next();
                output.push('%');
            }
            Some('1') => {
                chars.next();
                output.push_str(&found.text);
            }
            Some(digit @ '2'..='9') => {
                chars.next();
                let group = digit as usize - '2' as usize;
                match found.captures.get(group) {
                    Some(capture) => output.push_str(capture),
                    None => {
                        output.push('%');
                        output.push(digit);
                    }
                }
            }
            _ => output.push('%'),
        }
    }
    output
}

/// Applies [`substitute`] to every word of every stage.
#[must_use]
pub fn substitute_stages(stages: &[Vec<String>], found: &RuleMatch) -> Vec<Vec<String>> {
    stages
        .iter()
        .map(|stage| stage.iter().map(|word| substitute(word, found)).collect())
        .collect()
}

/// True when any word references the item text through `%1`.
#[must_use]
pub fn uses_text_placeholder(stages: &[Vec<String>]) -> bool {
    stages.iter().flatten().any(|word| {
        let mut chars = word.chars();
        while let Some(ch) = chars.next() {
            if ch == '%' {
                match chars.next() {
                    Some('1') => return true,
                    Some(_) | None => {}
                }
            }
        }
        false
    })
}
