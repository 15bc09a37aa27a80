use super::SentenceSplitter;
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

/// Terminal punctuation (with closing quotes or brackets) followed by
/// whitespace or end of input, or a blank line.
static BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([.!?]+["')\]]*)(?:\s+|$)|\n[ \t]*\n\s*"#).expect("boundary pattern is valid")
});

/// Splits on sentence-final punctuation and paragraph breaks.
///
/// Decimal numbers such as `3.14` are not split because the period is not
/// followed by whitespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleSentenceSplitter;

impl RuleSentenceSplitter {
    pub fn new() -> Self {
        Self
    }
}

impl SentenceSplitter for RuleSentenceSplitter {
    fn sentences(&self, text: &str) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        let mut start = 0;

        for caps in BOUNDARY.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let end = caps.get(1).map(|p| p.end()).unwrap_or(whole.start());
            push_trimmed(text, start..end, &mut spans);
            start = whole.end();
        }
        push_trimmed(text, start..text.len(), &mut spans);

        spans
    }
}

fn push_trimmed(text: &str, range: Range<usize>, spans: &mut Vec<Range<usize>>) {
    if range.start >= range.end {
        return;
    }
    let slice = &text[range.clone()];
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.len() - slice.trim_end().len();
    if leading + trailing < slice.len() {
        spans.push(range.start + leading..range.end - trailing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(text: &str) -> Vec<&str> {
        RuleSentenceSplitter
            .sentences(text)
            .into_iter()
            .map(|r| &text[r])
            .collect()
    }

    #[test]
    fn test_splits_on_terminal_punctuation() {
        assert_eq!(
            split("The sky is blue. Water is wet. Fire is hot."),
            vec!["The sky is blue.", "Water is wet.", "Fire is hot."]
        );
    }

    #[test]
    fn test_keeps_decimals_and_quotes() {
        assert_eq!(
            split("Pi is 3.14 roughly. He said \"stop!\" Then left"),
            vec!["Pi is 3.14 roughly.", "He said \"stop!\"", "Then left"]
        );
    }

    #[test]
    fn test_blank_line_ends_a_sentence() {
        assert_eq!(
            split("Heading without period\n\nBody text here."),
            vec!["Heading without period", "Body text here."]
        );
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        assert!(split("").is_empty());
        assert!(split("   \n\n  ").is_empty());
    }
}
