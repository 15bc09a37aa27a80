use super::EntityRecognizer;
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

/// Runs of capitalized words on one line, e.g. `Cyprus University of Technology`
/// is matched as `Cyprus University` and `Technology`.
static CAPITALIZED_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\p{Lu}[\p{L}\p{N}'-]+(?:[ \t]+\p{Lu}[\p{L}\p{N}'-]+)*")
        .expect("capitalized run pattern is valid")
});

/// Treats capitalized spans as entity mentions.
///
/// A single capitalized word at the start of a sentence is ordinary
/// capitalization and is skipped; a multi-word run is kept wherever it appears.
/// One-letter words (`I`, `A`) are never entities.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapitalizationEntityRecognizer;

impl CapitalizationEntityRecognizer {
    pub fn new() -> Self {
        Self
    }
}

impl EntityRecognizer for CapitalizationEntityRecognizer {
    fn entities(&self, text: &str) -> Vec<Range<usize>> {
        CAPITALIZED_RUN
            .find_iter(text)
            .filter(|m| {
                let multi_word = m.as_str().split_whitespace().nth(1).is_some();
                multi_word || !is_sentence_initial(text, m.start())
            })
            .map(|m| m.range())
            .collect()
    }
}

fn is_sentence_initial(text: &str, position: usize) -> bool {
    let before = text[..position].trim_end_matches(|c: char| c.is_whitespace() || "\"'(".contains(c));
    match before.chars().last() {
        None => true,
        Some(c) => matches!(c, '.' | '!' | '?' | ':'),
    }
}
