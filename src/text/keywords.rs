use std::collections::HashSet;

const MIN_KEYWORD_CHARS: usize = 4;

/// Splits text into lower-cased content words with stop words removed.
#[derive(Debug, Clone, Default)]
pub struct KeywordExtractor {
    stopwords: HashSet<String>,
}

impl KeywordExtractor {
    pub fn new(stopwords: HashSet<String>) -> Self {
        Self { stopwords }
    }

    /// Unique keywords in order of first appearance.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let normalized = text
            .to_lowercase()
            .chars()
            .map(|character| {
                if character.is_alphanumeric() {
                    character
                } else {
                    ' '
                }
            })
            .collect::<String>();

        let mut seen = HashSet::<&str>::new();
        let mut keywords = Vec::new();
        for token in normalized.split_whitespace() {
            if token.chars().count() < MIN_KEYWORD_CHARS || self.stopwords.contains(token) {
                continue;
            }
            if seen.insert(token) {
                keywords.push(token.to_string());
            }
        }

        keywords
    }
}
