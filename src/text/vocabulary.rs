use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::KeywordExtractor;
use crate::config::VocabularyConfig;

const DEFAULT_STOPWORDS_EN: &str = include_str!("../../data/stopwords_en.txt");
const DEFAULT_STOPWORDS_SK: &str = include_str!("../../data/stopwords_sk.txt");
const DEFAULT_GENERIC_TERMS: &str = include_str!("../../data/generic_terms.txt");
const DEFAULT_ACTION_VERBS: &str = include_str!("../../data/action_verbs.txt");

const ENGLISH_ENDINGS: &[&str] = &["", "s", "es", "ed", "d", "ing", "in", "out", "up", "on"];

/// Word lists shared by the analyzers of one process. Passed explicitly;
/// nothing here is global.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    pub extractor: KeywordExtractor,
    pub generic_terms: HashSet<String>,
    pub action_verbs: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        let mut stopwords = parse_word_list(DEFAULT_STOPWORDS_EN);
        stopwords.extend(parse_word_list(DEFAULT_STOPWORDS_SK));

        Self {
            extractor: KeywordExtractor::new(stopwords),
            generic_terms: parse_word_list(DEFAULT_GENERIC_TERMS),
            action_verbs: sorted(parse_word_list(DEFAULT_ACTION_VERBS)),
        }
    }
}

impl Vocabulary {
    pub fn load(config: &VocabularyConfig) -> Result<Self> {
        let mut vocabulary = Self::default();

        if !config.stopword_paths.is_empty() {
            let mut stopwords = HashSet::new();
            for path in &config.stopword_paths {
                stopwords.extend(read_word_list(path)?);
            }
            vocabulary.extractor = KeywordExtractor::new(stopwords);
        }
        if let Some(path) = &config.generic_terms_path {
            vocabulary.generic_terms = read_word_list(path)?;
        }
        if let Some(path) = &config.action_verbs_path {
            vocabulary.action_verbs = sorted(read_word_list(path)?);
        }

        info!(
            generic_terms = vocabulary.generic_terms.len(),
            action_verbs = vocabulary.action_verbs.len(),
            "loaded vocabulary"
        );
        Ok(vocabulary)
    }

    pub fn extract_keywords(&self, text: &str) -> Vec<String> {
        self.extractor.extract(text)
    }

    pub fn is_generic(&self, keyword: &str) -> bool {
        self.generic_terms.contains(keyword)
    }

    /// True when some word of `text` is a listed verb, one of its English
    /// inflections, or starts with a listed `stem*`.
    pub fn contains_action_verb(&self, text: &str) -> bool {
        text.to_lowercase()
            .split(|character: char| !character.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .any(|word| self.action_verbs.iter().any(|verb| matches_verb(word, verb)))
    }
}

fn matches_verb(word: &str, verb: &str) -> bool {
    if let Some(stem) = verb.strip_suffix('*') {
        return word.starts_with(stem);
    }

    if let Some(rest) = word.strip_prefix(verb) {
        if ENGLISH_ENDINGS.contains(&rest) {
            return true;
        }
        // drop -> dropped, log -> logging
        let mut chars = rest.chars();
        if let (Some(first), Some(last)) = (chars.next(), verb.chars().last())
            && first == last
            && matches!(chars.as_str(), "ed" | "ing")
        {
            return true;
        }
    }
    if let Some(base) = verb.strip_suffix('e')
        && word.strip_prefix(base) == Some("ing")
    {
        return true;
    }
    if let Some(base) = verb.strip_suffix('y')
        && matches!(word.strip_prefix(base), Some("ies" | "ied"))
    {
        return true;
    }
    false
}

/// One lower-cased entry per line; blank lines and `#` comments are ignored.
fn parse_word_list(raw: &str) -> HashSet<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_lowercase)
        .collect()
}

fn read_word_list(path: &Path) -> Result<HashSet<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read word list {}", path.display()))?;
    Ok(parse_word_list(&raw))
}

fn sorted(words: HashSet<String>) -> Vec<String> {
    let mut words = words.into_iter().collect::<Vec<String>>();
    words.sort();
    words
}
