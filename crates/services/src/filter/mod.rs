use std::collections::{HashMap, HashSet};

use meetscribe_config::FilterSettings;
use regex::Regex;
use tracing::debug;

/// Utterances the speech engine emits that carry no information. Matched
/// against the whole trimmed segment text.
const BASE_NON_INFORMATIVE_PATTERNS: &[&str] = &[
    r"^\[BLANK_AUDIO\]$",
    r"^<no audio>$",
    r"^<inaudible>$",
    r"^<>$",
    r"^\s*<3\s*$",
    r"^\s*$",
    r"^>+$",
    r"^<+$",
];

/// A pluggable filter stage. Implementations must be pure: the decision may
/// depend only on the text, the language and the predicate's own config.
pub trait SegmentPredicate: Send + Sync {
    fn name(&self) -> &'static str;
    /// `true` keeps the segment.
    fn keep(&self, text: &str, language: Option<&str>) -> bool;
}

/// Rejects segments dominated by a single repeated character
/// ("aaaaaaaa", "??????"), a common hallucination shape.
pub struct CharRunPredicate {
    max_run: usize,
}

impl CharRunPredicate {
    pub fn new(max_run: usize) -> Self {
        Self { max_run }
    }
}

impl SegmentPredicate for CharRunPredicate {
    fn name(&self) -> &'static str {
        "char_run"
    }

    fn keep(&self, text: &str, _language: Option<&str>) -> bool {
        let mut run = 0usize;
        let mut prev: Option<char> = None;
        for c in text.chars() {
            if Some(c) == prev {
                run += 1;
                if run > self.max_run {
                    return false;
                }
            } else {
                prev = Some(c);
                run = 1;
            }
        }
        true
    }
}

/// Decides whether a settled segment is informative enough to persist.
///
/// Stages run in order and short-circuit on the first failure: minimum
/// length, non-informative patterns, minimum real-word count, then any
/// registered predicates. Pure and side-effect-free.
pub struct FilterEngine {
    min_character_length: usize,
    min_real_words: usize,
    patterns: Vec<Regex>,
    stopwords: HashMap<String, HashSet<String>>,
    predicates: Vec<Box<dyn SegmentPredicate>>,
}

pub struct FilterEngineBuilder {
    min_character_length: usize,
    min_real_words: usize,
    patterns: Vec<String>,
    stopwords: HashMap<String, HashSet<String>>,
    predicates: Vec<Box<dyn SegmentPredicate>>,
}

impl FilterEngineBuilder {
    pub fn min_character_length(mut self, n: usize) -> Self {
        self.min_character_length = n;
        self
    }

    pub fn min_real_words(mut self, n: usize) -> Self {
        self.min_real_words = n;
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    pub fn stopwords(
        mut self,
        language: impl Into<String>,
        words: impl IntoIterator<Item = String>,
    ) -> Self {
        self.stopwords
            .entry(language.into())
            .or_default()
            .extend(words.into_iter().map(|w| w.to_lowercase()));
        self
    }

    pub fn predicate(mut self, predicate: Box<dyn SegmentPredicate>) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn build(self) -> Result<FilterEngine, regex::Error> {
        let patterns = self
            .patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FilterEngine {
            min_character_length: self.min_character_length,
            min_real_words: self.min_real_words,
            patterns,
            stopwords: self.stopwords,
            predicates: self.predicates,
        })
    }
}

impl FilterEngine {
    pub fn builder() -> FilterEngineBuilder {
        FilterEngineBuilder {
            min_character_length: 3,
            min_real_words: 1,
            patterns: BASE_NON_INFORMATIVE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            stopwords: HashMap::new(),
            predicates: Vec::new(),
        }
    }

    pub fn from_settings(settings: &FilterSettings) -> Result<Self, regex::Error> {
        let mut builder = Self::builder()
            .min_character_length(settings.min_character_length)
            .min_real_words(settings.min_real_words);
        for pattern in &settings.extra_patterns {
            builder = builder.pattern(pattern);
        }
        for (language, words) in &settings.stopwords {
            builder = builder.stopwords(language, words.iter().cloned());
        }
        if settings.max_char_run > 0 {
            builder = builder.predicate(Box::new(CharRunPredicate::new(settings.max_char_run)));
        }
        builder.build()
    }

    /// `true` if the segment passes every stage.
    pub fn keep(&self, text: &str, language: Option<&str>) -> bool {
        let text = text.trim();

        if text.chars().count() < self.min_character_length {
            debug!(%text, "Filtered: below minimum length");
            return false;
        }

        for pattern in &self.patterns {
            if pattern.is_match(text) {
                debug!(%text, pattern = %pattern.as_str(), "Filtered: non-informative pattern");
                return false;
            }
        }

        let real_words = text
            .split_whitespace()
            .filter(|w| self.is_real_word(w, language))
            .count();
        if real_words < self.min_real_words {
            debug!(%text, "Filtered: not enough real words");
            return false;
        }

        for predicate in &self.predicates {
            if !predicate.keep(text, language) {
                debug!(%text, predicate = predicate.name(), "Filtered: predicate rejected");
                return false;
            }
        }

        true
    }

    /// A real word is long enough, not a markup artifact, not a pure
    /// punctuation/symbol run and not a stopword of the segment language.
    fn is_real_word(&self, word: &str, language: Option<&str>) -> bool {
        word.chars().count() >= 3
            && !word.starts_with('<')
            && !word.starts_with('[')
            && word.chars().any(|c| c.is_alphanumeric())
            && !self.is_stopword(word, language)
    }

    fn is_stopword(&self, word: &str, language: Option<&str>) -> bool {
        let Some(language) = language else {
            return false;
        };
        self.stopwords
            .get(language)
            .is_some_and(|set| set.contains(&word.to_lowercase()))
    }
}
