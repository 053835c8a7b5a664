// Safety phrase detector

use aho_corasick::{AhoCorasick, MatchKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

use super::lexicon::{Language, LexiconStore, TriggerLexicon};
use crate::errors::SafetyError;

/// Outcome of scanning one or more texts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub matched: bool,
    /// Distinct canonical phrases, in lexicon order
    pub matched_phrases: Vec<String>,
    /// Forced positive because scanning failed
    #[serde(default)]
    pub fail_safe: bool,
}

impl DetectionResult {
    pub fn clear() -> Self {
        Self::default()
    }

    /// Positive result used when scanning could not complete
    pub fn fail_safe(partial: Vec<String>) -> Self {
        Self {
            matched: true,
            matched_phrases: partial,
            fail_safe: true,
        }
    }

    fn from_phrases(matched_phrases: Vec<String>) -> Self {
        Self {
            matched: !matched_phrases.is_empty(),
            matched_phrases,
            fail_safe: false,
        }
    }
}

/// Automaton and phrase mapping for one language
struct LanguageIndex {
    automaton: Result<AhoCorasick, String>,
    /// Canonical phrases in lexicon order
    phrases: Vec<String>,
    /// Pattern id -> index into `phrases`
    pattern_to_phrase: Vec<usize>,
}

impl LanguageIndex {
    fn build(lexicon: &TriggerLexicon) -> Self {
        let mut patterns = Vec::new();
        let mut pattern_to_phrase = Vec::new();

        for (idx, entry) in lexicon.phrases().iter().enumerate() {
            for form in entry.surface_forms() {
                patterns.push(normalize(form));
                pattern_to_phrase.push(idx);
            }
        }

        let automaton = AhoCorasick::builder()
            .match_kind(MatchKind::Standard)
            .build(&patterns)
            .map_err(|e| e.to_string());

        if let Err(e) = &automaton {
            tracing::error!(language = %lexicon.language(), error = %e, "Failed to build phrase automaton");
        }

        Self {
            automaton,
            phrases: lexicon.canonical().map(str::to_string).collect(),
            pattern_to_phrase,
        }
    }

    /// Add the phrase indices found in `text` to `hits`
    fn collect(&self, text: &str, hits: &mut BTreeSet<usize>) -> Result<(), SafetyError> {
        let automaton = self
            .automaton
            .as_ref()
            .map_err(|e| SafetyError::DetectionFailure(e.clone()))?;

        let normalized = normalize(text);
        let matches = automaton
            .try_find_overlapping_iter(normalized.as_str())
            .map_err(|e| SafetyError::DetectionFailure(e.to_string()))?;

        for m in matches {
            let phrase = self
                .pattern_to_phrase
                .get(m.pattern().as_usize())
                .copied()
                .ok_or_else(|| {
                    SafetyError::DetectionFailure(format!("unknown pattern {}", m.pattern().as_usize()))
                })?;
            hits.insert(phrase);
        }

        Ok(())
    }

    fn phrases_for(&self, hits: &BTreeSet<usize>) -> Vec<String> {
        hits.iter()
            .filter_map(|&idx| self.phrases.get(idx).cloned())
            .collect()
    }
}

/// Case-insensitive substring detector over the lexicon store.
///
/// One Aho-Corasick automaton per language covers every canonical phrase
/// and its variants, so a scan is a single pass over the text regardless of
/// lexicon size. Detection has no side effects.
pub struct Detector {
    indexes: BTreeMap<Language, LanguageIndex>,
    default_language: Language,
}

impl Detector {
    pub fn new(store: &LexiconStore) -> Self {
        let indexes = Language::ALL
            .iter()
            .map(|&language| (language, LanguageIndex::build(store.phrases(language))))
            .collect();

        Self {
            indexes,
            default_language: store.default_language(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(&LexiconStore::builtin())
    }

    pub fn default_language(&self) -> Language {
        self.default_language
    }

    fn index(&self, language: Language) -> Result<&LanguageIndex, SafetyError> {
        self.indexes
            .get(&language)
            .or_else(|| self.indexes.get(&self.default_language))
            .ok_or_else(|| SafetyError::DetectionFailure(format!("no index for {}", language)))
    }

    /// Scan `text`, surfacing engine faults
    pub fn scan(&self, text: &str, language: Language) -> Result<DetectionResult, SafetyError> {
        if text.trim().is_empty() {
            return Ok(DetectionResult::clear());
        }

        let index = self.index(language)?;
        let mut hits = BTreeSet::new();
        index.collect(text, &mut hits)?;

        Ok(DetectionResult::from_phrases(index.phrases_for(&hits)))
    }

    /// Scan `text`; any fault escalates instead of passing the text through
    pub fn detect(&self, text: &str, language: Language) -> DetectionResult {
        match self.scan(text, language) {
            Ok(result) => {
                if result.matched {
                    tracing::debug!(
                        language = %language,
                        phrases = ?result.matched_phrases,
                        text = %fingerprint(text),
                        "Safety phrases detected"
                    );
                }
                result
            }
            Err(e) => {
                tracing::error!(language = %language, error = %e, text = %fingerprint(text), "Detection failed, escalating");
                DetectionResult::fail_safe(Vec::new())
            }
        }
    }

    /// Scan several fields independently and merge in lexicon order.
    ///
    /// A phrase never matches across two fields.
    pub fn detect_all<'a, I>(&self, texts: I, language: Language) -> DetectionResult
    where
        I: IntoIterator<Item = &'a str>,
    {
        let index = match self.index(language) {
            Ok(index) => index,
            Err(e) => {
                tracing::error!(language = %language, error = %e, "Detection failed, escalating");
                return DetectionResult::fail_safe(Vec::new());
            }
        };

        let mut hits = BTreeSet::new();
        for text in texts {
            if text.trim().is_empty() {
                continue;
            }
            if let Err(e) = index.collect(text, &mut hits) {
                tracing::error!(language = %language, error = %e, text = %fingerprint(text), "Detection failed, escalating");
                return DetectionResult::fail_safe(index.phrases_for(&hits));
            }
        }

        DetectionResult::from_phrases(index.phrases_for(&hits))
    }
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("languages", &self.indexes.keys().collect::<Vec<_>>())
            .field("default_language", &self.default_language)
            .finish()
    }
}

/// Lowercase, unify apostrophes and collapse whitespace runs to one space
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_space && !out.is_empty() {
                out.push(' ');
            }
            in_space = true;
            continue;
        }
        in_space = false;

        match ch {
            '\u{2018}' | '\u{2019}' | '\u{02BC}' => out.push('\''),
            _ => out.extend(ch.to_lowercase()),
        }
    }

    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Short stable digest of user text for logs
pub fn fingerprint(text: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(text.as_bytes()));
    digest[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> Detector {
        Detector::builtin()
    }

    #[test]
    fn test_detects_phrase_any_casing() {
        let detector = detector();

        let result = detector.detect("I'm thinking about SUICIDE", Language::En);
        assert!(result.matched);
        assert_eq!(result.matched_phrases, vec!["suicide".to_string()]);

        assert!(detector.detect("SuIcIdE", Language::En).matched);
    }

    #[test]
    fn test_clean_text_does_not_match() {
        let result = detector().detect("I had a great day today", Language::En);
        assert!(!result.matched);
        assert!(result.matched_phrases.is_empty());
        assert!(!result.fail_safe);
    }

    #[test]
    fn test_empty_text_never_matches() {
        let detector = detector();
        for language in Language::ALL {
            assert!(!detector.detect("", language).matched);
            assert!(!detector.detect("  \n\t", language).matched);
        }
    }

    #[test]
    fn test_reports_all_phrases_in_lexicon_order() {
        let result = detector().detect("I feel like giving up and want to die", Language::En);
        assert!(result.matched);
        assert_eq!(
            result.matched_phrases,
            vec!["die".to_string(), "give up".to_string(), "want to die".to_string()]
        );
    }

    #[test]
    fn test_order_independent_of_text_layout() {
        let detector = detector();
        let a = detector.detect("hopeless and worthless", Language::En);
        let b = detector.detect("worthless and hopeless", Language::En);
        assert_eq!(a, b);
        assert_eq!(a.matched_phrases, vec!["worthless".to_string(), "hopeless".to_string()]);
    }

    #[test]
    fn test_whitespace_and_apostrophes_are_normalized() {
        let detector = detector();

        let result = detector.detect("I just want  to\ndie", Language::En);
        assert!(result.matched_phrases.contains(&"want to die".to_string()));

        let result = detector.detect("I don\u{2019}t want to live", Language::En);
        assert!(result.matched_phrases.contains(&"don't want to live".to_string()));
    }

    #[test]
    fn test_japanese_exact_substring() {
        let result = detector().detect("もう死にたいと思う", Language::Ja);
        assert!(result.matched);
        assert_eq!(result.matched_phrases, vec!["死にたい".to_string()]);

        assert!(!detector().detect("今日はいい天気です", Language::Ja).matched);
    }

    #[test]
    fn test_detect_is_deterministic() {
        let detector = detector();
        let text = "No hope, no future, I can't take it";
        let first = detector.detect(text, Language::En);
        for _ in 0..10 {
            assert_eq!(detector.detect(text, Language::En), first);
        }
    }

    #[test]
    fn test_detect_all_does_not_span_fields() {
        let detector = detector();
        let result = detector.detect_all(["I want to", "die"], Language::En);
        assert_eq!(result.matched_phrases, vec!["die".to_string()]);

        let result = detector.detect_all(["hopeless", "", "give up"], Language::En);
        assert_eq!(result.matched_phrases, vec!["give up".to_string(), "hopeless".to_string()]);
    }

    #[test]
    fn test_broken_index_fails_safe() {
        let mut detector = detector();
        detector.indexes.insert(
            Language::En,
            LanguageIndex {
                automaton: Err("simulated build failure".to_string()),
                phrases: vec!["kill".to_string()],
                pattern_to_phrase: vec![0],
            },
        );

        assert!(detector.scan("hello", Language::En).is_err());

        let result = detector.detect("hello", Language::En);
        assert!(result.matched);
        assert!(result.fail_safe);

        let result = detector.detect_all(["hello"], Language::En);
        assert!(result.fail_safe);

        // Empty text is still clear; there is nothing to miss
        assert!(!detector.detect("", Language::En).matched);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Hello   WORLD \n"), "hello world");
        assert_eq!(normalize("Can\u{2019}t"), "can't");
        assert_eq!(normalize("死にたい"), "死にたい");
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_eq!(fingerprint("abc").len(), 12);
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
    }
}
