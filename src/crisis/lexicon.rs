// Trigger phrase lexicons
//
// Per-language ordered phrase lists. Loaded once, never mutated.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::errors::SafetyError;

/// Language of the text being scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Ja,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::Ja];

    /// Parse a language tag such as `en`, `ja`, `en-US` or `ja_JP`
    pub fn parse(tag: &str) -> Result<Self, SafetyError> {
        let primary = tag
            .trim()
            .split(&['-', '_'][..])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match primary.as_str() {
            "en" => Ok(Language::En),
            "ja" => Ok(Language::Ja),
            _ => Err(SafetyError::UnsupportedLanguage(tag.to_string())),
        }
    }

    /// Parse a tag, falling back to the default language when unsupported
    pub fn resolve(tag: &str) -> Self {
        Self::resolve_or(tag, Language::default())
    }

    /// Parse a tag, falling back to `fallback` when unsupported
    pub fn resolve_or(tag: &str, fallback: Language) -> Self {
        match Self::parse(tag) {
            Ok(language) => language,
            Err(e) => {
                tracing::debug!(error = %e, fallback = %fallback, "Falling back to default language");
                fallback
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ja => "ja",
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::En
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical trigger phrase and the extra surface forms that count as it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPhrase {
    pub phrase: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<String>,
}

impl TriggerPhrase {
    pub fn new(phrase: &str, variants: &[&str]) -> Self {
        Self {
            phrase: phrase.to_string(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Canonical phrase first, then variants
    pub fn surface_forms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.phrase.as_str()).chain(self.variants.iter().map(String::as_str))
    }
}

/// Ordered phrase list for one language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerLexicon {
    language: Language,
    phrases: Vec<TriggerPhrase>,
}

impl TriggerLexicon {
    /// Build a lexicon, lowercasing and de-duplicating phrases in order.
    ///
    /// A phrase already seen as a canonical phrase is dropped; variants that
    /// duplicate a canonical phrase or an earlier variant are dropped too.
    pub fn new(language: Language, phrases: Vec<TriggerPhrase>) -> Self {
        let mut seen_canonical = HashSet::new();
        let mut seen_forms = HashSet::new();
        let mut normalized = Vec::with_capacity(phrases.len());

        for entry in phrases {
            let phrase = entry.phrase.trim().to_lowercase();
            if phrase.is_empty() || !seen_canonical.insert(phrase.clone()) {
                continue;
            }
            seen_forms.insert(phrase.clone());
            normalized.push(TriggerPhrase {
                phrase,
                variants: entry.variants,
            });
        }

        for entry in &mut normalized {
            entry.variants = std::mem::take(&mut entry.variants)
                .into_iter()
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty() && !seen_canonical.contains(v) && seen_forms.insert(v.clone()))
                .collect();
        }

        Self {
            language,
            phrases: normalized,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn phrases(&self) -> &[TriggerPhrase] {
        &self.phrases
    }

    /// Canonical phrases in lexicon order
    pub fn canonical(&self) -> impl Iterator<Item = &str> {
        self.phrases.iter().map(|p| p.phrase.as_str())
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

const EN_PHRASES: &[(&str, &[&str])] = &[
    ("kill", &[]),
    ("suicide", &[]),
    ("die", &[]),
    ("death", &[]),
    ("harm", &[]),
    ("hurt", &[]),
    ("end it", &["ending it"]),
    ("give up", &["giving up", "gave up", "given up"]),
    ("worthless", &[]),
    ("hopeless", &[]),
    ("can't go on", &["cannot go on", "cant go on"]),
    ("want to die", &["wanna die"]),
    ("better off dead", &[]),
    ("self harm", &[]),
    ("cut myself", &[]),
    ("overdose", &[]),
    ("jump", &[]),
    ("hang", &[]),
    ("gun", &[]),
    ("knife", &[]),
    ("pills", &[]),
    ("poison", &[]),
    ("bridge", &[]),
    ("rope", &[]),
    ("blade", &[]),
    ("razor", &[]),
    ("cutting", &[]),
    ("no point", &[]),
    ("pointless", &[]),
    ("useless", &[]),
    ("burden", &[]),
    ("hate myself", &[]),
    ("kill myself", &["killing myself"]),
    ("end my life", &["ending my life"]),
    ("take my life", &["taking my life"]),
    ("don't want to live", &["dont want to live", "do not want to live"]),
    ("tired of living", &[]),
    ("can't take it", &["cannot take it", "cant take it"]),
    ("too much pain", &[]),
    ("nobody cares", &[]),
    ("alone forever", &[]),
    ("never get better", &[]),
    ("no hope", &[]),
    ("no future", &[]),
    ("waste of space", &[]),
    ("hurt myself", &["hurting myself"]),
    ("self-harm", &[]),
];

// 死にたい appears twice upstream; the lexicon keeps the first.
const JA_PHRASES: &[(&str, &[&str])] = &[
    ("死にたい", &[]),
    ("自殺", &[]),
    ("死ぬ", &[]),
    ("殺す", &[]),
    ("害", &[]),
    ("傷つける", &[]),
    ("終わりにしたい", &[]),
    ("あきらめる", &["諦める", "あきらめた", "諦めた"]),
    ("価値がない", &[]),
    ("絶望", &[]),
    ("続けられない", &[]),
    ("死にたい", &[]),
    ("死んだ方がまし", &[]),
    ("自傷", &[]),
    ("自分を切る", &[]),
    ("薬物過剰摂取", &[]),
    ("飛び降り", &[]),
    ("首吊り", &[]),
    ("銃", &[]),
    ("ナイフ", &[]),
    ("薬", &[]),
    ("毒", &[]),
    ("橋", &[]),
    ("ロープ", &[]),
    ("刃", &[]),
    ("カミソリ", &[]),
    ("切る", &[]),
    ("意味がない", &[]),
    ("無意味", &[]),
    ("役に立たない", &[]),
    ("負担", &[]),
    ("自分が嫌い", &[]),
    ("自殺したい", &[]),
    ("命を終わらせる", &[]),
    ("命を奪う", &[]),
    ("生きたくない", &[]),
    ("生きるのに疲れた", &[]),
    ("耐えられない", &[]),
    ("痛みが多すぎる", &[]),
    ("誰も気にしない", &[]),
    ("永遠に一人", &[]),
    ("良くならない", &[]),
    ("希望がない", &[]),
    ("未来がない", &[]),
    ("場所の無駄", &[]),
];

fn builtin_lexicon(language: Language) -> TriggerLexicon {
    let table = match language {
        Language::En => EN_PHRASES,
        Language::Ja => JA_PHRASES,
    };
    let phrases = table
        .iter()
        .map(|(phrase, variants)| TriggerPhrase::new(phrase, variants))
        .collect();
    TriggerLexicon::new(language, phrases)
}

static BUILTIN: Lazy<LexiconStore> = Lazy::new(|| LexiconStore {
    lexicons: Language::ALL
        .iter()
        .map(|&language| (language, builtin_lexicon(language)))
        .collect(),
    default_language: Language::default(),
});

/// Phrase entry in a lexicon file: either a bare phrase or a phrase with variants
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PhraseEntry {
    Bare(String),
    Full(TriggerPhrase),
}

impl From<PhraseEntry> for TriggerPhrase {
    fn from(entry: PhraseEntry) -> Self {
        match entry {
            PhraseEntry::Bare(phrase) => TriggerPhrase {
                phrase,
                variants: Vec::new(),
            },
            PhraseEntry::Full(phrase) => phrase,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LexiconFile {
    #[serde(default)]
    default_language: Option<String>,
    lexicons: BTreeMap<String, Vec<PhraseEntry>>,
}

/// Immutable per-language lexicons
#[derive(Debug, Clone)]
pub struct LexiconStore {
    lexicons: BTreeMap<Language, TriggerLexicon>,
    default_language: Language,
}

impl LexiconStore {
    /// Compiled-in English and Japanese lexicons
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// Load lexicons from a JSON file, layered over the builtin ones.
    ///
    /// Languages the file does not mention keep their builtin lexicon. A
    /// language whose list is empty after normalization also keeps it, since
    /// an empty list would disable detection for that language.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read lexicon file: {}", path.display()))?;

        let file: LexiconFile =
            serde_json::from_str(&contents).context("Failed to parse lexicon JSON")?;

        let mut store = Self::builtin();

        if let Some(tag) = file.default_language.as_deref() {
            store.default_language = Language::parse(tag)?;
        }

        for (tag, entries) in file.lexicons {
            let language = Language::parse(&tag)?;
            let lexicon =
                TriggerLexicon::new(language, entries.into_iter().map(TriggerPhrase::from).collect());

            if lexicon.is_empty() {
                tracing::warn!(language = %language, "Lexicon file has no usable phrases, keeping builtin");
                continue;
            }

            tracing::info!(language = %language, phrases = lexicon.len(), "Loaded lexicon");
            store.lexicons.insert(language, lexicon);
        }

        if store.lexicons.is_empty() {
            bail!("Lexicon store has no languages");
        }

        Ok(store)
    }

    pub fn default_language(&self) -> Language {
        self.default_language
    }

    /// Phrases for a language; never empty.
    ///
    /// Falls back to the default language, then to the builtin default.
    pub fn phrases(&self, language: Language) -> &TriggerLexicon {
        self.lexicons
            .get(&language)
            .filter(|lexicon| !lexicon.is_empty())
            .or_else(|| self.lexicons.get(&self.default_language))
            .filter(|lexicon| !lexicon.is_empty())
            .unwrap_or_else(|| BUILTIN.phrases(Language::default()))
    }

    /// Phrases for a raw language tag, falling back when unsupported
    pub fn phrases_for_tag(&self, tag: &str) -> &TriggerLexicon {
        match Language::parse(tag) {
            Ok(language) => self.phrases(language),
            Err(e) => {
                tracing::debug!(error = %e, "Using default lexicon");
                self.phrases(self.default_language)
            }
        }
    }

    pub fn languages(&self) -> impl Iterator<Item = &TriggerLexicon> {
        self.lexicons.values()
    }
}

impl Default for LexiconStore {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_language_parse() {
        assert_eq!(Language::parse("en").unwrap(), Language::En);
        assert_eq!(Language::parse("JA").unwrap(), Language::Ja);
        assert_eq!(Language::parse("en-US").unwrap(), Language::En);
        assert_eq!(Language::parse("ja_JP").unwrap(), Language::Ja);
        assert!(matches!(
            Language::parse("fr"),
            Err(SafetyError::UnsupportedLanguage(_))
        ));
        assert_eq!(Language::resolve("klingon"), Language::En);
        assert_eq!(Language::resolve_or("klingon", Language::Ja), Language::Ja);
        assert_eq!(Language::resolve_or("en-GB", Language::Ja), Language::En);
    }

    #[test]
    fn test_builtin_has_no_duplicates() {
        let store = LexiconStore::builtin();
        for lexicon in store.languages() {
            let phrases: Vec<&str> = lexicon.canonical().collect();
            let unique: HashSet<&str> = phrases.iter().copied().collect();
            assert_eq!(phrases.len(), unique.len(), "duplicates in {}", lexicon.language());
        }

        let ja = store.phrases(Language::Ja);
        assert_eq!(ja.canonical().filter(|p| *p == "死にたい").count(), 1);
    }

    #[test]
    fn test_builtin_order_is_stable() {
        let store = LexiconStore::builtin();
        let en: Vec<&str> = store.phrases(Language::En).canonical().take(3).collect();
        assert_eq!(en, vec!["kill", "suicide", "die"]);
        assert_eq!(store.phrases(Language::En).canonical().last(), Some("self-harm"));
    }

    #[test]
    fn test_unknown_tag_falls_back_to_default() {
        let store = LexiconStore::builtin();
        let lexicon = store.phrases_for_tag("xx");
        assert_eq!(lexicon.language(), Language::En);
        assert!(!lexicon.is_empty());
    }

    #[test]
    fn test_phrases_are_lowercased() {
        let lexicon = TriggerLexicon::new(
            Language::En,
            vec![
                TriggerPhrase::new("  Give Up ", &["GIVING UP", "give up"]),
                TriggerPhrase::new("give up", &[]),
                TriggerPhrase::new("", &[]),
            ],
        );
        assert_eq!(lexicon.len(), 1);
        assert_eq!(lexicon.phrases()[0].phrase, "give up");
        assert_eq!(lexicon.phrases()[0].variants, vec!["giving up".to_string()]);
    }

    #[test]
    fn test_load_from_file_layers_over_builtin() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "lexicons": {{
                    "en": ["Hopeless", {{ "phrase": "give up", "variants": ["giving up"] }}],
                    "ja": []
                }}
            }}"#
        )
        .unwrap();

        let store = LexiconStore::load_from_file(file.path()).unwrap();
        let en: Vec<&str> = store.phrases(Language::En).canonical().collect();
        assert_eq!(en, vec!["hopeless", "give up"]);

        // Empty list is rejected, builtin kept
        assert_eq!(
            store.phrases(Language::Ja).len(),
            LexiconStore::builtin().phrases(Language::Ja).len()
        );
    }

    #[test]
    fn test_load_from_file_rejects_unknown_language() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "lexicons": {{ "fr": ["mourir"] }} }}"#).unwrap();
        assert!(LexiconStore::load_from_file(file.path()).is_err());
    }
}
