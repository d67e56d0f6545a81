//! Text Normalization
//!
//! Canonicalizes raw ASR transcripts before pattern matching: lowercasing,
//! filler removal, mixing-desk synonyms and spoken numbers.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;
use tracing::warn;

const NUMBER_WORDS: [(&str, u32); 21] = [
    ("zero", 0),
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("thirteen", 13),
    ("fourteen", 14),
    ("fifteen", 15),
    ("sixteen", 16),
    ("seventeen", 17),
    ("eighteen", 18),
    ("nineteen", 19),
    ("twenty", 20),
];

/// Words dropped wherever they appear
const FILLER_WORDS: &[&str] = &["the", "a", "an", "um", "uh", "please", "my", "some"];

/// Conversational openers stripped from the front, repeatedly
const PREFIXES: &[&str] = &[
    "ok ",
    "okay ",
    "hey ",
    "yes ",
    "so ",
    "now ",
    "can you ",
    "could you ",
    "would you ",
    "i want to ",
    "lets ",
];

lazy_static! {
    static ref CLAUSE_PUNCT: Regex = Regex::new(r"[,;]").unwrap();
    static ref OTHER_PUNCT: Regex = Regex::new(r"[^a-z0-9\s\-+.%]").unwrap();
    static ref NUMBER_WORD: Regex = Regex::new(
        r"\b(zero|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|twenty)\b"
    )
    .unwrap();
    static ref DECIMAL: Regex = Regex::new(r"\b(\d+) point (\d+)\b").unwrap();
    static ref NEGATIVE: Regex = Regex::new(r"\b(?:minus|negative) (\d+(?:\.\d+)?)\b").unwrap();
    static ref POSITIVE: Regex = Regex::new(r"\bplus (\d+(?:\.\d+)?)\b").unwrap();
    static ref UNIT_SPACING: Regex = Regex::new(r"(\d)(db\b|ms\b|%)").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();

    /// Ordered: multi-word phrases before the single words they contain
    static ref SYNONYMS: Vec<(Regex, &'static str)> = [
        (r"\b(?:minus|negative) infinity\b", "-inf db"),
        (r"\binfinity\b", "-inf db"),
        (r"\bper cent\b", "%"),
        (r"\bpercent\b", "%"),
        (r"\b48 ?(?:volts?|v)\b", "phantom"),
        (r"\b(?:hi|high) hat\b", "hihat"),
        (r"\bunmute\b", "mute off"),
        (r"\bunsolo\b", "solo off"),
        (r"\b(?:raise|increase|louder)\b", "up"),
        (r"\b(?:lower|decrease|reduce|quieter)\b", "down"),
        (r"\b(?:channels|channel|chan|tracks|track|inputs|input)\b", "ch"),
        (r"\b(?:centre|middle)\b", "center"),
        (r"\b(?:decibels|decibel|dbs)\b", "db"),
        (r"\b(?:milliseconds|millisecond|millis)\b", "ms"),
        (r"\b(?:equalizer|equaliser)\b", "eq"),
        (r"\b(?:compressor|compression)\b", "comp"),
        (r"\b(?:snapshot|preset)\b", "scene"),
        (r"\bunity\b", "0 db"),
    ]
    .iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), *replacement))
    .collect();
}

/// Normalizes spoken text to fix common recognition errors
pub struct TextNormalizer {
    /// Manual corrections from config, matched on word boundaries
    corrections: Vec<(Regex, String)>,
    /// Number word mappings
    number_words: HashMap<&'static str, u32>,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

impl TextNormalizer {
    /// Create a new text normalizer
    pub fn new(corrections: &HashMap<String, String>) -> Self {
        let mut compiled = Vec::with_capacity(corrections.len());
        for (from, to) in corrections {
            let pattern = format!(r"\b{}\b", regex::escape(&from.to_lowercase()));
            match Regex::new(&pattern) {
                Ok(re) => compiled.push((re, to.to_lowercase())),
                Err(e) => warn!("⚠️ Skipping voice correction '{}': {}", from, e),
            }
        }

        Self {
            corrections: compiled,
            number_words: NUMBER_WORDS.into_iter().collect(),
        }
    }

    /// Normalize text with corrections and canonical mixer vocabulary
    pub fn normalize(&self, text: &str) -> String {
        let mut result = text.to_lowercase();

        for (re, to) in &self.corrections {
            result = re.replace_all(&result, to.as_str()).into_owned();
        }

        // Clause punctuation acts as a conjunction for compound splitting
        result = result.replace('\'', "");
        result = CLAUSE_PUNCT.replace_all(&result, " and ").into_owned();
        result = OTHER_PUNCT.replace_all(&result, " ").into_owned();

        let tokens: Vec<&str> = result
            .split_whitespace()
            .map(|t| t.trim_matches('.'))
            .filter(|t| !t.is_empty() && !matches!(*t, "-" | "+"))
            .filter(|t| !FILLER_WORDS.contains(t))
            .collect();
        let mut final_text = tokens.join(" ");

        loop {
            let mut changed = false;
            for prefix in PREFIXES {
                if let Some(rest) = final_text.strip_prefix(prefix) {
                    final_text = rest.trim().to_string();
                    changed = true;
                    break;
                }
            }
            if !changed {
                break;
            }
        }

        for (re, replacement) in SYNONYMS.iter() {
            final_text = re.replace_all(&final_text, *replacement).into_owned();
        }

        final_text = NUMBER_WORD
            .replace_all(&final_text, |caps: &Captures| {
                self.number_words
                    .get(&caps[1])
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| caps[1].to_string())
            })
            .into_owned();

        final_text = DECIMAL.replace_all(&final_text, "$1.$2").into_owned();
        final_text = NEGATIVE.replace_all(&final_text, "-$1").into_owned();
        final_text = POSITIVE.replace_all(&final_text, "+$1").into_owned();
        final_text = UNIT_SPACING.replace_all(&final_text, "$1 $2").into_owned();

        WHITESPACE.replace_all(final_text.trim(), " ").into_owned()
    }

    /// Parse a spoken number (digits 1-99 or a number word)
    pub fn parse_number(&self, text: &str) -> Option<u32> {
        let text_lower = text.to_lowercase();

        if let Ok(num) = text_lower.parse::<u32>() {
            if num > 0 && num <= 99 {
                return Some(num);
            }
        }

        self.number_words.get(text_lower.as_str()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> TextNormalizer {
        TextNormalizer::default()
    }

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalizer().normalize("  MUTE   Channel   Three "), "mute ch 3");
    }

    #[test]
    fn test_normalize_synonyms() {
        let n = normalizer();
        assert_eq!(n.normalize("Unmute channel 4"), "mute off ch 4");
        assert_eq!(n.normalize("raise track two"), "up ch 2");
        assert_eq!(n.normalize("pan the guitar to the centre"), "pan guitar to center");
        assert_eq!(n.normalize("recall snapshot five"), "recall scene 5");
        assert_eq!(n.normalize("turn on 48 volt on input 7"), "turn on phantom on ch 7");
    }

    #[test]
    fn test_normalize_numbers_and_signs() {
        let n = normalizer();
        assert_eq!(
            n.normalize("set channel one to minus six decibels"),
            "set ch 1 to -6 db"
        );
        assert_eq!(n.normalize("gain ch 2 plus three dB"), "gain ch 2 +3 db");
        assert_eq!(n.normalize("fader 4 to -6dB."), "fader 4 to -6 db");
        assert_eq!(n.normalize("minus two point five"), "-2.5");
        assert_eq!(n.normalize("set the master to unity"), "set master to 0 db");
        assert_eq!(n.normalize("fader 1 to minus infinity"), "fader 1 to -inf db");
        assert_eq!(n.normalize("send 3 to fifty percent"), "send 3 to fifty %");
    }

    #[test]
    fn test_normalize_dynamics_units() {
        let n = normalizer();
        assert_eq!(
            n.normalize("set the compressor to 4:1 on channel 2"),
            "set comp to 4 1 on ch 2"
        );
        assert_eq!(
            n.normalize("vocals attack ten milliseconds"),
            "vocals attack 10 ms"
        );
        assert_eq!(n.normalize("ch 3 attack 5ms"), "ch 3 attack 5 ms");
    }

    #[test]
    fn test_plus_conjunction_survives() {
        assert_eq!(
            normalizer().normalize("mute channel 1 plus solo channel 2"),
            "mute ch 1 plus solo ch 2"
        );
    }

    #[test]
    fn test_normalize_prefixes_and_fillers() {
        let n = normalizer();
        assert_eq!(n.normalize("ok hey um mute the kick please"), "mute kick");
        assert_eq!(n.normalize("Can you solo the snare?"), "solo snare");
    }

    #[test]
    fn test_clause_punctuation_becomes_conjunction() {
        assert_eq!(
            normalizer().normalize("mute guitar, then pan it left"),
            "mute guitar and then pan it left"
        );
    }

    #[test]
    fn test_normalize_corrections() {
        let mut corrections = HashMap::new();
        corrections.insert("fate".to_string(), "fader".to_string());
        let n = TextNormalizer::new(&corrections);
        assert_eq!(n.normalize("FATE three to zero"), "fader 3 to 0");
        // word boundaries: no partial replacement
        assert_eq!(n.normalize("fateful"), "fateful");
    }

    #[test]
    fn test_parse_number() {
        let n = normalizer();
        assert_eq!(n.parse_number("five"), Some(5));
        assert_eq!(n.parse_number("12"), Some(12));
        assert_eq!(n.parse_number("invalid"), None);
    }
}
