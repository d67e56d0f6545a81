//! Similarity Engine
//!
//! Word-level edit distance between command transcripts. A successful
//! command that is close to a recently failed one is treated as a likely
//! correction of it.

use chrono::Duration as ChronoDuration;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::history::ExecutedCommand;

/// Word-count difference beyond which two commands are never compared
pub const MAX_WORD_COUNT_DIFFERENCE: usize = 2;
/// Shortest command considered, except for the mute shape below
pub const MIN_WORD_COUNT: usize = 4;
/// Attempts closer together than this are the same utterance
const SAME_UTTERANCE_MS: i64 = 1000;

const SIMILARITY_WEIGHT: f64 = 0.7;
const CONFIDENCE_WEIGHT: f64 = 0.3;

lazy_static! {
    static ref SHORT_MUTE: Regex = Regex::new(r"^(?:un)?mute (?:ch|channel) -?\d+$").unwrap();
    static ref PUNCTUATION: Regex = Regex::new(r"[^a-z0-9\s\-.]").unwrap();
}

const NUMBER_WORDS: &[&str] = &[
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen", "twenty",
];

/// Outcome of one pairwise comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SimilarityResult {
    NoMatch,
    Match {
        distance: usize,
        similarity: f64,
        /// Words present in both commands, regardless of position
        matching_words: Vec<String>,
    },
}

impl SimilarityResult {
    pub fn is_match(&self) -> bool {
        matches!(self, SimilarityResult::Match { .. })
    }

    pub fn similarity(&self) -> f64 {
        match self {
            SimilarityResult::Match { similarity, .. } => *similarity,
            SimilarityResult::NoMatch => 0.0,
        }
    }
}

/// A recent attempt that the current command likely corrects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarCommand {
    /// The earlier attempt
    pub original: ExecutedCommand,
    /// The command that corrected it
    pub corrected: ExecutedCommand,
    pub distance: usize,
    pub similarity: f64,
    pub matching_words: Vec<String>,
    /// Ranking score: weighted similarity plus current confidence
    pub confidence: f64,
}

/// Split a command into normalized comparison words
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let cleaned = PUNCTUATION.replace_all(&lower, " ");

    let mut words: Vec<String> = Vec::new();
    let mut negate_next = false;

    for raw in cleaned.split_whitespace() {
        let raw = raw.trim_matches('.');
        if raw.is_empty() {
            continue;
        }

        let word = match raw {
            "centre" | "middle" => "center".to_string(),
            "ch" | "chan" => "channel".to_string(),
            "decibel" | "decibels" | "dbs" => "db".to_string(),
            w => match NUMBER_WORDS.iter().position(|n| *n == w) {
                Some(n) => n.to_string(),
                None => w.to_string(),
            },
        };

        if word == "minus" || word == "negative" {
            negate_next = true;
            continue;
        }

        if negate_next {
            negate_next = false;
            if word.chars().next().map_or(false, |c| c.is_ascii_digit()) {
                words.push(format!("-{}", word));
                continue;
            }
            words.push("-".to_string());
        }

        // "6db" -> "6", "db"
        if let Some(number) = word.strip_suffix("db").filter(|n| n.parse::<f64>().is_ok()) {
            words.push(number.to_string());
            words.push("db".to_string());
            continue;
        }

        words.push(word);
    }

    if negate_next {
        words.push("-".to_string());
    }
    words
}

/// Levenshtein distance over words, two rolling rows
pub fn word_edit_distance<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    // Iterate the longer sequence so the rows hold the shorter one
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return long.len();
    }

    let mut previous: Vec<usize> = (0..=short.len()).collect();
    let mut current = vec![0; short.len() + 1];

    for (i, long_word) in long.iter().enumerate() {
        current[0] = i + 1;
        for (j, short_word) in short.iter().enumerate() {
            let substitution = previous[j] + usize::from(long_word != short_word);
            let deletion = previous[j + 1] + 1;
            let insertion = current[j] + 1;
            current[j + 1] = substitution.min(deletion).min(insertion);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[short.len()]
}

/// Largest edit distance still accepted for commands of this length
pub fn allowed_distance(word_count: usize) -> usize {
    if word_count >= 6 {
        2
    } else {
        1
    }
}

/// Pairwise and batch similarity with a soft time budget
#[derive(Debug)]
pub struct SimilarityEngine {
    budget: Duration,
    comparisons: AtomicU64,
    budget_overruns: AtomicU64,
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl SimilarityEngine {
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            comparisons: AtomicU64::new(0),
            budget_overruns: AtomicU64::new(0),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Number of comparisons or batches that exceeded the budget
    pub fn budget_overruns(&self) -> u64 {
        self.budget_overruns.load(Ordering::Relaxed)
    }

    pub fn comparisons(&self) -> u64 {
        self.comparisons.load(Ordering::Relaxed)
    }

    /// Compare two command strings
    pub fn calculate_similarity(&self, a: &str, b: &str) -> SimilarityResult {
        let start = Instant::now();
        let result = Self::compare(a, b);
        self.comparisons.fetch_add(1, Ordering::Relaxed);
        self.check_budget(start, "comparison");
        result
    }

    fn compare(a: &str, b: &str) -> SimilarityResult {
        let words_a = tokenize(a);
        let words_b = tokenize(b);

        if words_a.len().abs_diff(words_b.len()) > MAX_WORD_COUNT_DIFFERENCE {
            return SimilarityResult::NoMatch;
        }

        if is_too_short(&words_a) || is_too_short(&words_b) {
            return SimilarityResult::NoMatch;
        }

        let max_words = words_a.len().max(words_b.len());
        let distance = word_edit_distance(&words_a, &words_b);
        if distance > allowed_distance(max_words) {
            return SimilarityResult::NoMatch;
        }

        let set_a: BTreeSet<&String> = words_a.iter().collect();
        let set_b: BTreeSet<&String> = words_b.iter().collect();
        let matching_words = set_a.intersection(&set_b).map(|w| (*w).clone()).collect();

        SimilarityResult::Match {
            distance,
            similarity: 1.0 - distance as f64 / max_words as f64,
            matching_words,
        }
    }

    /// Compare `current` against a window of recent attempts, best first
    pub fn find_similar_commands(
        &self,
        current: &ExecutedCommand,
        recent: &[ExecutedCommand],
    ) -> Vec<SimilarCommand> {
        let start = Instant::now();
        let same_utterance = ChronoDuration::milliseconds(SAME_UTTERANCE_MS);

        let mut matches: Vec<SimilarCommand> = recent
            .iter()
            .filter(|candidate| candidate.id != current.id)
            .filter(|candidate| (current.timestamp - candidate.timestamp).abs() >= same_utterance)
            .filter_map(|candidate| {
                self.comparisons.fetch_add(1, Ordering::Relaxed);
                match Self::compare(&candidate.text, &current.text) {
                    SimilarityResult::Match {
                        distance,
                        similarity,
                        matching_words,
                    } => Some(SimilarCommand {
                        original: candidate.clone(),
                        corrected: current.clone(),
                        distance,
                        similarity,
                        matching_words,
                        confidence: (SIMILARITY_WEIGHT * similarity
                            + CONFIDENCE_WEIGHT * current.confidence)
                            .clamp(0.0, 1.0),
                    }),
                    SimilarityResult::NoMatch => None,
                }
            })
            .collect();

        matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        self.check_budget(start, "batch comparison");
        matches
    }

    /// Failed attempts within `window` that the latest success likely corrects
    pub fn find_corrections(
        &self,
        history: &[ExecutedCommand],
        window: Duration,
    ) -> Vec<SimilarCommand> {
        let Some(latest) = history.last() else {
            return Vec::new();
        };
        if !latest.success {
            return Vec::new();
        }

        let window = ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::zero());
        let failed: Vec<ExecutedCommand> = history
            .iter()
            .filter(|c| !c.success)
            .filter(|c| latest.timestamp - c.timestamp <= window)
            .filter(|c| c.text.trim().to_lowercase() != latest.text.trim().to_lowercase())
            .cloned()
            .collect();

        let corrections = self.find_similar_commands(latest, &failed);
        if !corrections.is_empty() {
            debug!(
                "🔍 '{}' looks like a correction of {} earlier attempt(s)",
                latest.text,
                corrections.len()
            );
        }
        corrections
    }

    fn check_budget(&self, start: Instant, what: &str) {
        let elapsed = start.elapsed();
        if elapsed > self.budget {
            self.budget_overruns.fetch_add(1, Ordering::Relaxed);
            warn!(
                "⏱️ Similarity {} took {:?} (budget {:?})",
                what, elapsed, self.budget
            );
        }
    }
}

fn is_short_mute(words: &[String]) -> bool {
    words.len() == 3 && SHORT_MUTE.is_match(&words.join(" "))
}

/// Below the minimum length and not the three-word mute shape
fn is_too_short(words: &[String]) -> bool {
    words.len() < MIN_WORD_COUNT && !is_short_mute(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn engine() -> SimilarityEngine {
        SimilarityEngine::default()
    }

    #[test]
    fn test_tokenize_normalizes_words() {
        assert_eq!(
            tokenize("Set channel one to minus six dB!"),
            vec!["set", "channel", "1", "to", "-6", "db"]
        );
        assert_eq!(tokenize("pan ch 2 to centre"), vec!["pan", "channel", "2", "to", "center"]);
        assert_eq!(tokenize("fader 3 to -6dB"), vec!["fader", "3", "to", "-6", "db"]);
    }

    #[test]
    fn test_edit_distance_matches_reference() {
        let cases = [
            ("set channel 1 to -6", "set channel 1 to -6 db"),
            ("mute kick", "solo snare drum now"),
            ("", "mute channel 3"),
            ("a b c d e f", "f e d c b a"),
            ("pan guitar left", "pan guitar left"),
        ];
        for (a, b) in cases {
            let wa: Vec<String> = a.split_whitespace().map(String::from).collect();
            let wb: Vec<String> = b.split_whitespace().map(String::from).collect();
            assert_eq!(
                word_edit_distance(&wa, &wb),
                strsim::generic_levenshtein(&wa, &wb),
                "{} / {}",
                a,
                b
            );
            assert_eq!(word_edit_distance(&wa, &wb), word_edit_distance(&wb, &wa));
        }
    }

    #[test]
    fn test_spoken_and_written_forms_match() {
        let result =
            engine().calculate_similarity("set channel one to minus six", "set channel 1 to -6 db");
        match result {
            SimilarityResult::Match {
                distance,
                similarity,
                matching_words,
            } => {
                assert_eq!(distance, 1);
                assert!((similarity - (1.0 - 1.0 / 6.0)).abs() < 1e-9);
                assert!(matching_words.contains(&"-6".to_string()));
                assert!(!matching_words.contains(&"db".to_string()));
            }
            SimilarityResult::NoMatch => panic!("expected a match"),
        }
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let e = engine();
        let a = "bring the vocals up by 3 db";
        let b = "bring the vocal up by 3 db";
        assert_eq!(e.calculate_similarity(a, b), e.calculate_similarity(b, a));
    }

    #[test]
    fn test_mute_unmute_is_an_edit_distance_match() {
        // Pure edit distance cannot see that these are opposites
        let result = engine().calculate_similarity("mute channel one", "unmute channel one");
        match result {
            SimilarityResult::Match {
                distance,
                similarity,
                ..
            } => {
                assert_eq!(distance, 1);
                assert!((similarity - 2.0 / 3.0).abs() < 1e-9);
            }
            SimilarityResult::NoMatch => panic!("expected an edit-distance match"),
        }
    }

    #[test]
    fn test_short_commands_are_rejected() {
        let e = engine();
        assert_eq!(e.calculate_similarity("solo kick", "solo snare"), SimilarityResult::NoMatch);
        assert_eq!(e.calculate_similarity("pan guitar left", "pan guitar right"), SimilarityResult::NoMatch);
    }

    #[test]
    fn test_short_mute_compares_with_longer_command() {
        let e = engine();
        match e.calculate_similarity("mute channel 3 now", "mute channel 3") {
            SimilarityResult::Match { distance, .. } => assert_eq!(distance, 1),
            SimilarityResult::NoMatch => panic!("expected a match"),
        }
        assert!(e.calculate_similarity("mute ch 3", "mute the ch 3").is_match());
        // only the mute shape is exempt
        assert!(!e.calculate_similarity("solo channel 3", "solo channel 3 now").is_match());
    }

    #[test]
    fn test_word_count_difference_short_circuits() {
        assert_eq!(
            engine().calculate_similarity("mute channel 3 now", "mute channel 3 now and then some more"),
            SimilarityResult::NoMatch
        );
    }

    #[test]
    fn test_threshold_depends_on_length() {
        let e = engine();
        // 4 words, distance 2
        assert!(!e.calculate_similarity("mute the kick drum", "solo the kick snare").is_match());
        // 6 words, distance 2
        assert!(e
            .calculate_similarity("set the kick drum to 3", "set the snare drum to 4")
            .is_match());
    }

    #[test]
    fn test_find_similar_commands_ranks_and_filters() {
        let now = Utc::now();
        let current = ExecutedCommand::new("set channel 3 to -6 db", true, 0.9).at(now);
        let close = ExecutedCommand::new("set channel 3 to -6 dv", false, 0.4)
            .at(now - ChronoDuration::seconds(5));
        let further = ExecutedCommand::new("set chanel tree to -6 dv", false, 0.4)
            .at(now - ChronoDuration::seconds(8));
        let too_recent = ExecutedCommand::new("set channel 3 to -6 dp", false, 0.4)
            .at(now - ChronoDuration::milliseconds(500));
        let unrelated = ExecutedCommand::new("recall scene 4 please now", false, 0.4)
            .at(now - ChronoDuration::seconds(3));

        let recent = vec![
            further.clone(),
            close.clone(),
            too_recent,
            unrelated,
            current.clone(),
        ];
        let matches = engine().find_similar_commands(&current, &recent);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].original.id, close.id);
        assert_eq!(matches[0].corrected.id, current.id);
        let expected = 0.7 * (1.0 - 1.0 / 6.0) + 0.3 * 0.9;
        assert!((matches[0].confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_find_corrections_requires_latest_success() {
        let now = Utc::now();
        let failed = ExecutedCommand::new("mute the kick drum now", false, 0.5)
            .at(now - ChronoDuration::seconds(4));
        let fixed = ExecutedCommand::new("mute the kick drums now", true, 0.9).at(now);
        let e = engine();

        let corrections = e.find_corrections(&[failed.clone(), fixed.clone()], Duration::from_secs(30));
        assert_eq!(corrections.len(), 1);

        let still_failing = ExecutedCommand::new("mute the kick drums now", false, 0.9).at(now);
        assert!(e
            .find_corrections(&[failed.clone(), still_failing], Duration::from_secs(30))
            .is_empty());

        assert!(e
            .find_corrections(&[failed, fixed], Duration::from_secs(2))
            .is_empty());
    }

    #[test]
    fn test_budget_overrun_is_flagged_not_fatal() {
        let e = SimilarityEngine::new(Duration::ZERO);
        let recent: Vec<ExecutedCommand> = (0..20)
            .map(|i| {
                ExecutedCommand::new(format!("set channel {} to -6 db", i), false, 0.5)
                    .at(Utc::now() - ChronoDuration::seconds(5))
            })
            .collect();
        let current = ExecutedCommand::new("set channel 3 to -6 db", true, 0.9);
        let matches = e.find_similar_commands(&current, &recent);
        assert!(!matches.is_empty());
        assert!(e.budget_overruns() >= 1);
        assert!(e.comparisons() >= 20);
    }
}
