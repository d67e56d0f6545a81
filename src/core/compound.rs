//! Compound utterance splitting
//!
//! Detects multi-action transcripts ("mute guitar and pan it left"), splits
//! them at conjunctions and produces candidate rewrites of each fragment so
//! that pronouns and elided targets inherit the last explicit target.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use super::targets::PRONOUNS;

/// Upper bound on actions taken from one utterance
pub const MAX_FRAGMENTS: usize = 4;

/// Leading words that mark an action rather than a target
const ACTION_WORDS: &[&str] = &[
    "mute", "solo", "pan", "set", "put", "send", "route", "add", "bring", "push", "pull", "up",
    "down", "turn", "gain", "trim", "recall", "store", "save", "bypass", "center", "kill", "cut",
    "boost", "reset", "clear", "fader", "then", "also", "plus", "gate", "ungate", "comp",
    "compress", "eq", "hpf", "high", "label", "name", "call", "fast", "slow",
];

lazy_static! {
    /// A run of one or more conjunctions is a single boundary
    static ref BOUNDARY: Regex =
        Regex::new(r"(?:\s+(?:and|then|also|plus|followed by|as well as))+\s+").unwrap();
    static ref EDGE_CONJUNCTION: Regex =
        Regex::new(r"^(?:(?:and|then|also|plus|followed by|as well as)(?:\s+|$))+|(?:\s+(?:and|then|also|plus|followed by|as well as))+$").unwrap();
    static ref LIST_SEPARATOR: Regex = Regex::new(r"(?:\s+and)+\s+").unwrap();
    static ref TARGET_ITEM: Regex =
        Regex::new(r"^(?:ch \d+|\d+|[a-z][a-z\-]*(?: [a-z][a-z\-]*)?)$").unwrap();
    static ref PRONOUN: Regex = Regex::new(&format!(r"\b(?:{})\b", PRONOUNS.join("|"))).unwrap();

    /// "kick and snare and hihat all to -3 db"
    static ref MULTI_TARGET: Regex = Regex::new(
        r"^(?:set |put |bring |move |make )?(?P<targets>.+? and .+?) (?:all |both )?(?:to|at) (?P<value>[+-]?\d+(?:\.\d+)?|-inf)(?: (?P<unit>db|%))?$"
    )
    .unwrap();

    /// "send vocals to mix 1 and 2"
    static ref MULTI_SEND: Regex = Regex::new(
        r"^(?:send|route|add|patch|feed) (?P<target>.+?) to (?:mix|aux|monitor|bus|wedge|mon)(?:es|s)? (?P<buses>\d+(?:(?: and)+ (?:(?:mix|aux|monitor|bus|wedge|mon) )?\d+)+)$"
    )
    .unwrap();
    static ref DIGITS: Regex = Regex::new(r"\d+").unwrap();
}

/// Single-action shapes that contain "and" but must not be split
#[derive(Debug, Clone, PartialEq)]
pub enum SingleActionIdiom {
    /// One level applied to several targets
    MultiTarget {
        targets: Vec<String>,
        value: String,
        unit: Option<String>,
    },
    /// One source sent to several mixes
    MultiSend { target: String, buses: Vec<u32> },
}

/// The most recent fragment that resolved to an explicit target
#[derive(Debug, Clone)]
pub struct PreviousFragment {
    pub text: String,
    pub target: String,
}

#[derive(Debug, Default, Clone)]
pub struct CompoundSplitter;

impl CompoundSplitter {
    pub fn new() -> Self {
        Self
    }

    /// Whether normalized text holds more than one action
    pub fn is_compound(&self, text: &str) -> bool {
        if self.detect_idiom(text).is_some() {
            return false;
        }
        self.split(text).len() > 1
    }

    /// Recognize the list-of-objects shapes that read like compounds
    pub fn detect_idiom(&self, text: &str) -> Option<SingleActionIdiom> {
        if let Some(caps) = MULTI_SEND.captures(text) {
            let target = caps["target"].to_string();
            if is_target_item(&target) {
                let buses = DIGITS
                    .find_iter(&caps["buses"])
                    .filter_map(|m| m.as_str().parse().ok())
                    .collect();
                return Some(SingleActionIdiom::MultiSend { target, buses });
            }
        }

        if let Some(caps) = MULTI_TARGET.captures(text) {
            let targets: Vec<String> = LIST_SEPARATOR
                .split(&caps["targets"])
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            if targets.len() > 1 && targets.iter().all(|t| is_target_item(t)) {
                return Some(SingleActionIdiom::MultiTarget {
                    targets,
                    value: caps["value"].to_string(),
                    unit: caps.name("unit").map(|m| m.as_str().to_string()),
                });
            }
        }

        None
    }

    /// Split at conjunction boundaries, keeping at most `MAX_FRAGMENTS`
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut fragments: Vec<String> = BOUNDARY
            .split(text)
            .map(|f| EDGE_CONJUNCTION.replace_all(f.trim(), "").trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();

        if fragments.len() > MAX_FRAGMENTS {
            warn!(
                "⚠️ Compound command has {} actions, keeping the first {}",
                fragments.len(),
                MAX_FRAGMENTS
            );
            fragments.truncate(MAX_FRAGMENTS);
        }
        fragments
    }

    pub fn has_pronoun(&self, fragment: &str) -> bool {
        PRONOUN.is_match(fragment)
    }

    /// Replace every pronoun with the carried-forward target
    pub fn substitute_pronouns(&self, fragment: &str, target: &str) -> String {
        PRONOUN.replace_all(fragment, target).into_owned()
    }

    /// Rewrites of a non-initial fragment to try, in order
    pub fn resolution_candidates(
        &self,
        fragment: &str,
        last_target: Option<&str>,
        previous: Option<&PreviousFragment>,
    ) -> Vec<String> {
        let Some(target) = last_target else {
            return vec![fragment.to_string()];
        };

        if self.has_pronoun(fragment) {
            return vec![self.substitute_pronouns(fragment, target)];
        }

        let mut candidates = vec![fragment.to_string()];

        // Elided subject: "... and solo", "... and pan left"
        candidates.push(format!("{} {}", fragment, target));
        if let Some((verb, rest)) = fragment.split_once(' ') {
            candidates.push(format!("{} {} {}", verb, target, rest));
        }

        // Elided verb: "... and snare", "... and 4"
        if let Some(prev) = previous {
            if is_target_item(fragment) {
                let new_target = if fragment.chars().all(|c| c.is_ascii_digit()) {
                    format!("ch {}", fragment)
                } else {
                    fragment.to_string()
                };
                if let Ok(re) = Regex::new(&format!(r"\b{}\b", regex::escape(&prev.target))) {
                    candidates.push(re.replacen(&prev.text, 1, new_target.as_str()).into_owned());
                }
            }
        }

        candidates
    }
}

/// A bare target phrase: "ch 3", "4", "snare", "bass guitar"
fn is_target_item(text: &str) -> bool {
    if !TARGET_ITEM.is_match(text) {
        return false;
    }
    let first = text.split_whitespace().next().unwrap_or_default();
    !ACTION_WORDS.contains(&first) && !PRONOUNS.contains(&first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_compound_split() {
        let splitter = CompoundSplitter::new();
        let text = "mute guitar and pan it left";
        assert!(splitter.is_compound(text));
        assert_eq!(splitter.split(text), vec!["mute guitar", "pan it left"]);
    }

    #[test]
    fn test_repeated_conjunctions_are_one_boundary() {
        let splitter = CompoundSplitter::new();
        assert_eq!(
            splitter.split("mute ch 1 and then and also solo ch 2"),
            vec!["mute ch 1", "solo ch 2"]
        );
        assert_eq!(
            splitter.split("mute ch 1 followed by solo ch 2"),
            vec!["mute ch 1", "solo ch 2"]
        );
    }

    #[test]
    fn test_split_caps_fragments() {
        let splitter = CompoundSplitter::new();
        let fragments =
            splitter.split("mute ch 1 and mute ch 2 and mute ch 3 and mute ch 4 and mute ch 5");
        assert_eq!(fragments.len(), MAX_FRAGMENTS);
        assert_eq!(fragments[3], "mute ch 4");
    }

    #[test]
    fn test_leading_conjunction_is_dropped() {
        let splitter = CompoundSplitter::new();
        assert_eq!(splitter.split("and then mute ch 1"), vec!["mute ch 1"]);
        assert!(!splitter.is_compound("and then mute ch 1"));
    }

    #[test]
    fn test_multi_target_is_not_compound() {
        let splitter = CompoundSplitter::new();
        let text = "kick and snare and hihat all to -3 db";
        assert!(!splitter.is_compound(text));
        match splitter.detect_idiom(text) {
            Some(SingleActionIdiom::MultiTarget {
                targets,
                value,
                unit,
            }) => {
                assert_eq!(targets, vec!["kick", "snare", "hihat"]);
                assert_eq!(value, "-3");
                assert_eq!(unit.as_deref(), Some("db"));
            }
            other => panic!("expected multi-target idiom, got {:?}", other),
        }
    }

    #[test]
    fn test_multi_send_is_not_compound() {
        let splitter = CompoundSplitter::new();
        let text = "send vocals to mix 1 and 2";
        assert!(!splitter.is_compound(text));
        assert_eq!(
            splitter.detect_idiom(text),
            Some(SingleActionIdiom::MultiSend {
                target: "vocals".to_string(),
                buses: vec![1, 2],
            })
        );
    }

    #[test]
    fn test_actions_are_not_mistaken_for_targets() {
        let splitter = CompoundSplitter::new();
        let text = "mute guitar and set ch 2 to -6 db";
        assert!(splitter.detect_idiom(text).is_none());
        assert!(splitter.is_compound(text));
    }

    #[test]
    fn test_pronoun_candidates() {
        let splitter = CompoundSplitter::new();
        let candidates = splitter.resolution_candidates("pan it left", Some("guitar"), None);
        assert_eq!(candidates, vec!["pan guitar left"]);
    }

    #[test]
    fn test_elided_target_candidates() {
        let splitter = CompoundSplitter::new();
        let candidates = splitter.resolution_candidates("solo", Some("ch 3"), None);
        assert!(candidates.contains(&"solo ch 3".to_string()));

        let prev = PreviousFragment {
            text: "mute kick".to_string(),
            target: "kick".to_string(),
        };
        let candidates = splitter.resolution_candidates("snare", Some("kick"), Some(&prev));
        assert_eq!(candidates.last().map(String::as_str), Some("mute snare"));

        let prev = PreviousFragment {
            text: "set ch 1 to -6 db".to_string(),
            target: "ch 1".to_string(),
        };
        let candidates = splitter.resolution_candidates("2", Some("ch 1"), Some(&prev));
        assert_eq!(candidates.last().map(String::as_str), Some("set ch 2 to -6 db"));
    }
}
