//! Voice trigger detection.
//!
//! Maps a speech transcript to a registered tool. Two passes:
//!
//! 1. Case-insensitive substring match. When several triggers occur in the
//!    transcript the longest one wins.
//! 2. Fuzzy match: every run of consecutive transcript words as long as the
//!    trigger is compared by Levenshtein distance. The closest window wins.
//!
//! The fuzzy tolerance is [`MAX_FUZZY_DISTANCE`], reduced to one edit per
//! four characters of the trigger. Three-letter triggers such as `"map"`
//! only ever match exactly; otherwise "me" would trigger them.

use std::sync::Arc;

use tracing::debug;

use crate::registry::ToolRegistry;

/// Largest edit distance accepted by the fuzzy pass.
pub const MAX_FUZZY_DISTANCE: usize = 2;

/// A transcript resolved to a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMatch {
    pub tool_id: String,
    /// The registered trigger phrase that matched.
    pub trigger: String,
    /// True when found by the fuzzy pass.
    pub fuzzy: bool,
}

/// Resolves transcripts against the triggers in a registry.
pub struct TriggerDetector {
    registry: Arc<ToolRegistry>,
}

impl TriggerDetector {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn detect(&self, transcript: &str) -> Option<TriggerMatch> {
        let lower = transcript.trim().to_lowercase();
        if lower.is_empty() {
            return None;
        }

        let found = self.exact(&lower).or_else(|| self.fuzzy(&lower));
        match &found {
            Some(m) => debug!(tool_id = %m.tool_id, trigger = %m.trigger, fuzzy = m.fuzzy, "trigger detected"),
            None => debug!(chars = lower.chars().count(), "no trigger in transcript"),
        }
        found
    }

    fn exact(&self, lower: &str) -> Option<TriggerMatch> {
        let mut best: Option<(usize, TriggerMatch)> = None;
        for plugin in self.registry.iter() {
            for trigger in &plugin.triggers {
                let needle = trigger.trim().to_lowercase();
                if needle.is_empty() || !lower.contains(needle.as_str()) {
                    continue;
                }
                let len = needle.chars().count();
                if best.as_ref().is_none_or(|(best_len, _)| len > *best_len) {
                    best = Some((
                        len,
                        TriggerMatch {
                            tool_id: plugin.id.clone(),
                            trigger: trigger.clone(),
                            fuzzy: false,
                        },
                    ));
                }
            }
        }
        best.map(|(_, m)| m)
    }

    fn fuzzy(&self, lower: &str) -> Option<TriggerMatch> {
        let words: Vec<&str> = lower.split_whitespace().collect();
        let mut best: Option<(usize, TriggerMatch)> = None;

        for plugin in self.registry.iter() {
            for trigger in &plugin.triggers {
                let needle = trigger.trim().to_lowercase();
                let width = needle.split_whitespace().count();
                let tolerance = fuzzy_tolerance(&needle);
                if width == 0 || width > words.len() || tolerance == 0 {
                    continue;
                }
                let closest = words
                    .windows(width)
                    .map(|window| levenshtein_distance(&window.join(" "), &needle))
                    .min();
                let Some(distance) = closest else { continue };
                if distance > tolerance {
                    continue;
                }
                if best.as_ref().is_none_or(|(best_distance, _)| distance < *best_distance) {
                    best = Some((
                        distance,
                        TriggerMatch {
                            tool_id: plugin.id.clone(),
                            trigger: trigger.clone(),
                            fuzzy: true,
                        },
                    ));
                }
            }
        }
        best.map(|(_, m)| m)
    }
}

fn fuzzy_tolerance(trigger: &str) -> usize {
    (trigger.chars().count() / 4).min(MAX_FUZZY_DISTANCE)
}

/// Compute the Levenshtein edit distance between two strings.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    // Single rolling row.
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            let next = (row[j + 1] + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = row[j + 1];
            row[j + 1] = next;
        }
    }
    row[b.len()]
}
