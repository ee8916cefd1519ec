//! Header-to-field scoring against alias lists.
//!
//! An exact folded match scores 1.0. A whole-word containment (the alias
//! inside the header or the header inside the alias) scores between 0.6 and
//! 0.9 depending on how much of the longer string the shorter one covers.
//! Otherwise a Jaro-Winkler similarity of at least 0.92 contributes at a
//! discount, which catches typos such as `"telephonne"`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use rapidfuzz::distance::jaro_winkler;
use serde::Serialize;

use crate::fold::fold_header;

const EXACT_SCORE: f32 = 1.0;
const CONTAINMENT_BASE: f32 = 0.6;
const CONTAINMENT_SPAN: f32 = 0.3;
const FUZZY_MIN_SIMILARITY: f64 = 0.92;
const FUZZY_WEIGHT: f32 = 0.7;

/// Score for a single header-field pair.
#[derive(Debug, Clone, Serialize)]
pub struct HeaderScore {
    pub score: f32,
    /// Breakdown for explainability.
    pub explanation: Vec<ScoreComponent>,
}

impl HeaderScore {
    fn none() -> Self {
        Self {
            score: 0.0,
            explanation: Vec::new(),
        }
    }

    pub fn explain(&self) -> String {
        self.explanation
            .iter()
            .map(|c| format!("{}: {:.0}% ({})", c.name, c.value * 100.0, c.description))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreComponent {
    pub name: &'static str,
    pub value: f32,
    pub description: String,
}

/// A suggested header assignment.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub header: String,
    pub target: String,
    pub score: HeaderScore,
}

/// Scores headers against a canonical field -> alias dictionary.
#[derive(Debug, Clone)]
pub struct AliasScorer {
    /// Folded aliases per canonical field.
    aliases: BTreeMap<String, Vec<String>>,
}

impl AliasScorer {
    /// `aliases` must already be folded (see [`crate::default_aliases`]).
    pub fn new(aliases: BTreeMap<String, Vec<String>>) -> Self {
        Self { aliases }
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.aliases.keys().map(String::as_str)
    }

    /// Best score of `header` against the aliases of `target`.
    pub fn score(&self, header: &str, target: &str) -> HeaderScore {
        let Some(aliases) = self.aliases.get(target) else {
            return HeaderScore::none();
        };
        let folded = fold_header(header);
        if folded.is_empty() {
            return HeaderScore::none();
        }
        aliases
            .iter()
            .map(|alias| score_alias(&folded, alias))
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal))
            .unwrap_or_else(HeaderScore::none)
    }

    /// Best one-to-one assignment of headers to fields.
    ///
    /// Greedy by descending score; ties go to the earlier header, then the
    /// field name, so the result does not depend on hash order.
    pub fn suggest(&self, headers: &[String], min_confidence: f32) -> Vec<Suggestion> {
        let mut candidates: Vec<(usize, &str, HeaderScore)> = Vec::new();
        for (position, header) in headers.iter().enumerate() {
            for target in self.targets() {
                let score = self.score(header, target);
                if score.score >= min_confidence && score.score > 0.0 {
                    candidates.push((position, target, score));
                }
            }
        }
        candidates.sort_by(|a, b| {
            b.2.score
                .partial_cmp(&a.2.score)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
                .then(a.1.cmp(b.1))
        });

        let mut assigned_headers = BTreeSet::new();
        let mut assigned_targets = BTreeSet::new();
        let mut suggestions = Vec::new();
        for (position, target, score) in candidates {
            if assigned_headers.contains(&position) || assigned_targets.contains(target) {
                continue;
            }
            assigned_headers.insert(position);
            assigned_targets.insert(target);
            suggestions.push(Suggestion {
                header: headers[position].clone(),
                target: target.to_string(),
                score,
            });
        }
        suggestions.sort_by_key(|s| headers.iter().position(|h| *h == s.header));
        suggestions
    }

    /// Highest score any header reaches for any field.
    pub fn best_score(&self, headers: &[String]) -> f32 {
        headers
            .iter()
            .flat_map(|h| self.targets().map(move |t| self.score(h, t).score))
            .fold(0.0, f32::max)
    }
}

fn score_alias(header: &str, alias: &str) -> HeaderScore {
    if header == alias {
        return HeaderScore {
            score: EXACT_SCORE,
            explanation: vec![ScoreComponent {
                name: "Exact alias",
                value: EXACT_SCORE,
                description: format!("'{alias}'"),
            }],
        };
    }

    if contains_words(header, alias) || contains_words(alias, header) {
        let (short, long) = if header.len() < alias.len() {
            (header, alias)
        } else {
            (alias, header)
        };
        let coverage = short.chars().count() as f32 / long.chars().count().max(1) as f32;
        let score = CONTAINMENT_BASE + CONTAINMENT_SPAN * coverage;
        return HeaderScore {
            score,
            explanation: vec![ScoreComponent {
                name: "Alias containment",
                value: score,
                description: format!("'{short}' within '{long}'"),
            }],
        };
    }

    let similarity = jaro_winkler::similarity(header.chars(), alias.chars());
    if similarity >= FUZZY_MIN_SIMILARITY {
        let score = similarity as f32 * FUZZY_WEIGHT;
        return HeaderScore {
            score,
            explanation: vec![ScoreComponent {
                name: "Fuzzy alias",
                value: score,
                description: format!("'{header}' ~ '{alias}' {:.0}%", similarity * 100.0),
            }],
        };
    }
    HeaderScore::none()
}

/// Whole-word containment of `needle` in `haystack`.
fn contains_words(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && format!(" {haystack} ").contains(&format!(" {needle} "))
}
