use std::{cmp::Ordering, collections::HashSet};

use common::storage::types::GraphRecord;

/// Holds optional subscores gathered from different ranking signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scores {
    pub lexical: Option<f32>,
    pub centrality: Option<f32>,
    pub rank: Option<f32>,
}

/// Generic wrapper combining a record with its accumulated scores.
#[derive(Debug, Clone)]
pub struct Scored<T> {
    pub item: T,
    pub scores: Scores,
    pub fused: f32,
}

impl<T> Scored<T> {
    pub fn new(item: T) -> Self {
        Self {
            item,
            scores: Scores::default(),
            fused: 0.0,
        }
    }

    pub const fn with_lexical_score(mut self, score: f32) -> Self {
        self.scores.lexical = Some(score);
        self
    }

    pub const fn with_centrality_score(mut self, score: f32) -> Self {
        self.scores.centrality = Some(score);
        self
    }

    pub const fn with_rank_score(mut self, score: f32) -> Self {
        self.scores.rank = Some(score);
        self
    }

    pub const fn update_fused(&mut self, fused: f32) {
        self.fused = fused;
    }

    /// True when the query matched the record's text at all.
    pub fn matched(&self) -> bool {
        self.scores.lexical.is_some_and(|score| score > 0.0)
    }
}

/// Weights used for linear score fusion.
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub lexical: f32,
    pub centrality: f32,
    pub rank: f32,
    pub multi_bonus: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        // Query overlap dominates; structure only reorders close matches.
        Self {
            lexical: 0.7,
            centrality: 0.2,
            rank: 0.2,
            multi_bonus: 0.1,
        }
    }
}

pub const fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }

    let mut min = f32::MAX;
    let mut max = f32::MIN;

    for s in scores {
        if !s.is_finite() {
            continue;
        }
        if *s < min {
            min = *s;
        }
        if *s > max {
            max = *s;
        }
    }

    if !min.is_finite() || !max.is_finite() {
        return scores.iter().map(|_| 0.0).collect();
    }

    if (max - min).abs() < f32::EPSILON {
        return vec![1.0; scores.len()];
    }

    scores
        .iter()
        .map(|score| {
            if score.is_finite() {
                clamp_unit((score - min) / (max - min))
            } else {
                0.0
            }
        })
        .collect()
}

pub fn fuse_scores(scores: &Scores, weights: FusionWeights) -> f32 {
    let lexical = scores.lexical.unwrap_or(0.0);
    let centrality = scores.centrality.unwrap_or(0.0);
    let rank = scores.rank.unwrap_or(0.0);

    let mut fused = rank.mul_add(
        weights.rank,
        lexical.mul_add(weights.lexical, centrality * weights.centrality),
    );

    // A lexical hit on a structurally important record beats either alone.
    if lexical > 0.0 && (centrality > 0.0 || rank > 0.0) {
        fused += weights.multi_bonus;
    }

    clamp_unit(fused)
}

/// Normalizes the structural signals across `items`, then fuses every score.
pub fn fuse_all<T>(items: &mut [Scored<T>], weights: FusionWeights) {
    let centrality: Vec<f32> = items
        .iter()
        .map(|s| s.scores.centrality.unwrap_or(0.0))
        .collect();
    let rank: Vec<f32> = items.iter().map(|s| s.scores.rank.unwrap_or(0.0)).collect();
    let centrality = min_max_normalize(&centrality);
    let rank = min_max_normalize(&rank);

    for ((item, centrality), rank) in items.iter_mut().zip(centrality).zip(rank) {
        if item.scores.centrality.is_some() {
            item.scores.centrality = Some(centrality);
        }
        if item.scores.rank.is_some() {
            item.scores.rank = Some(rank);
        }
        let fused = fuse_scores(&item.scores, weights);
        item.update_fused(fused);
    }
}

pub fn sort_by_fused_desc<T>(items: &mut [Scored<T>])
where
    T: GraphRecord,
{
    items.sort_by(|a, b| {
        b.fused
            .partial_cmp(&a.fused)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.item.get_id().cmp(b.item.get_id()))
    });
}

const STOPWORDS: &[&str] = &[
    "and", "are", "can", "does", "for", "from", "has", "have", "how", "into", "its", "not",
    "the", "their", "there", "these", "this", "those", "was", "were", "what",
    "when", "where", "which", "who", "why", "with", "you", "your", "about", "tell",
];

/// Lower-cased content words of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerms {
    terms: Vec<String>,
}

impl QueryTerms {
    pub fn parse(query: &str) -> Self {
        let mut seen = HashSet::new();
        let terms = words(query)
            .filter(|word| word.chars().count() >= 3 && !STOPWORDS.contains(&word.as_str()))
            .filter(|word| seen.insert(word.clone()))
            .collect();
        Self { terms }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Share of query terms found in `text`; a term matches any word it prefixes.
    pub fn overlap(&self, text: &str) -> f32 {
        if self.terms.is_empty() {
            return 0.0;
        }
        let vocabulary: HashSet<String> = words(text).collect();
        let matched = self
            .terms
            .iter()
            .filter(|term| {
                vocabulary.contains(*term)
                    || vocabulary.iter().any(|word| word.starts_with(term.as_str()))
            })
            .count();
        matched as f32 / self.terms.len() as f32
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
