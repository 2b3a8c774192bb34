//! Resolves weighted classifier labels into one fine-grained domain category.
//!
//! Every category is scored by its best matching label. A label matches when its
//! lowercased text contains one of the category tokens as a plain substring, so
//! `"coffee mug"` and `"mugshot"` both match `"mug"`. Word boundaries are not
//! enforced. Labels that also contain a context stoplist token describe the
//! surroundings rather than the object and are scaled by the pack's context
//! penalty.
//!
//! Categories scoring at least the pack threshold are eligible; the eligible one
//! with the highest priority wins, then the higher score, then pack order.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::detection::LabelCandidate;
use crate::domain_pack::{Attributes, DomainCategory, DomainPack};

pub const NO_MATCH_REASON: &str = "No tokens matched any category";
pub const BELOW_THRESHOLD_REASON: &str = "No category met threshold";

/// Score of one category against the signal set.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub category_id: String,
    pub priority: i32,
    pub score: f32,
    pub matched_label: String,
    pub matched_token: String,
    /// The winning label also contained a context stoplist token.
    pub contextual: bool,
    pub eligible: bool,
    order: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappingResult {
    pub category_id: Option<String>,
    pub display_label: Option<String>,
    /// Winning score rounded to three decimals, `0.0` when nothing was selected.
    pub score: f32,
    pub attributes: Attributes,
    pub matched_label: Option<String>,
    pub matched_token: Option<String>,
    pub reason: String,
    /// Best-scoring candidate regardless of threshold, kept for diagnostics.
    pub fallback: Option<Candidate>,
    /// Every category with at least one matching label, best score first.
    pub candidates: Vec<Candidate>,
}

impl MappingResult {
    #[inline]
    pub fn is_categorized(&self) -> bool {
        self.category_id.is_some()
    }

    fn uncategorized(
        reason: String,
        fallback: Option<Candidate>,
        candidates: Vec<Candidate>,
    ) -> Self {
        Self {
            category_id: None,
            display_label: None,
            score: 0.0,
            attributes: Attributes::new(),
            matched_label: None,
            matched_token: None,
            reason,
            fallback,
            candidates,
        }
    }
}

/// Mapper bound to one loaded pack.
#[derive(Debug, Clone)]
pub struct CategoryMapper {
    pack: Arc<DomainPack>,
}

impl CategoryMapper {
    pub fn new(pack: Arc<DomainPack>) -> Self {
        Self { pack }
    }

    #[inline]
    pub fn pack(&self) -> &DomainPack {
        &self.pack
    }

    pub fn resolve(&self, signals: &[LabelCandidate]) -> MappingResult {
        resolve(&self.pack, signals)
    }
}

/// Label prepared for matching. `text` is kept as given for reporting.
struct Signal<'a> {
    text: &'a str,
    lowered: String,
    confidence: f32,
}

pub fn resolve(pack: &DomainPack, signals: &[LabelCandidate]) -> MappingResult {
    let penalty = pack.effective_context_penalty();
    let prepared: Vec<Signal<'_>> = signals
        .iter()
        .filter(|s| s.confidence.is_finite())
        .map(|s| Signal {
            text: &s.text,
            lowered: s.text.to_lowercase(),
            confidence: s.confidence.clamp(0.0, 1.0),
        })
        .collect();

    let mut candidates: Vec<Candidate> = pack
        .categories
        .iter()
        .enumerate()
        .filter_map(|(order, category)| {
            score_category(pack, penalty, order, category, &prepared)
        })
        .collect();

    candidates.sort_by(by_score);

    let fallback = candidates.first().cloned();
    let Some(best) = fallback.as_ref() else {
        let reason = format!("{} ({} signal(s) checked)", NO_MATCH_REASON, prepared.len());
        tracing::debug!(pack = %pack.id, %reason, "Mapping produced no category");
        return MappingResult::uncategorized(reason, None, candidates);
    };

    let winner = candidates
        .iter()
        .filter(|c| c.eligible)
        .min_by(|a, b| by_priority(a, b));

    let Some(winner) = winner.cloned() else {
        let reason = format!(
            "{} {:.2}: best candidate '{}' scored {:.3}",
            BELOW_THRESHOLD_REASON, pack.threshold, best.category_id, best.score
        );
        tracing::debug!(pack = %pack.id, %reason, "Mapping produced no category");
        return MappingResult::uncategorized(reason, fallback, candidates);
    };

    let outranked: Vec<&str> = candidates
        .iter()
        .filter(|c| c.eligible && c.category_id != winner.category_id)
        .map(|c| c.category_id.as_str())
        .collect();

    let mut reason = format!(
        "Selected '{}' (priority {}, score {:.3}) via token '{}' in '{}'",
        winner.category_id,
        winner.priority,
        winner.score,
        winner.matched_token,
        winner.matched_label
    );
    if winner.contextual {
        reason.push_str(&format!(" [contextual match, penalty {:.2}]", penalty));
    }
    if !outranked.is_empty() {
        reason.push_str(&format!("; outranked {}", outranked.join(", ")));
    }

    tracing::debug!(pack = %pack.id, category = %winner.category_id, %reason, "Mapped category");

    let category = &pack.categories[winner.order];

    MappingResult {
        category_id: Some(winner.category_id.clone()),
        display_label: Some(category.label().to_string()),
        score: round_score(winner.score),
        attributes: category.attributes.clone(),
        matched_label: Some(winner.matched_label.clone()),
        matched_token: Some(winner.matched_token.clone()),
        reason,
        fallback,
        candidates,
    }
}

fn score_category(
    pack: &DomainPack,
    penalty: f32,
    order: usize,
    category: &DomainCategory,
    signals: &[Signal<'_>],
) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;

    for signal in signals {
        let label = &signal.lowered;
        let token = category
            .tokens
            .iter()
            .map(|t| t.to_lowercase())
            .find(|t| !t.is_empty() && label.contains(t.as_str()));

        let Some(token) = token else {
            continue;
        };

        let contextual = pack
            .context_stoplist
            .iter()
            .map(|t| t.to_lowercase())
            .any(|t| !t.is_empty() && label.contains(t.as_str()));

        let score = if contextual {
            signal.confidence * penalty
        } else {
            signal.confidence
        };

        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(Candidate {
                category_id: category.id.clone(),
                priority: category.priority,
                score,
                matched_label: signal.text.to_string(),
                matched_token: token,
                contextual,
                eligible: score >= pack.threshold,
                order,
            });
        }
    }

    best
}

fn by_score(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(b.priority.cmp(&a.priority))
        .then(a.order.cmp(&b.order))
}

fn by_priority(a: &Candidate, b: &Candidate) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then(b.score.total_cmp(&a.score))
        .then(a.order.cmp(&b.order))
}

#[inline]
fn round_score(score: f32) -> f32 {
    (score * 1000.0).round() / 1000.0
}
