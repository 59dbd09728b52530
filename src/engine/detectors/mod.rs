//! The four risk detectors
//!
//! Every detector is the same shape: its extractor builds a feature vector,
//! the loaded model (if any) yields `p_model`, the rule overlay yields
//! weighted hits, and the two are blended. A hard rule is strong evidence
//! and is never diluted by the model; soft hits blend 60/40 with it. With no
//! model the detector runs rule-only.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::config::RuntimeConfig;
use crate::engine::model;
use crate::engine::types::{ConfidenceTier, DetectorId, Subscore, TransactionRequest};

pub mod collect;
pub mod malware;
pub mod phishing;
pub mod quishing;

/// One rule in a detector's overlay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rule {
    pub name: &'static str,
    pub weight: f64,
    pub hard: bool,
}

/// Common capability interface across the four detectors
pub trait Detector: Send + Sync {
    fn id(&self) -> DetectorId;

    /// Full rule catalogue, used by the explainer for weight lookups
    fn rules(&self) -> &'static [Rule];

    /// Static feature weights, the explainer's fallback importance source
    fn feature_weights(&self) -> &'static [(&'static str, f64)];

    /// Score one request. Must never panic.
    fn score(&self, req: &TransactionRequest, cfg: &RuntimeConfig) -> Subscore;

    fn is_ready(&self) -> bool {
        model::is_loaded(self.id())
    }
}

static REGISTRY: Lazy<Vec<Arc<dyn Detector>>> = Lazy::new(|| {
    vec![
        Arc::new(phishing::PhishingDetector),
        Arc::new(quishing::QuishingDetector),
        Arc::new(collect::CollectDetector),
        Arc::new(malware::MalwareDetector),
    ]
});

/// The fixed collection of exactly four detector implementations
pub fn registry() -> &'static [Arc<dyn Detector>] {
    &REGISTRY
}

pub fn detector(id: DetectorId) -> Arc<dyn Detector> {
    REGISTRY
        .iter()
        .find(|d| d.id() == id)
        .cloned()
        .expect("registry covers every detector id")
}

/// Weight of a named rule within a detector's catalogue
pub fn rule_weight(id: DetectorId, name: &str) -> Option<f64> {
    detector(id).rules().iter().find(|r| r.name == name).map(|r| r.weight)
}

// ============================================================================
// BLENDING
// ============================================================================

/// Clamped weighted sum of the fired rules
pub(crate) fn rule_probability(hits: &[&Rule]) -> f64 {
    hits.iter().map(|r| r.weight).sum::<f64>().clamp(0.0, 1.0)
}

/// Fuse model and rule probabilities.
///
/// `max` when any hit is hard: a deterministic pattern must not be talked
/// down by an over-confident benign model prediction. Soft blending for the
/// remainder keeps a brittle model from dominating.
pub(crate) fn blend(p_model: Option<f64>, hits: &[&Rule]) -> f64 {
    let p_rules = rule_probability(hits);
    let hard = hits.iter().any(|r| r.hard);

    match p_model {
        Some(pm) if hard => pm.max(p_rules),
        Some(pm) => 0.6 * pm + 0.4 * p_rules,
        None => p_rules,
    }
}

/// Confidence tier from model margin and rule corroboration. Rule-only
/// verdicts cap at medium: without a model there is nothing to corroborate
/// the rules against.
pub(crate) fn tier_of(p_model: Option<f64>, rule_count: usize) -> ConfidenceTier {
    match p_model {
        Some(pm) => {
            let margin = (pm - 0.5).abs();
            if margin >= 0.45 || (margin >= 0.35 && rule_count > 0) {
                ConfidenceTier::High
            } else if margin >= 0.2 || rule_count >= 2 {
                ConfidenceTier::Medium
            } else {
                ConfidenceTier::Low
            }
        }
        None => {
            if rule_count >= 2 {
                ConfidenceTier::Medium
            } else {
                ConfidenceTier::Low
            }
        }
    }
}

/// Assemble a subscore from the blended pieces
pub(crate) fn subscore(id: DetectorId, p_model: Option<f64>, hits: Vec<&'static Rule>) -> Subscore {
    Subscore {
        detector: id,
        probability: blend(p_model, &hits),
        confidence: tier_of(p_model, hits.len()),
        hard_hit: hits.iter().any(|r| r.hard),
        rule_hits: hits.iter().map(|r| r.name.to_string()).collect(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
