//! Trust-score aggregation
//!
//! Weighted fusion of the four detector probabilities into a trust score and
//! a proposed action. Pure and synchronous; nothing here may suspend.

use chrono::Utc;

use crate::config::RuntimeConfig;
use crate::engine::types::{Action, Decision, DetectorId, Subscore};

/// Two or more detectors at or above this probability force a BLOCK
const CONSENSUS_BLOCK_GATE: f64 = 0.7;

/// A single detector at or above this probability forbids ALLOW
const SINGLE_DETECTOR_WARN_GATE: f64 = 0.9;

/// Trust-score ceiling applied on a hard-rule override
const HARD_OVERRIDE_TRUST_CAP: i32 = 20;

pub fn weight_of(cfg: &RuntimeConfig, id: DetectorId) -> f64 {
    match id {
        DetectorId::Phishing => cfg.weights.phishing,
        DetectorId::Quishing => cfg.weights.quishing,
        DetectorId::Collect => cfg.weights.collect,
        DetectorId::Malware => cfg.weights.malware,
    }
}

/// Fuse the four subscores into a Decision.
///
/// Hard overrides apply in order, first match wins:
/// 1. a hard rule fired and that detector's probability clears the
///    hard-rule threshold (inclusive) -> BLOCK, trust capped at 20;
/// 2. two or more detectors at p >= 0.7 -> BLOCK;
/// 3. any detector at p >= 0.9 -> at least WARN.
/// Otherwise the trust score bands decide; ties resolve stricter.
pub fn aggregate(subscores: Vec<Subscore>, cfg: &RuntimeConfig) -> Decision {
    let risk = subscores
        .iter()
        .map(|s| weight_of(cfg, s.detector) * s.probability)
        .sum::<f64>()
        .clamp(0.0, 1.0);

    let mut trust = ((1.0 - risk) * 100.0).round() as i32;
    trust = trust.clamp(0, 100);

    let hard_override = subscores
        .iter()
        .any(|s| s.hard_hit && s.probability >= cfg.hard_rule_threshold);
    let consensus = subscores
        .iter()
        .filter(|s| s.probability >= CONSENSUS_BLOCK_GATE)
        .count();
    let decisive = subscores
        .iter()
        .any(|s| s.probability >= SINGLE_DETECTOR_WARN_GATE);

    let action = if hard_override {
        trust = trust.min(HARD_OVERRIDE_TRUST_CAP);
        Action::Block
    } else if consensus >= 2 {
        Action::Block
    } else {
        let banded = band(trust, cfg);
        if decisive && banded == Action::Allow {
            Action::Warn
        } else {
            banded
        }
    };

    Decision {
        trust_score: trust as u8,
        action,
        risk,
        hard_override,
        subscores,
        timestamp: Utc::now(),
    }
}

fn band(trust: i32, cfg: &RuntimeConfig) -> Action {
    if trust >= cfg.allow_threshold {
        Action::Allow
    } else if trust >= cfg.warn_threshold {
        Action::Warn
    } else {
        Action::Block
    }
}

// ============================================================================
// TESTS
// ============================================================================
