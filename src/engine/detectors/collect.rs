//! Collect-request fraud detector

use crate::config::RuntimeConfig;
use crate::engine::features::collect::{self, CollectFeatures};
use crate::engine::model;
use crate::engine::types::{DetectorId, Subscore, TransactionRequest, TransactionType};

use super::{subscore, Detector, Rule};

const LARGE_AMOUNT_NEW_PAYEE: Rule = Rule { name: "large_amount_new_payee", weight: 0.55, hard: true };
const COLLECT_REQUEST: Rule = Rule { name: "collect_request", weight: 0.15, hard: false };
const FIRST_TIME_PAYEE: Rule = Rule { name: "first_time_payee", weight: 0.15, hard: false };
const AMOUNT_ABOVE_BASELINE: Rule = Rule { name: "amount_above_baseline", weight: 0.10, hard: false };
const REWARD_BAIT_LANGUAGE: Rule = Rule { name: "reward_bait_language", weight: 0.20, hard: false };
const COERCION_LANGUAGE: Rule = Rule { name: "coercion_language", weight: 0.25, hard: false };
const OFF_HOURS_COLLECT: Rule = Rule { name: "off_hours_collect", weight: 0.05, hard: false };

static RULES: &[Rule] = &[
    LARGE_AMOUNT_NEW_PAYEE,
    COLLECT_REQUEST,
    FIRST_TIME_PAYEE,
    AMOUNT_ABOVE_BASELINE,
    REWARD_BAIT_LANGUAGE,
    COERCION_LANGUAGE,
    OFF_HOURS_COLLECT,
];

pub struct CollectDetector;

impl Detector for CollectDetector {
    fn id(&self) -> DetectorId {
        DetectorId::Collect
    }

    fn rules(&self) -> &'static [Rule] {
        RULES
    }

    fn feature_weights(&self) -> &'static [(&'static str, f64)] {
        collect::FEATURE_WEIGHTS
    }

    fn score(&self, req: &TransactionRequest, cfg: &RuntimeConfig) -> Subscore {
        let feats = collect::extract(req, cfg);
        let hits = rule_hits(req, &feats, cfg);

        let p_model = model::scorer(self.id())
            .and_then(|m| m.predict_proba(&feats.to_vec()).ok());

        subscore(self.id(), p_model, hits)
    }
}

fn rule_hits(
    req: &TransactionRequest,
    feats: &CollectFeatures,
    cfg: &RuntimeConfig,
) -> Vec<&'static Rule> {
    let is_collect = req.transaction_type == TransactionType::Collect;
    let mut hits = Vec::new();

    // Boundary is inclusive
    if is_collect && req.is_new_payee() && req.amount >= cfg.large_amount_threshold {
        hits.push(&LARGE_AMOUNT_NEW_PAYEE);
    }
    if is_collect {
        hits.push(&COLLECT_REQUEST);
    }
    if req.is_new_payee() {
        hits.push(&FIRST_TIME_PAYEE);
    }
    if req.amount >= cfg.large_amount_threshold * 0.5 {
        hits.push(&AMOUNT_ABOVE_BASELINE);
    }
    if feats.reward_bait > 0.0 {
        hits.push(&REWARD_BAIT_LANGUAGE);
    }
    if feats.coercion > 0.0 {
        hits.push(&COERCION_LANGUAGE);
    }
    if is_collect && feats.off_hours > 0.0 {
        hits.push(&OFF_HOURS_COLLECT);
    }

    hits
}
