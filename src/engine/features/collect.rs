//! Collect-request features (type + memo + payee_new + amount)

use chrono::{Datelike, Timelike, Weekday};

use crate::config::RuntimeConfig;
use crate::engine::types::{TransactionRequest, TransactionType};
use super::lexicon_hits;

pub const FEATURE_COUNT: usize = 7;

/// Reward-bait terms typical of "approve to claim" collect scams
pub const REWARD_TERMS: &[&str] = &[
    "prize",
    "claim",
    "reward",
    "won",
    "winner",
    "congratulations",
    "gift",
    "bonus",
    "lottery",
    "cashback",
];

/// Coercion/authority-pressure terms
pub const COERCION_TERMS: &[&str] = &[
    "legal",
    "court",
    "police",
    "arrest",
    "penalty",
    "fine",
    "lawyer",
    "case",
    "dues",
    "outstanding",
    "unpaid",
    "tax",
    "officer",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct CollectFeatures {
    pub is_collect: f32,
    pub payee_new: f32,
    /// Amount relative to the large-amount threshold, capped at 2x
    pub amount_ratio: f32,
    pub reward_bait: f32,
    pub coercion: f32,
    pub off_hours: f32,
    pub weekend: f32,
}

impl CollectFeatures {
    pub fn to_vec(&self) -> [f32; FEATURE_COUNT] {
        [
            self.is_collect,
            self.payee_new,
            self.amount_ratio,
            self.reward_bait,
            self.coercion,
            self.off_hours,
            self.weekend,
        ]
    }
}

pub const FEATURE_WEIGHTS: &[(&str, f64)] = &[
    ("coercion", 0.30),
    ("reward_bait", 0.25),
    ("is_collect", 0.20),
    ("payee_new", 0.15),
    ("amount_ratio", 0.10),
    ("off_hours", 0.05),
    ("weekend", 0.03),
];

pub fn extract(req: &TransactionRequest, cfg: &RuntimeConfig) -> CollectFeatures {
    let memo = req.message.to_lowercase();

    let (off_hours, weekend) = match req.initiated_at {
        Some(ts) => {
            let hour = ts.hour();
            let off = hour < 6 || hour >= 22;
            let wknd = matches!(ts.weekday(), Weekday::Sat | Weekday::Sun);
            (off, wknd)
        }
        None => (false, false),
    };

    let threshold = cfg.large_amount_threshold.max(1.0);

    CollectFeatures {
        is_collect: if req.transaction_type == TransactionType::Collect { 1.0 } else { 0.0 },
        payee_new: if req.is_new_payee() { 1.0 } else { 0.0 },
        amount_ratio: ((req.amount / threshold).clamp(0.0, 2.0) / 2.0) as f32,
        reward_bait: if lexicon_hits(&memo, REWARD_TERMS) > 0 { 1.0 } else { 0.0 },
        coercion: if lexicon_hits(&memo, COERCION_TERMS) > 0 { 1.0 } else { 0.0 },
        off_hours: if off_hours { 1.0 } else { 0.0 },
        weekend: if weekend { 1.0 } else { 0.0 },
    }
}
