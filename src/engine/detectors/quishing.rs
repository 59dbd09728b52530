//! Quishing detector (QR payload + payee)

use crate::config::RuntimeConfig;
use crate::engine::features::quishing::{self, QrPayload, QuishingFeatures};
use crate::engine::model;
use crate::engine::types::{DetectorId, Subscore, TransactionRequest};

use super::{subscore, Detector, Rule};

const PAYEE_MISMATCH: Rule = Rule { name: "payee_mismatch", weight: 0.60, hard: true };
const AMOUNT_MISMATCH: Rule = Rule { name: "amount_mismatch", weight: 0.50, hard: true };
const NON_UPI_SCHEME: Rule = Rule { name: "non_upi_scheme", weight: 0.45, hard: true };
const IP_LITERAL_HOST: Rule = Rule { name: "ip_literal_host", weight: 0.40, hard: true };
const NON_STANDARD_PARAMS: Rule = Rule { name: "non_standard_params", weight: 0.15, hard: false };
const HIGH_ENTROPY_PAYLOAD: Rule = Rule { name: "high_entropy_payload", weight: 0.15, hard: false };
const OVERSIZED_PAYLOAD: Rule = Rule { name: "oversized_payload", weight: 0.10, hard: false };

static RULES: &[Rule] = &[
    PAYEE_MISMATCH,
    AMOUNT_MISMATCH,
    NON_UPI_SCHEME,
    IP_LITERAL_HOST,
    NON_STANDARD_PARAMS,
    HIGH_ENTROPY_PAYLOAD,
    OVERSIZED_PAYLOAD,
];

/// Encoded amounts further than 1% from the request amount are a mismatch
const AMOUNT_TOLERANCE: f64 = 0.01;

/// Shannon entropy (bits/byte) above which a payload looks packed
const ENTROPY_GATE: f64 = 5.5;

const LENGTH_GATE: usize = 512;

pub struct QuishingDetector;

impl Detector for QuishingDetector {
    fn id(&self) -> DetectorId {
        DetectorId::Quishing
    }

    fn rules(&self) -> &'static [Rule] {
        RULES
    }

    fn feature_weights(&self) -> &'static [(&'static str, f64)] {
        quishing::FEATURE_WEIGHTS
    }

    fn score(&self, req: &TransactionRequest, _cfg: &RuntimeConfig) -> Subscore {
        let feats = quishing::extract(req);
        let hits = rule_hits(req, &feats);

        let p_model = model::scorer(self.id())
            .and_then(|m| m.predict_proba(&feats.to_vec()).ok());

        subscore(self.id(), p_model, hits)
    }
}

fn rule_hits(req: &TransactionRequest, feats: &QuishingFeatures) -> Vec<&'static Rule> {
    // No payload, nothing to judge
    if feats.has_payload == 0.0 {
        return Vec::new();
    }

    let raw = req.qr_payload.as_deref().unwrap_or("");
    let payload = QrPayload::parse(raw);
    let mut hits = Vec::new();

    if feats.payee_mismatch > 0.0 {
        hits.push(&PAYEE_MISMATCH);
    }
    if quishing::amount_deviation(payload.encoded_amount(), req.amount) > AMOUNT_TOLERANCE {
        hits.push(&AMOUNT_MISMATCH);
    }
    if feats.non_upi_scheme > 0.0 {
        hits.push(&NON_UPI_SCHEME);
    }
    if feats.ip_literal_host > 0.0 {
        hits.push(&IP_LITERAL_HOST);
    }
    if payload.non_standard_param_count() > 0 {
        hits.push(&NON_STANDARD_PARAMS);
    }
    if feats.payload_entropy as f64 * 8.0 > ENTROPY_GATE {
        hits.push(&HIGH_ENTROPY_PAYLOAD);
    }
    if raw.len() > LENGTH_GATE {
        hits.push(&OVERSIZED_PAYLOAD);
    }

    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::TransactionType;

    fn request(payload: &str, payee: &str, amount: f64) -> TransactionRequest {
        TransactionRequest {
            transaction_id: "tx-1".into(),
            payer_vpa: "payer@bank".into(),
            payee_vpa: payee.into(),
            amount,
            message: String::new(),
            transaction_type: TransactionType::QrPay,
            qr_payload: Some(payload.into()),
            payee_new: 0,
            device_posture: None,
            initiated_at: None,
        }
    }

    #[test]
    fn test_no_payload_scores_zero() {
        let mut req = request("", "alice@bank", 100.0);
        req.qr_payload = None;
        let sub = QuishingDetector.score(&req, &RuntimeConfig::default());
        assert_eq!(sub.probability, 0.0);
        assert!(sub.rule_hits.is_empty());
    }

    #[test]
    fn test_redirected_payee_and_amount() {
        let sub = QuishingDetector.score(
            &request("upi://pay?pa=mallory@bank&am=1000", "alice@bank", 100.0),
            &RuntimeConfig::default(),
        );
        assert!(sub.probability >= 0.9);
        assert!(sub.hard_hit);
        assert!(sub.rule_hits.contains(&"payee_mismatch".to_string()));
        assert!(sub.rule_hits.contains(&"amount_mismatch".to_string()));
    }

    #[test]
    fn test_amount_within_tolerance() {
        let sub = QuishingDetector.score(
            &request("upi://pay?pa=alice@bank&am=100.5", "alice@bank", 100.0),
            &RuntimeConfig::default(),
        );
        assert!(!sub.rule_hits.contains(&"amount_mismatch".to_string()));
    }

    #[test]
    fn test_foreign_scheme_and_ip_host() {
        let sub = QuishingDetector.score(
            &request("http://10.0.0.5/claim?pa=alice@bank", "alice@bank", 100.0),
            &RuntimeConfig::default(),
        );
        assert!(sub.hard_hit);
        assert!(sub.rule_hits.contains(&"non_upi_scheme".to_string()));
        assert!(sub.rule_hits.contains(&"ip_literal_host".to_string()));
    }

    #[test]
    fn test_well_formed_payload_is_quiet() {
        let sub = QuishingDetector.score(
            &request("upi://pay?pa=alice@bank&pn=Alice&am=100.00&cu=INR", "alice@bank", 100.0),
            &RuntimeConfig::default(),
        );
        assert_eq!(sub.probability, 0.0);
        assert!(!sub.hard_hit);
    }
}
