//! Explanation engine
//!
//! Turns a Decision into the human-facing pieces of the response: ranked
//! reasons, a pie-chart-ready risk decomposition, normalized feature
//! importances and a coarse risk level.

use serde::{Deserialize, Serialize};

use crate::config::RuntimeConfig;
use crate::engine::aggregator::weight_of;
use crate::engine::detectors;
use crate::engine::types::{Decision, DetectorId, Subscore, TransactionRequest};

/// Detectors below this probability stay out of the narrative
const REASON_GATE: f64 = 0.3;

/// Reasons are capped so the client UI stays scannable
const MAX_REASONS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "LOW-MEDIUM")]
    LowMedium,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl RiskLevel {
    /// Band the residual risk (1 - trust/100)
    pub fn from_trust_score(trust_score: u8) -> Self {
        let risk = 1.0 - f64::from(trust_score) / 100.0;
        if risk < 0.2 {
            RiskLevel::Low
        } else if risk < 0.4 {
            RiskLevel::LowMedium
        } else if risk < 0.6 {
            RiskLevel::Medium
        } else if risk < 0.8 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

/// Per-detector share of the fused risk; shares sum to ~1.0
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskBreakdown {
    pub phishing: f64,
    pub quishing: f64,
    pub collect: f64,
    pub malware: f64,
}

impl RiskBreakdown {
    pub fn sum(&self) -> f64 {
        self.phishing + self.quishing + self.collect + self.malware
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub name: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub reasons: Vec<String>,
    pub risk_breakdown: RiskBreakdown,
    pub feature_importance: Vec<FeatureImportance>,
    pub risk_level: RiskLevel,
    /// True when no detector contributed any risk and the breakdown is the
    /// uniform placeholder
    pub nominal: bool,
}

pub fn explain(req: &TransactionRequest, decision: &Decision, cfg: &RuntimeConfig) -> Explanation {
    let (risk_breakdown, nominal) = breakdown(decision, cfg);

    Explanation {
        reasons: reasons(req, decision, cfg),
        risk_breakdown,
        feature_importance: feature_importance(decision),
        risk_level: RiskLevel::from_trust_score(decision.trust_score),
        nominal,
    }
}

// ============================================================================
// REASONS
// ============================================================================

fn reasons(req: &TransactionRequest, decision: &Decision, cfg: &RuntimeConfig) -> Vec<String> {
    let mut ranked: Vec<(f64, String)> = Vec::new();

    for sub in &decision.subscores {
        if sub.probability < REASON_GATE {
            continue;
        }
        let rank = weight_of(cfg, sub.detector) * sub.probability;
        ranked.push((rank, detector_reason(sub)));
    }

    // Transaction-shape reasons carry a nominal rank so they sort last
    if req.is_new_payee() {
        ranked.push((0.01, "First-time payee for this payer".to_string()));
    }
    if req.amount >= cfg.large_amount_threshold {
        ranked.push((0.01, "Amount is above the large-amount threshold".to_string()));
    }

    ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(MAX_REASONS);
    ranked.into_iter().map(|(_, r)| r).collect()
}

/// One sentence per flagged detector, keyed by its highest-weighted rule hit
fn detector_reason(sub: &Subscore) -> String {
    let top_rule = sub
        .rule_hits
        .iter()
        .filter_map(|name| {
            detectors::rule_weight(sub.detector, name).map(|w| (w, name.as_str()))
        })
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, name)| name);

    match (sub.detector, top_rule) {
        (DetectorId::Phishing, Some("otp_solicitation")) => {
            "Message asks the payer to share an OTP".to_string()
        }
        (DetectorId::Phishing, Some("shortener_link")) => {
            "Message contains a link-shortener URL commonly used in phishing".to_string()
        }
        (DetectorId::Phishing, Some("callback_phone")) => {
            "Message pushes a call-back to an unknown phone number".to_string()
        }
        (DetectorId::Phishing, Some(rule)) => {
            format!("Phishing indicators in the message ({})", pretty(rule))
        }
        (DetectorId::Phishing, None) => "Message resembles known phishing patterns".to_string(),

        (DetectorId::Quishing, Some("payee_mismatch")) => {
            "QR payload payee does not match the requested payee".to_string()
        }
        (DetectorId::Quishing, Some("amount_mismatch")) => {
            "QR payload amount differs from the requested amount".to_string()
        }
        (DetectorId::Quishing, Some("non_upi_scheme")) => {
            "QR payload does not use the upi: scheme".to_string()
        }
        (DetectorId::Quishing, Some("ip_literal_host")) => {
            "QR payload points at a raw IP address".to_string()
        }
        (DetectorId::Quishing, Some(rule)) => {
            format!("Suspicious QR payload ({})", pretty(rule))
        }
        (DetectorId::Quishing, None) => "QR payload resembles known quishing patterns".to_string(),

        (DetectorId::Collect, Some("large_amount_new_payee")) => {
            "Large collect request from a first-time payee".to_string()
        }
        (DetectorId::Collect, Some("coercion_language")) => {
            "Collect request uses threatening or legal-pressure language".to_string()
        }
        (DetectorId::Collect, Some("reward_bait_language")) => {
            "Collect request promises a prize or reward".to_string()
        }
        (DetectorId::Collect, Some(rule)) => {
            format!("Suspicious collect request ({})", pretty(rule))
        }
        (DetectorId::Collect, None) => "Collect request resembles known scam patterns".to_string(),

        (DetectorId::Malware, Some("debugger_attached")) => {
            "A debugger is attached to the payment app".to_string()
        }
        (DetectorId::Malware, Some("sideload_accessibility_combo")) => {
            "Recently sideloaded app holds accessibility control".to_string()
        }
        (DetectorId::Malware, Some(rule)) => {
            format!("Device posture indicates possible compromise ({})", pretty(rule))
        }
        (DetectorId::Malware, None) => "Device posture indicates possible compromise".to_string(),
    }
}

fn pretty(rule: &str) -> String {
    rule.replace('_', " ")
}

// ============================================================================
// RISK BREAKDOWN
// ============================================================================

fn breakdown(decision: &Decision, cfg: &RuntimeConfig) -> (RiskBreakdown, bool) {
    let share = |id: DetectorId| -> f64 {
        decision
            .subscore(id)
            .map(|s| weight_of(cfg, id) * s.probability)
            .unwrap_or(0.0)
    };

    let raw = RiskBreakdown {
        phishing: share(DetectorId::Phishing),
        quishing: share(DetectorId::Quishing),
        collect: share(DetectorId::Collect),
        malware: share(DetectorId::Malware),
    };

    let total = raw.sum();
    if total <= f64::EPSILON {
        // Nothing contributed; report a uniform nominal split
        return (
            RiskBreakdown { phishing: 0.25, quishing: 0.25, collect: 0.25, malware: 0.25 },
            true,
        );
    }

    (
        RiskBreakdown {
            phishing: raw.phishing / total,
            quishing: raw.quishing / total,
            collect: raw.collect / total,
            malware: raw.malware / total,
        },
        false,
    )
}

// ============================================================================
// FEATURE IMPORTANCE
// ============================================================================

/// Top two signals per triggered detector, deduped in rank order and
/// renormalized to sum 1. Rule weights come first; the extractor's static
/// feature weights fill in when a detector triggered on the model alone.
fn feature_importance(decision: &Decision) -> Vec<FeatureImportance> {
    let mut picked: Vec<(String, f64)> = Vec::new();

    for sub in &decision.subscores {
        if sub.probability < REASON_GATE {
            continue;
        }

        let detector = detectors::detector(sub.detector);
        let mut candidates: Vec<(String, f64)> = sub
            .rule_hits
            .iter()
            .filter_map(|name| {
                detectors::rule_weight(sub.detector, name).map(|w| (name.clone(), w))
            })
            .collect();
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        if candidates.is_empty() {
            candidates = detector
                .feature_weights()
                .iter()
                .take(2)
                .map(|(n, w)| (n.to_string(), *w))
                .collect();
        }

        for (name, weight) in candidates.into_iter().take(2) {
            if !picked.iter().any(|(n, _)| *n == name) {
                picked.push((name, weight));
            }
        }
    }

    let total: f64 = picked.iter().map(|(_, w)| w).sum();
    if total <= f64::EPSILON {
        return Vec::new();
    }

    picked
        .into_iter()
        .map(|(name, weight)| FeatureImportance { name, importance: weight / total })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::aggregator::aggregate;
    use crate::engine::types::{ConfidenceTier, TransactionType};

    fn request() -> TransactionRequest {
        TransactionRequest {
            transaction_id: "tx-1".into(),
            payer_vpa: "payer@bank".into(),
            payee_vpa: "payee@bank".into(),
            amount: 100.0,
            message: String::new(),
            transaction_type: TransactionType::Pay,
            qr_payload: None,
            payee_new: 0,
            device_posture: None,
            initiated_at: None,
        }
    }

    fn sub(id: DetectorId, p: f64, hits: &[&str], hard: bool) -> Subscore {
        Subscore {
            detector: id,
            probability: p,
            rule_hits: hits.iter().map(|s| s.to_string()).collect(),
            confidence: ConfidenceTier::Medium,
            hard_hit: hard,
        }
    }

    fn quiet() -> Vec<Subscore> {
        DetectorId::ALL.map(|id| sub(id, 0.0, &[], false)).to_vec()
    }

    #[test]
    fn test_quiet_request_has_no_reasons_and_nominal_breakdown() {
        let cfg = RuntimeConfig::default();
        let decision = aggregate(quiet(), &cfg);
        let e = explain(&request(), &decision, &cfg);

        assert!(e.reasons.is_empty());
        assert!(e.nominal);
        assert!((e.risk_breakdown.sum() - 1.0).abs() < 0.01);
        assert_eq!(e.risk_level, RiskLevel::Low);
        assert!(e.feature_importance.is_empty());
    }

    #[test]
    fn test_breakdown_shares_sum_to_one() {
        let cfg = RuntimeConfig::default();
        let mut subs = quiet();
        subs[0] = sub(DetectorId::Phishing, 0.9, &["otp_solicitation"], true);
        subs[3] = sub(DetectorId::Malware, 0.3, &["recent_sideload"], false);
        let decision = aggregate(subs, &cfg);
        let e = explain(&request(), &decision, &cfg);

        assert!(!e.nominal);
        assert!((e.risk_breakdown.sum() - 1.0).abs() < 0.01);
        assert!(e.risk_breakdown.phishing > e.risk_breakdown.malware);
    }

    #[test]
    fn test_reason_templates_mention_the_top_rule() {
        let cfg = RuntimeConfig::default();
        let mut subs = quiet();
        subs[1] = sub(
            DetectorId::Quishing,
            1.0,
            &["payee_mismatch", "amount_mismatch"],
            true,
        );
        let decision = aggregate(subs, &cfg);
        let e = explain(&request(), &decision, &cfg);

        assert!(e.reasons.iter().any(|r| r.contains("does not match the requested payee")));
    }

    #[test]
    fn test_reasons_capped_at_six() {
        let cfg = RuntimeConfig::default();
        let subs = vec![
            sub(DetectorId::Phishing, 0.9, &["otp_solicitation"], true),
            sub(DetectorId::Quishing, 0.9, &["payee_mismatch"], true),
            sub(DetectorId::Collect, 0.9, &["coercion_language"], false),
            sub(DetectorId::Malware, 0.9, &["debugger_attached"], true),
        ];
        let mut req = request();
        req.payee_new = 1;
        req.amount = 100_000.0;
        let decision = aggregate(subs, &cfg);
        let e = explain(&req, &decision, &cfg);

        assert_eq!(e.reasons.len(), 6);
    }

    #[test]
    fn test_shape_reasons_sort_after_detector_reasons() {
        let cfg = RuntimeConfig::default();
        let mut subs = quiet();
        subs[2] = sub(DetectorId::Collect, 0.8, &["reward_bait_language"], false);
        let mut req = request();
        req.payee_new = 1;
        let decision = aggregate(subs, &cfg);
        let e = explain(&req, &decision, &cfg);

        assert_eq!(e.reasons.len(), 2);
        assert!(e.reasons[0].contains("prize or reward"));
        assert!(e.reasons[1].contains("First-time payee"));
    }

    #[test]
    fn test_feature_importance_normalizes() {
        let cfg = RuntimeConfig::default();
        let mut subs = quiet();
        subs[0] = sub(
            DetectorId::Phishing,
            0.95,
            &["otp_solicitation", "shortener_link", "urgency_language"],
            true,
        );
        subs[3] = sub(DetectorId::Malware, 0.85, &["debugger_attached"], true);
        let decision = aggregate(subs, &cfg);
        let e = explain(&request(), &decision, &cfg);

        let total: f64 = e.feature_importance.iter().map(|f| f.importance).sum();
        assert!((total - 1.0).abs() < 1e-9);
        // Top-2 per detector: otp + shortener from phishing, debugger from malware
        assert_eq!(e.feature_importance.len(), 3);
        assert_eq!(e.feature_importance[0].name, "otp_solicitation");
    }

    #[test]
    fn test_risk_level_bands() {
        assert_eq!(RiskLevel::from_trust_score(95), RiskLevel::Low);
        assert_eq!(RiskLevel::from_trust_score(70), RiskLevel::LowMedium);
        assert_eq!(RiskLevel::from_trust_score(55), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_trust_score(30), RiskLevel::High);
        assert_eq!(RiskLevel::from_trust_score(10), RiskLevel::Critical);
    }
}
