//! Phishing detector (memo + addresses)

use crate::config::RuntimeConfig;
use crate::engine::features::phishing::{self, PhishingFeatures};
use crate::engine::model;
use crate::engine::types::{DetectorId, Subscore, TransactionRequest};

use super::{subscore, Detector, Rule};

const SHORTENER_LINK: Rule = Rule { name: "shortener_link", weight: 0.50, hard: true };
const CALLBACK_PHONE: Rule = Rule { name: "callback_phone", weight: 0.45, hard: true };
const OTP_SOLICITATION: Rule = Rule { name: "otp_solicitation", weight: 0.60, hard: true };
const URGENCY_LANGUAGE: Rule = Rule { name: "urgency_language", weight: 0.20, hard: false };
const CREDENTIAL_REQUEST: Rule = Rule { name: "credential_request", weight: 0.25, hard: false };
const URL_IN_MEMO: Rule = Rule { name: "url_in_memo", weight: 0.15, hard: false };
const BANK_IMPERSONATION: Rule = Rule { name: "bank_impersonation", weight: 0.15, hard: false };
const UPPERCASE_SHOUTING: Rule = Rule { name: "uppercase_shouting", weight: 0.10, hard: false };
const OBFUSCATED_TEXT: Rule = Rule { name: "obfuscated_text", weight: 0.15, hard: false };
const SUSPICIOUS_PAYEE_HANDLE: Rule = Rule { name: "suspicious_payee_handle", weight: 0.10, hard: false };

static RULES: &[Rule] = &[
    SHORTENER_LINK,
    CALLBACK_PHONE,
    OTP_SOLICITATION,
    URGENCY_LANGUAGE,
    CREDENTIAL_REQUEST,
    URL_IN_MEMO,
    BANK_IMPERSONATION,
    UPPERCASE_SHOUTING,
    OBFUSCATED_TEXT,
    SUSPICIOUS_PAYEE_HANDLE,
];

pub struct PhishingDetector;

impl Detector for PhishingDetector {
    fn id(&self) -> DetectorId {
        DetectorId::Phishing
    }

    fn rules(&self) -> &'static [Rule] {
        RULES
    }

    fn feature_weights(&self) -> &'static [(&'static str, f64)] {
        phishing::FEATURE_WEIGHTS
    }

    fn score(&self, req: &TransactionRequest, _cfg: &RuntimeConfig) -> Subscore {
        let feats = phishing::extract(req);
        let hits = rule_hits(req, &feats);

        let p_model = model::scorer(self.id())
            .and_then(|m| m.predict_proba(&feats.to_vec()).ok());

        subscore(self.id(), p_model, hits)
    }
}

fn rule_hits(req: &TransactionRequest, feats: &PhishingFeatures) -> Vec<&'static Rule> {
    let memo = req.message.to_lowercase();
    let mut hits = Vec::new();

    if feats.has_shortener > 0.0 {
        hits.push(&SHORTENER_LINK);
    }
    if phishing::contains_phone_number(&memo) && memo.contains("call back") {
        hits.push(&CALLBACK_PHONE);
    }
    if memo.contains("otp") && (memo.contains("share") || memo.contains("tell")) {
        hits.push(&OTP_SOLICITATION);
    }
    if feats.urgency_hits > 0.0 {
        hits.push(&URGENCY_LANGUAGE);
    }
    if feats.credential_request > 0.0 {
        hits.push(&CREDENTIAL_REQUEST);
    }
    if feats.url_count > 0.0 {
        hits.push(&URL_IN_MEMO);
    }
    if feats.bank_impersonation > 0.0 {
        hits.push(&BANK_IMPERSONATION);
    }
    if feats.uppercase_fraction > 0.3 && req.message.len() >= 8 {
        hits.push(&UPPERCASE_SHOUTING);
    }
    if feats.obfuscated_tokens > 0.0 {
        hits.push(&OBFUSCATED_TEXT);
    }
    if feats.suspicious_payee > 0.0 {
        hits.push(&SUSPICIOUS_PAYEE_HANDLE);
    }

    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::TransactionType;

    fn request(memo: &str) -> TransactionRequest {
        TransactionRequest {
            transaction_id: "tx-1".into(),
            payer_vpa: "payer@bank".into(),
            payee_vpa: "friend@bank".into(),
            amount: 100.0,
            message: memo.into(),
            transaction_type: TransactionType::Pay,
            qr_payload: None,
            payee_new: 0,
            device_posture: None,
            initiated_at: None,
        }
    }

    #[test]
    fn test_clean_memo_scores_zero() {
        let sub = PhishingDetector.score(&request("Send 500 for lunch"), &RuntimeConfig::default());
        assert_eq!(sub.probability, 0.0);
        assert!(sub.rule_hits.is_empty());
        assert!(!sub.hard_hit);
    }

    #[test]
    fn test_otp_shortener_memo_is_decisive() {
        let sub = PhishingDetector.score(
            &request("URGENT: verify KYC, share OTP to 9xxxxxxxx9, tap bit.ly/abc"),
            &RuntimeConfig::default(),
        );
        assert!(sub.probability >= 0.9);
        assert!(sub.hard_hit);
        assert!(sub.rule_hits.contains(&"otp_solicitation".to_string()));
        assert!(sub.rule_hits.contains(&"shortener_link".to_string()));
    }

    #[test]
    fn test_callback_phone_rule() {
        let sub = PhishingDetector.score(
            &request("account blocked, call back on 9876543210"),
            &RuntimeConfig::default(),
        );
        assert!(sub.hard_hit);
        assert!(sub.rule_hits.contains(&"callback_phone".to_string()));
    }

    #[test]
    fn test_soft_hits_alone_stay_below_hard_gate() {
        let sub = PhishingDetector.score(
            &request("please verify your account details"),
            &RuntimeConfig::default(),
        );
        assert!(!sub.hard_hit);
        assert!(sub.probability < 0.85);
    }
}
