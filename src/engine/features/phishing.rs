//! Phishing features (memo + addresses)

use once_cell::sync::Lazy;
use regex::Regex;

use crate::engine::types::TransactionRequest;
use super::{amount_bucket, lexicon_hits};

pub const FEATURE_COUNT: usize = 9;

/// Urgency/authority lexicon scanned in the memo
pub const URGENCY_LEXICON: &[&str] = &[
    "urgent",
    "immediately",
    "emergency",
    "verify",
    "kyc",
    "blocked",
    "suspended",
    "locked",
    "expire",
    "refund",
    "reward",
    "lottery",
    "otp",
    "action required",
    "final notice",
];

/// Credential-solicitation terms
pub const CREDENTIAL_TERMS: &[&str] = &[
    "otp",
    "one time password",
    "one-time password",
    "pin",
    "cvv",
    "password",
    "pwd",
];

/// Words mimicking bank/official communication; two or more count as
/// impersonation
pub const BANK_TERMS: &[&str] = &[
    "account",
    "bank",
    "security",
    "verification",
    "blocked",
    "deactivated",
    "unauthorized",
];

/// Known URL-shortener hosts
pub const SHORTENER_HOSTS: &[&str] = &[
    "bit.ly",
    "tinyurl.com",
    "t.co",
    "goo.gl",
    "cutt.ly",
    "is.gd",
    "rb.gy",
    "ow.ly",
    "tiny.cc",
];

/// Handle fragments that mimic support/verification endpoints
pub const SUSPICIOUS_HANDLE_TERMS: &[&str] =
    &["verify", "security", "account", "official", "support", "service"];

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\+?\d[\d \-]{8,}\d)|\b\d{10}\b").expect("phone regex"));

static OBFUSCATED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[a-z]+[0-9@$][a-z0-9@$]*\b|\b[0-9@$]+[a-z]+[a-z0-9@$]*\b").expect("obfuscation regex"));

#[derive(Debug, Clone, Copy, Default)]
pub struct PhishingFeatures {
    pub urgency_hits: f32,
    pub url_count: f32,
    pub has_shortener: f32,
    pub uppercase_fraction: f32,
    pub obfuscated_tokens: f32,
    pub credential_request: f32,
    pub bank_impersonation: f32,
    pub suspicious_payee: f32,
    pub amount_bucket: f32,
}

impl PhishingFeatures {
    pub fn to_vec(&self) -> [f32; FEATURE_COUNT] {
        [
            self.urgency_hits,
            self.url_count,
            self.has_shortener,
            self.uppercase_fraction,
            self.obfuscated_tokens,
            self.credential_request,
            self.bank_impersonation,
            self.suspicious_payee,
            self.amount_bucket,
        ]
    }
}

/// Static feature weights used when the explainer needs importances and no
/// rule carries the feature
pub const FEATURE_WEIGHTS: &[(&str, f64)] = &[
    ("credential_request", 0.45),
    ("urgency_hits", 0.25),
    ("url_count", 0.20),
    ("has_shortener", 0.20),
    ("bank_impersonation", 0.10),
    ("obfuscated_tokens", 0.10),
    ("uppercase_fraction", 0.08),
    ("suspicious_payee", 0.05),
    ("amount_bucket", 0.03),
];

pub fn extract(req: &TransactionRequest) -> PhishingFeatures {
    let memo = req.message.to_lowercase();
    let payee = req.payee_vpa.to_lowercase();

    let url_count = ["http://", "https://", "www."]
        .iter()
        .map(|p| memo.matches(p).count())
        .sum::<usize>() as f32;

    let alpha: Vec<char> = req.message.chars().filter(|c| c.is_alphabetic()).collect();
    let uppercase_fraction = if alpha.is_empty() {
        0.0
    } else {
        alpha.iter().filter(|c| c.is_uppercase()).count() as f32 / alpha.len() as f32
    };

    PhishingFeatures {
        urgency_hits: (lexicon_hits(&memo, URGENCY_LEXICON) as f32 / 5.0).min(1.0),
        url_count: url_count.min(5.0) / 5.0,
        has_shortener: if contains_shortener(&memo) { 1.0 } else { 0.0 },
        uppercase_fraction,
        obfuscated_tokens: (OBFUSCATED_RE.find_iter(&memo).count() as f32 / 3.0).min(1.0),
        credential_request: if lexicon_hits(&memo, CREDENTIAL_TERMS) > 0 { 1.0 } else { 0.0 },
        bank_impersonation: if lexicon_hits(&memo, BANK_TERMS) >= 2 { 1.0 } else { 0.0 },
        suspicious_payee: if lexicon_hits(&payee, SUSPICIOUS_HANDLE_TERMS) > 0 { 1.0 } else { 0.0 },
        amount_bucket: amount_bucket(req.amount),
    }
}

pub fn contains_shortener(memo_lower: &str) -> bool {
    SHORTENER_HOSTS.iter().any(|h| memo_lower.contains(h))
}

pub fn contains_phone_number(memo: &str) -> bool {
    PHONE_RE.is_match(memo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::TransactionType;

    fn request(memo: &str) -> TransactionRequest {
        TransactionRequest {
            transaction_id: "tx-1".into(),
            payer_vpa: "payer@bank".into(),
            payee_vpa: "payee@bank".into(),
            amount: 500.0,
            message: memo.into(),
            transaction_type: TransactionType::Pay,
            qr_payload: None,
            payee_new: 0,
            device_posture: None,
            initiated_at: None,
        }
    }

    #[test]
    fn test_neutral_on_empty_memo() {
        let f = extract(&request(""));
        assert_eq!(f.urgency_hits, 0.0);
        assert_eq!(f.url_count, 0.0);
        assert_eq!(f.has_shortener, 0.0);
        assert_eq!(f.uppercase_fraction, 0.0);
        assert_eq!(f.credential_request, 0.0);
    }

    #[test]
    fn test_urgency_and_credentials() {
        let f = extract(&request("URGENT: verify KYC, share OTP now"));
        assert!(f.urgency_hits > 0.0);
        assert_eq!(f.credential_request, 1.0);
    }

    #[test]
    fn test_shortener_detection() {
        let f = extract(&request("tap bit.ly/abc to claim"));
        assert_eq!(f.has_shortener, 1.0);
        assert!(contains_shortener("see tinyurl.com/x"));
        assert!(!contains_shortener("see example.com/x"));
    }

    #[test]
    fn test_uppercase_fraction() {
        let f = extract(&request("PAY NOW"));
        assert_eq!(f.uppercase_fraction, 1.0);
    }

    #[test]
    fn test_phone_number() {
        assert!(contains_phone_number("call back on 9876543210"));
        assert!(contains_phone_number("call +91 98765 43210 now"));
        assert!(!contains_phone_number("lunch 500"));
    }

    #[test]
    fn test_suspicious_payee_handle() {
        let mut req = request("");
        req.payee_vpa = "kyc-verify@bank".into();
        let f = extract(&req);
        assert_eq!(f.suspicious_payee, 1.0);
    }
}
