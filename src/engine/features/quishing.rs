//! Quishing features (QR payload + payee)
//!
//! The QR payload is expected to be a `upi://pay?...` URI; quishing payloads
//! frequently are not. The parser is deliberately forgiving: whatever the
//! payload looks like, extraction yields a well-defined vector.

use crate::engine::types::TransactionRequest;
use super::shannon_entropy;

pub const FEATURE_COUNT: usize = 8;

/// Parameters defined by the UPI deep-link specification; anything else is
/// counted as non-standard
pub const STANDARD_PARAMS: &[&str] = &[
    "pa", "pn", "am", "cu", "tn", "tr", "mc", "tid", "url", "mode", "purpose", "sign",
];

/// Parsed QR payload. All fields optional; a missing payload parses to the
/// empty value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QrPayload {
    pub scheme: String,
    pub authority: String,
    pub params: Vec<(String, String)>,
}

impl QrPayload {
    pub fn parse(raw: &str) -> Self {
        let mut rest = raw.trim();
        let mut scheme = String::new();

        if let Some(idx) = rest.find(':') {
            // A colon before any '?' or '/' terminates a scheme
            let candidate = &rest[..idx];
            if !candidate.is_empty()
                && candidate.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-')
            {
                scheme = candidate.to_ascii_lowercase();
                rest = &rest[idx + 1..];
            }
        }

        let rest = rest.strip_prefix("//").unwrap_or(rest);

        let (authority, query) = match rest.split_once('?') {
            Some((head, query)) => (head, query),
            // A bare key=value string is a query with no authority
            None if rest.contains('=') => ("", rest),
            None => (rest, ""),
        };
        let authority = authority.split('/').next().unwrap_or("").to_string();

        let params = query
            .split('&')
            .filter(|p| !p.is_empty())
            .map(|p| match p.split_once('=') {
                Some((k, v)) => (k.to_ascii_lowercase(), v.to_string()),
                None => (p.to_ascii_lowercase(), String::new()),
            })
            .collect();

        Self { scheme, authority, params }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn encoded_payee(&self) -> Option<&str> {
        self.param("pa").filter(|v| !v.is_empty())
    }

    pub fn encoded_amount(&self) -> Option<f64> {
        self.param("am").and_then(|v| v.parse::<f64>().ok())
    }

    pub fn non_standard_param_count(&self) -> usize {
        self.params
            .iter()
            .filter(|(k, _)| !STANDARD_PARAMS.contains(&k.as_str()))
            .count()
    }

    pub fn host_is_ip_literal(&self) -> bool {
        let parts: Vec<&str> = self.authority.split('.').collect();
        parts.len() == 4 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QuishingFeatures {
    pub has_payload: f32,
    pub non_upi_scheme: f32,
    pub payee_mismatch: f32,
    /// Relative encoded-amount deviation, capped at 1.0
    pub amount_deviation: f32,
    pub ip_literal_host: f32,
    pub non_standard_params: f32,
    pub payload_length: f32,
    pub payload_entropy: f32,
}

impl QuishingFeatures {
    pub fn to_vec(&self) -> [f32; FEATURE_COUNT] {
        [
            self.has_payload,
            self.non_upi_scheme,
            self.payee_mismatch,
            self.amount_deviation,
            self.ip_literal_host,
            self.non_standard_params,
            self.payload_length,
            self.payload_entropy,
        ]
    }
}

pub const FEATURE_WEIGHTS: &[(&str, f64)] = &[
    ("payee_mismatch", 0.35),
    ("amount_deviation", 0.25),
    ("non_upi_scheme", 0.15),
    ("ip_literal_host", 0.10),
    ("non_standard_params", 0.06),
    ("payload_entropy", 0.05),
    ("payload_length", 0.04),
];

/// Relative deviation of the encoded amount from the request amount.
/// Returns 0.0 when either side is absent.
pub fn amount_deviation(encoded: Option<f64>, requested: f64) -> f64 {
    match encoded {
        Some(am) if am.is_finite() => {
            let base = requested.abs().max(1e-9);
            ((am - requested).abs() / base).min(1.0e6)
        }
        _ => 0.0,
    }
}

pub fn extract(req: &TransactionRequest) -> QuishingFeatures {
    let raw = match req.qr_payload.as_deref() {
        Some(p) if !p.is_empty() => p,
        _ => return QuishingFeatures::default(),
    };

    let payload = QrPayload::parse(raw);
    let payee_mismatch = match payload.encoded_payee() {
        Some(pa) => !pa.eq_ignore_ascii_case(req.payee_vpa.trim()),
        None => false,
    };
    let deviation = amount_deviation(payload.encoded_amount(), req.amount);

    QuishingFeatures {
        has_payload: 1.0,
        non_upi_scheme: if payload.scheme != "upi" { 1.0 } else { 0.0 },
        payee_mismatch: if payee_mismatch { 1.0 } else { 0.0 },
        amount_deviation: deviation.min(1.0) as f32,
        ip_literal_host: if payload.host_is_ip_literal() { 1.0 } else { 0.0 },
        non_standard_params: (payload.non_standard_param_count() as f32 / 4.0).min(1.0),
        payload_length: (raw.len() as f32 / 512.0).min(1.0),
        payload_entropy: (shannon_entropy(raw) / 8.0) as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::TransactionType;

    fn request(payload: Option<&str>, payee: &str, amount: f64) -> TransactionRequest {
        TransactionRequest {
            transaction_id: "tx-1".into(),
            payer_vpa: "payer@bank".into(),
            payee_vpa: payee.into(),
            amount,
            message: String::new(),
            transaction_type: TransactionType::QrPay,
            qr_payload: payload.map(str::to_string),
            payee_new: 0,
            device_posture: None,
            initiated_at: None,
        }
    }

    #[test]
    fn test_parse_upi_uri() {
        let p = QrPayload::parse("upi://pay?pa=alice@bank&pn=Alice&am=100.00&cu=INR");
        assert_eq!(p.scheme, "upi");
        assert_eq!(p.authority, "pay");
        assert_eq!(p.encoded_payee(), Some("alice@bank"));
        assert_eq!(p.encoded_amount(), Some(100.0));
        assert_eq!(p.non_standard_param_count(), 0);
    }

    #[test]
    fn test_parse_bare_query() {
        // No scheme at all, common in crafted payloads
        let p = QrPayload::parse("pa=mallory@bank&am=1000");
        assert_eq!(p.scheme, "");
        assert_eq!(p.encoded_payee(), Some("mallory@bank"));
        assert_eq!(p.encoded_amount(), Some(1000.0));
    }

    #[test]
    fn test_ip_literal_host() {
        let p = QrPayload::parse("http://192.168.4.20/pay?pa=x@y");
        assert_eq!(p.scheme, "http");
        assert!(p.host_is_ip_literal());
        assert!(!QrPayload::parse("upi://pay?pa=x@y").host_is_ip_literal());
    }

    #[test]
    fn test_missing_payload_is_neutral() {
        let f = extract(&request(None, "alice@bank", 100.0));
        assert_eq!(f.has_payload, 0.0);
        assert_eq!(f.payee_mismatch, 0.0);
        assert_eq!(f.amount_deviation, 0.0);
    }

    #[test]
    fn test_payee_mismatch() {
        let f = extract(&request(
            Some("upi://pay?pa=mallory@bank&am=100"),
            "alice@bank",
            100.0,
        ));
        assert_eq!(f.payee_mismatch, 1.0);
        assert_eq!(f.amount_deviation, 0.0);
    }

    #[test]
    fn test_amount_deviation() {
        assert_eq!(amount_deviation(None, 100.0), 0.0);
        assert!((amount_deviation(Some(101.0), 100.0) - 0.01).abs() < 1e-9);
        assert!(amount_deviation(Some(1000.0), 100.0) > 1.0);
    }

    #[test]
    fn test_matching_payload_is_quiet() {
        let f = extract(&request(
            Some("upi://pay?pa=alice@bank&am=100.00"),
            "alice@bank",
            100.0,
        ));
        assert_eq!(f.payee_mismatch, 0.0);
        assert_eq!(f.non_upi_scheme, 0.0);
        assert_eq!(f.ip_literal_host, 0.0);
    }
}
