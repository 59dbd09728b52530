//! Core data model for the decisioning pipeline
//!
//! Only types live here; detector, aggregation and policy logic stay in
//! their own modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// REQUEST
// ============================================================================

/// Payment flow being screened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    #[default]
    Pay,
    Collect,
    QrPay,
}

/// Device-posture bundle supplied by the payment client. The service never
/// samples device sensors itself; absent flags are treated as clean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DevicePosture {
    #[serde(default)]
    pub installed_app_count: u32,
    #[serde(default)]
    pub suspicious_app_flag: bool,
    #[serde(default)]
    pub accessibility_service_active: bool,
    #[serde(default)]
    pub screen_overlay_active: bool,
    #[serde(default)]
    pub debugger_attached: bool,
    #[serde(default)]
    pub recent_sideload: bool,
}

/// One screening event. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Caller-assigned id; idempotency key within the review queue
    pub transaction_id: String,

    #[serde(default)]
    pub payer_vpa: String,

    #[serde(default)]
    pub payee_vpa: String,

    /// Non-negative decimal amount
    pub amount: f64,

    /// Free-text memo; empty when absent
    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub transaction_type: TransactionType,

    #[serde(default)]
    pub qr_payload: Option<String>,

    /// 1 when the caller observed this payee for the first time
    #[serde(default)]
    pub payee_new: u8,

    #[serde(default)]
    pub device_posture: Option<DevicePosture>,

    /// Caller clock at initiation; drives the off-hours collect feature.
    /// Absent keeps that feature neutral so scoring is a pure function of
    /// the request.
    #[serde(default)]
    pub initiated_at: Option<DateTime<Utc>>,
}

impl TransactionRequest {
    pub fn is_new_payee(&self) -> bool {
        self.payee_new != 0
    }

    pub fn posture(&self) -> DevicePosture {
        self.device_posture.unwrap_or_default()
    }
}

// ============================================================================
// DETECTOR OUTPUT
// ============================================================================

/// Identifies one of the four detectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorId {
    Phishing,
    Quishing,
    Collect,
    Malware,
}

impl DetectorId {
    pub const ALL: [DetectorId; 4] = [
        DetectorId::Phishing,
        DetectorId::Quishing,
        DetectorId::Collect,
        DetectorId::Malware,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorId::Phishing => "phishing",
            DetectorId::Quishing => "quishing",
            DetectorId::Collect => "collect",
            DetectorId::Malware => "malware",
        }
    }
}

/// Confidence tier derived from model margin and rule corroboration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

/// One detector's verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscore {
    pub detector: DetectorId,
    /// Risk probability in [0, 1]
    pub probability: f64,
    /// Tokens naming which rules fired
    pub rule_hits: Vec<String>,
    pub confidence: ConfidenceTier,
    /// Whether any fired rule is hard
    pub hard_hit: bool,
}

impl Subscore {
    /// Neutral substitute used when a detector times out or cannot run
    pub fn neutral(detector: DetectorId, reason: &str) -> Self {
        Self {
            detector,
            probability: 0.5,
            rule_hits: vec![reason.to_string()],
            confidence: ConfidenceTier::Low,
            hard_hit: false,
        }
    }
}

// ============================================================================
// DECISION
// ============================================================================

/// Terminal action returned to the payment client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Allow,
    Warn,
    Block,
    HumanReview,
}

/// The aggregator's result for one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// 0..=100, higher = safer
    pub trust_score: u8,
    pub action: Action,
    /// Fused risk in [0, 1]
    pub risk: f64,
    /// True when the action came from the hard-rule override; such blocks
    /// rest on deterministic evidence and skip the adjudication triggers
    pub hard_override: bool,
    pub subscores: Vec<Subscore>,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    pub fn subscore(&self, id: DetectorId) -> Option<&Subscore> {
        self.subscores.iter().find(|s| s.detector == id)
    }

    pub fn max_probability(&self) -> f64 {
        self.subscores.iter().map(|s| s.probability).fold(0.0, f64::max)
    }

    pub fn min_probability(&self) -> f64 {
        self.subscores.iter().map(|s| s.probability).fold(1.0, f64::min)
    }
}

// ============================================================================
// REVIEW
// ============================================================================

/// Review priority, ordered most urgent first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "CRITICAL",
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CRITICAL" => Some(Priority::Critical),
            "HIGH" => Some(Priority::High),
            "MEDIUM" => Some(Priority::Medium),
            "LOW" => Some(Priority::Low),
            _ => None,
        }
    }
}

/// Analyst verdict on a queued review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalystDecision {
    Approve,
    Reject,
    Escalate,
}

impl AnalystDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalystDecision::Approve => "APPROVE",
            AnalystDecision::Reject => "REJECT",
            AnalystDecision::Escalate => "ESCALATE",
        }
    }

    /// Label the transaction for retraining: anything an analyst refused to
    /// release counts as fraud
    pub fn correct_label(&self) -> i16 {
        match self {
            AnalystDecision::Approve => 0,
            AnalystDecision::Reject | AnalystDecision::Escalate => 1,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
