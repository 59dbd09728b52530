//! Human-in-the-loop manager
//!
//! Decides whether the automated decision is suspended and routed to an
//! analyst, and with what priority and SLA. The coordinator performs the
//! actual action rewrite and enqueue.

use serde::{Deserialize, Serialize};

use crate::config::RuntimeConfig;
use crate::engine::types::{Action, Decision, Priority};

/// A single detector at or above this probability is decisive enough that a
/// blocked transaction needs no adjudication
const DECISIVE_GATE: f64 = 0.9;

/// Detector spread at or above this is a sharp disagreement
const DISAGREEMENT_GATE: f64 = 0.6;

const SLA_CRITICAL_SECS: i64 = 60;
const SLA_HIGH_SECS: i64 = 5 * 60;
const SLA_MEDIUM_SECS: i64 = 30 * 60;
const SLA_LOW_SECS: i64 = 4 * 60 * 60;

/// How a required review should be queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPlan {
    pub priority: Priority,
    pub sla_seconds: i64,
}

/// Evaluate the HITL triggers against the (pre-rewrite) decision.
///
/// Returns `None` when no human is needed. Hard-rule blocks rest on
/// deterministic evidence, so the indecisive-block and disagreement triggers
/// do not apply to them; the WARN and large-amount triggers always do.
pub fn evaluate(decision: &Decision, amount: f64, cfg: &RuntimeConfig) -> Option<ReviewPlan> {
    if !cfg.hitl_enabled {
        return None;
    }

    let max_p = decision.max_probability();
    let min_p = decision.min_probability();

    let required = decision.action == Action::Warn
        || (!decision.hard_override && decision.action == Action::Block && max_p < DECISIVE_GATE)
        || (!decision.hard_override && max_p - min_p >= DISAGREEMENT_GATE)
        || (amount >= cfg.large_amount_threshold && decision.action != Action::Allow);

    if !required {
        return None;
    }

    Some(plan(decision, amount, cfg))
}

/// Priority / SLA ladder, first match wins
fn plan(decision: &Decision, amount: f64, cfg: &RuntimeConfig) -> ReviewPlan {
    if decision.action == Action::Block && amount >= cfg.large_amount_threshold {
        ReviewPlan { priority: Priority::Critical, sla_seconds: SLA_CRITICAL_SECS }
    } else if decision.action == Action::Block {
        ReviewPlan { priority: Priority::High, sla_seconds: SLA_HIGH_SECS }
    } else if decision.trust_score < 35 {
        ReviewPlan { priority: Priority::High, sla_seconds: SLA_HIGH_SECS }
    } else if decision.trust_score < 50 {
        ReviewPlan { priority: Priority::Medium, sla_seconds: SLA_MEDIUM_SECS }
    } else {
        ReviewPlan { priority: Priority::Low, sla_seconds: SLA_LOW_SECS }
    }
}

// ============================================================================
// TESTS
// ============================================================================
