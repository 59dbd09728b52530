//! Malware / device-compromise detector
//!
//! Consumes the posture flags supplied by the payment client; the service
//! never inspects the device itself.

use crate::config::RuntimeConfig;
use crate::engine::features::malware;
use crate::engine::model;
use crate::engine::types::{DetectorId, DevicePosture, Subscore, TransactionRequest};

use super::{subscore, Detector, Rule};

const DEBUGGER_ATTACHED: Rule = Rule { name: "debugger_attached", weight: 0.60, hard: true };
const SIDELOAD_ACCESSIBILITY_COMBO: Rule =
    Rule { name: "sideload_accessibility_combo", weight: 0.55, hard: true };
const SUSPICIOUS_APP: Rule = Rule { name: "suspicious_app", weight: 0.35, hard: false };
const SCREEN_OVERLAY: Rule = Rule { name: "screen_overlay", weight: 0.30, hard: false };
const ACCESSIBILITY_SERVICE: Rule = Rule { name: "accessibility_service", weight: 0.25, hard: false };
const RECENT_SIDELOAD: Rule = Rule { name: "recent_sideload", weight: 0.20, hard: false };
const APP_FLOOD: Rule = Rule { name: "app_flood", weight: 0.10, hard: false };

static RULES: &[Rule] = &[
    DEBUGGER_ATTACHED,
    SIDELOAD_ACCESSIBILITY_COMBO,
    SUSPICIOUS_APP,
    SCREEN_OVERLAY,
    ACCESSIBILITY_SERVICE,
    RECENT_SIDELOAD,
    APP_FLOOD,
];

const APP_FLOOD_GATE: u32 = 200;

pub struct MalwareDetector;

impl Detector for MalwareDetector {
    fn id(&self) -> DetectorId {
        DetectorId::Malware
    }

    fn rules(&self) -> &'static [Rule] {
        RULES
    }

    fn feature_weights(&self) -> &'static [(&'static str, f64)] {
        malware::FEATURE_WEIGHTS
    }

    fn score(&self, req: &TransactionRequest, _cfg: &RuntimeConfig) -> Subscore {
        let feats = malware::extract(req);
        let hits = rule_hits(&req.posture());

        let p_model = model::scorer(self.id())
            .and_then(|m| m.predict_proba(&feats.to_vec()).ok());

        subscore(self.id(), p_model, hits)
    }
}

fn rule_hits(posture: &DevicePosture) -> Vec<&'static Rule> {
    let mut hits = Vec::new();

    if posture.debugger_attached {
        hits.push(&DEBUGGER_ATTACHED);
    }
    if posture.recent_sideload && posture.accessibility_service_active {
        hits.push(&SIDELOAD_ACCESSIBILITY_COMBO);
    }
    if posture.suspicious_app_flag {
        hits.push(&SUSPICIOUS_APP);
    }
    if posture.screen_overlay_active {
        hits.push(&SCREEN_OVERLAY);
    }
    if posture.accessibility_service_active {
        hits.push(&ACCESSIBILITY_SERVICE);
    }
    if posture.recent_sideload {
        hits.push(&RECENT_SIDELOAD);
    }
    if posture.installed_app_count > APP_FLOOD_GATE {
        hits.push(&APP_FLOOD);
    }

    hits
}
