//! Malware/device-compromise features (device posture)

use crate::engine::types::TransactionRequest;

pub const FEATURE_COUNT: usize = 7;

#[derive(Debug, Clone, Copy, Default)]
pub struct MalwareFeatures {
    pub suspicious_app: f32,
    pub accessibility_service: f32,
    pub screen_overlay: f32,
    pub debugger_attached: f32,
    pub recent_sideload: f32,
    pub app_count_bucket: f32,
    pub posture_present: f32,
}

impl MalwareFeatures {
    pub fn to_vec(&self) -> [f32; FEATURE_COUNT] {
        [
            self.suspicious_app,
            self.accessibility_service,
            self.screen_overlay,
            self.debugger_attached,
            self.recent_sideload,
            self.app_count_bucket,
            self.posture_present,
        ]
    }
}

pub const FEATURE_WEIGHTS: &[(&str, f64)] = &[
    ("debugger_attached", 0.35),
    ("suspicious_app", 0.25),
    ("screen_overlay", 0.20),
    ("accessibility_service", 0.15),
    ("recent_sideload", 0.12),
    ("app_count_bucket", 0.05),
];

pub fn extract(req: &TransactionRequest) -> MalwareFeatures {
    let posture = req.posture();

    MalwareFeatures {
        suspicious_app: if posture.suspicious_app_flag { 1.0 } else { 0.0 },
        accessibility_service: if posture.accessibility_service_active { 1.0 } else { 0.0 },
        screen_overlay: if posture.screen_overlay_active { 1.0 } else { 0.0 },
        debugger_attached: if posture.debugger_attached { 1.0 } else { 0.0 },
        recent_sideload: if posture.recent_sideload { 1.0 } else { 0.0 },
        app_count_bucket: (posture.installed_app_count as f32 / 200.0).min(1.0),
        posture_present: if req.device_posture.is_some() { 1.0 } else { 0.0 },
    }
}
