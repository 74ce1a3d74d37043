use serde::{Deserialize, Serialize};
use std::fmt;

/// 告警级别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    #[default]
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        f.write_str(text)
    }
}

/// 已触发的告警事件（不可变）。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmEvent {
    pub id: String,
    pub rule_id: String,
    pub device_id: String,
    pub device_name: String,
    pub severity: Severity,
    pub message: String,
    pub observed_value: Option<f64>,
    pub condition_text: String,
    pub triggered_at: i64,
}
