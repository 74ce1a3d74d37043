use crate::AlarmError;
use domain::Severity;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 比较运算符，同时接受符号写法（`>`、`>=` 等）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Gte,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Lte,
    #[serde(alias = "==")]
    Eq,
    #[serde(alias = "!=")]
    Neq,
}

const EQ_EPSILON: f64 = 1e-9;

impl Operator {
    pub fn apply(&self, value: f64, target: f64) -> bool {
        match self {
            Operator::Gt => value > target,
            Operator::Gte => value >= target,
            Operator::Lt => value < target,
            Operator::Lte => value <= target,
            Operator::Eq => (value - target).abs() < EQ_EPSILON,
            Operator::Neq => (value - target).abs() >= EQ_EPSILON,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Eq => "==",
            Operator::Neq => "!=",
        }
    }

    pub(crate) fn phrase(&self) -> &'static str {
        match self {
            Operator::Gt => "above",
            Operator::Gte => "at or above",
            Operator::Lt => "below",
            Operator::Lte => "at or below",
            Operator::Eq => "equal to",
            Operator::Neq => "not equal to",
        }
    }
}

/// 告警条件（按 `type` 区分）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AlarmCondition {
    /// 数值与阈值比较
    Threshold {
        data_key: String,
        operator: Operator,
        value: f64,
    },
    /// 超出 `[min, max]` 触发
    Range { data_key: String, min: f64, max: f64 },
    /// 相邻两次读数差值绝对值 ≥ delta 触发
    Change { data_key: String, delta: f64 },
    /// 设备处于 offline / error 时触发
    Status,
}

impl AlarmCondition {
    pub fn data_key(&self) -> Option<&str> {
        match self {
            AlarmCondition::Threshold { data_key, .. }
            | AlarmCondition::Range { data_key, .. }
            | AlarmCondition::Change { data_key, .. } => Some(data_key),
            AlarmCondition::Status => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            AlarmCondition::Threshold { .. } => "threshold",
            AlarmCondition::Range { .. } => "range",
            AlarmCondition::Change { .. } => "change",
            AlarmCondition::Status => "status",
        }
    }
}

/// 告警规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmRule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub device_id: String,
    #[serde(flatten)]
    pub condition: AlarmCondition,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub notify_on_trigger: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_cooldown_ms() -> u64 {
    60_000
}

fn default_enabled() -> bool {
    true
}

impl AlarmRule {
    pub fn validate(&self) -> Result<(), AlarmError> {
        let invalid = |reason: &str| Err(AlarmError::InvalidRule(self.id.clone(), reason.to_string()));
        if self.id.trim().is_empty() {
            return invalid("id is empty");
        }
        if self.device_id.trim().is_empty() {
            return invalid("deviceId is empty");
        }
        if let Some(key) = self.condition.data_key() {
            if key.trim().is_empty() {
                return invalid("dataKey is empty");
            }
        }
        match &self.condition {
            AlarmCondition::Threshold { value, .. } if !value.is_finite() => {
                invalid("threshold value must be finite")
            }
            AlarmCondition::Range { min, max, .. } if !min.is_finite() || !max.is_finite() => {
                invalid("range bounds must be finite")
            }
            AlarmCondition::Range { min, max, .. } if min > max => invalid("range min > max"),
            AlarmCondition::Change { delta, .. } if !delta.is_finite() || *delta < 0.0 => {
                invalid("change delta must be a finite non-negative number")
            }
            _ => Ok(()),
        }
    }
}

/// 校验整组规则，任一规则非法则整组拒绝。
pub fn validate_rules(rules: &[AlarmRule]) -> Result<(), AlarmError> {
    let mut seen = HashSet::new();
    for rule in rules {
        rule.validate()?;
        if !seen.insert(rule.id.as_str()) {
            return Err(AlarmError::InvalidRule(
                rule.id.clone(),
                "duplicate rule id".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flattened_conditions() {
        let rule: AlarmRule = serde_json::from_str(
            r#"{"id":"r1","deviceId":"dev-1","type":"threshold","dataKey":"temp",
                "operator":">=","value":100,"severity":"critical"}"#,
        )
        .unwrap();
        assert_eq!(rule.cooldown_ms, 60_000);
        assert!(rule.enabled);
        assert_eq!(rule.severity, Severity::Critical);
        assert_eq!(
            rule.condition,
            AlarmCondition::Threshold {
                data_key: "temp".to_string(),
                operator: Operator::Gte,
                value: 100.0,
            }
        );

        let rule: AlarmRule = serde_json::from_str(
            r#"{"id":"r2","deviceId":"dev-1","type":"status","cooldownMs":0}"#,
        )
        .unwrap();
        assert_eq!(rule.condition, AlarmCondition::Status);
        assert_eq!(rule.cooldown_ms, 0);
    }

    #[test]
    fn rejects_bad_rules() {
        let rule: AlarmRule = serde_json::from_str(
            r#"{"id":"r1","deviceId":"dev-1","type":"range","dataKey":"v","min":20,"max":10}"#,
        )
        .unwrap();
        assert!(matches!(rule.validate(), Err(AlarmError::InvalidRule(id, _)) if id == "r1"));

        let ok: AlarmRule = serde_json::from_str(
            r#"{"id":"r1","deviceId":"dev-1","type":"change","dataKey":"v","delta":5}"#,
        )
        .unwrap();
        assert!(validate_rules(&[ok.clone(), ok]).is_err());
    }
}
