use crate::RegisterError;
use serde::{Deserialize, Serialize};

const MAX_DECIMALS: u32 = 6;

/// 线性缩放：`round(raw * multiplier + offset, decimals)`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scale {
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub decimals: u32,
}

fn default_multiplier() -> f64 {
    1.0
}

impl Default for Scale {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            offset: 0.0,
            decimals: 0,
        }
    }
}

impl Scale {
    pub fn apply(&self, raw: f64) -> f64 {
        let factor = 10f64.powi(self.decimals as i32);
        ((raw * self.multiplier + self.offset) * factor).round() / factor
    }
}

/// 针对 `(deviceId, key)` 的缩放规则。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingRule {
    pub device_id: String,
    pub key: String,
    #[serde(flatten)]
    pub scale: Scale,
}

impl ScalingRule {
    pub fn validate(&self) -> Result<(), RegisterError> {
        let invalid = |reason: String| {
            Err(RegisterError::InvalidScaling(format!(
                "{}/{}: {}",
                self.device_id, self.key, reason
            )))
        };
        if self.device_id.trim().is_empty() || self.key.trim().is_empty() {
            return invalid("deviceId and key are required".to_string());
        }
        if !self.scale.multiplier.is_finite() || !self.scale.offset.is_finite() {
            return invalid("multiplier and offset must be finite".to_string());
        }
        if self.scale.decimals > MAX_DECIMALS {
            return invalid(format!("decimals must be <= {}", MAX_DECIMALS));
        }
        Ok(())
    }
}

/// 缩放（无规则时四舍五入取整）并钳位到 i16 范围。
pub fn scaled_value(raw: f64, scale: Option<&Scale>) -> f64 {
    let value = match scale {
        Some(scale) => scale.apply(raw),
        None => raw.round(),
    };
    value.clamp(i16::MIN as f64, i16::MAX as f64)
}

/// 寄存器字：缩放值取整后的补码。
pub fn register_word(scaled: f64) -> u16 {
    (scaled.round() as i16) as u16
}
