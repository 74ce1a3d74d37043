//! 告警规则求值（阈值 / 区间 / 变化量 / 状态）与按规则冷却。

mod engine;
mod evaluate;
mod notify;
mod rule;

pub use engine::{AlarmEngine, AlarmEngineConfig};
pub use evaluate::{Decision, HistoryWindow, Trigger, WindowEntry, describe, evaluate};
pub use notify::{LogNotifier, NoopNotifier, Notifier, NotifyError};
pub use rule::{AlarmCondition, AlarmRule, Operator, validate_rules};

/// 告警配置错误。
#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    #[error("invalid alarm rule {0}: {1}")]
    InvalidRule(String, String),
}
