//! 纯求值核心：规则 + 历史窗口 + 冷却状态 → 决策。

use crate::rule::{AlarmCondition, AlarmRule};
use domain::{DeviceStatus, Reading};
use std::collections::VecDeque;
use std::sync::Arc;

/// 窗口中的一条观测。
#[derive(Debug, Clone)]
pub struct WindowEntry {
    pub ts_ms: i64,
    pub reading: Option<Arc<Reading>>,
    pub status: DeviceStatus,
}

impl WindowEntry {
    fn numeric(&self, key: &str) -> Option<f64> {
        self.reading.as_ref()?.get(key)?.as_f64()
    }
}

/// 每台设备的有界 FIFO 历史窗口。
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    entries: VecDeque<WindowEntry>,
    capacity: usize,
}

impl HistoryWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: WindowEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn latest(&self) -> Option<&WindowEntry> {
        self.entries.back()
    }

    /// 倒数第二条（最新一条之前的观测）。
    pub fn previous(&self) -> Option<&WindowEntry> {
        self.entries.len().checked_sub(2).and_then(|i| self.entries.get(i))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 满足条件时的观测值。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trigger {
    pub observed: Option<f64>,
    pub previous: Option<f64>,
}

/// 求值结果。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// 条件不满足或规则未启用
    Idle,
    /// 条件满足但处于冷却期，不改变任何状态
    Suppressed,
    Fire(Trigger),
}

/// 对最新一条窗口观测求值。窗口必须已包含当前观测。
pub fn evaluate(
    rule: &AlarmRule,
    window: &HistoryWindow,
    last_trigger_ms: Option<i64>,
    now_ms: i64,
) -> Decision {
    if !rule.enabled {
        return Decision::Idle;
    }
    let Some(trigger) = check_condition(&rule.condition, window) else {
        return Decision::Idle;
    };
    if let Some(last) = last_trigger_ms {
        if now_ms.saturating_sub(last) < i64::try_from(rule.cooldown_ms).unwrap_or(i64::MAX) {
            return Decision::Suppressed;
        }
    }
    Decision::Fire(trigger)
}

fn check_condition(condition: &AlarmCondition, window: &HistoryWindow) -> Option<Trigger> {
    let latest = window.latest()?;
    match condition {
        AlarmCondition::Threshold {
            data_key,
            operator,
            value,
        } => {
            let current = latest.numeric(data_key)?;
            operator.apply(current, *value).then_some(Trigger {
                observed: Some(current),
                previous: None,
            })
        }
        AlarmCondition::Range { data_key, min, max } => {
            let current = latest.numeric(data_key)?;
            (current < *min || current > *max).then_some(Trigger {
                observed: Some(current),
                previous: None,
            })
        }
        AlarmCondition::Change { data_key, delta } => {
            let current = latest.numeric(data_key)?;
            let previous = window.previous()?.numeric(data_key)?;
            ((current - previous).abs() >= *delta).then_some(Trigger {
                observed: Some(current),
                previous: Some(previous),
            })
        }
        AlarmCondition::Status => latest.status.is_faulted().then_some(Trigger {
            observed: None,
            previous: None,
        }),
    }
}

/// 生成告警消息与条件描述。
pub fn describe(
    rule: &AlarmRule,
    device_name: &str,
    status: DeviceStatus,
    trigger: &Trigger,
) -> (String, String) {
    let observed = trigger.observed.map(format_number).unwrap_or_default();
    match &rule.condition {
        AlarmCondition::Threshold {
            data_key,
            operator,
            value,
        } => (
            format!(
                "{}: {} is {}, {} {}",
                device_name,
                data_key,
                observed,
                operator.phrase(),
                format_number(*value)
            ),
            format!("{} {} {}", data_key, operator.symbol(), format_number(*value)),
        ),
        AlarmCondition::Range { data_key, min, max } => (
            format!(
                "{}: {} is {}, outside range [{}, {}]",
                device_name,
                data_key,
                observed,
                format_number(*min),
                format_number(*max)
            ),
            format!(
                "{} outside [{}, {}]",
                data_key,
                format_number(*min),
                format_number(*max)
            ),
        ),
        AlarmCondition::Change { data_key, delta } => (
            format!(
                "{}: {} changed from {} to {}",
                device_name,
                data_key,
                trigger.previous.map(format_number).unwrap_or_default(),
                observed
            ),
            format!("|change of {}| >= {}", data_key, format_number(*delta)),
        ),
        AlarmCondition::Status => (
            format!("{}: device is {}", device_name, status),
            "status in (offline, error)".to_string(),
        ),
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
