//! 轮询事件与面向 UI 的广播事件。

use crate::alarm::AlarmEvent;
use crate::data::Reading;
use crate::device::{DeviceStatus, FailureKind};
use serde::Serialize;
use std::sync::Arc;

/// 一次轮询的结果。
#[derive(Debug, Clone)]
pub enum PollOutcome {
    Reading(Arc<Reading>),
    /// 只携带状态的失败事件，供 status 类告警等响应状态变化。
    Failure { kind: FailureKind, message: String },
}

/// 轮询器分发给各消费者的事件（同一设备内按完成顺序投递）。
#[derive(Debug, Clone)]
pub struct PollEvent {
    pub device_id: String,
    pub device_name: String,
    pub status: DeviceStatus,
    pub ts_ms: i64,
    pub outcome: PollOutcome,
}

impl PollEvent {
    pub fn reading(&self) -> Option<&Arc<Reading>> {
        match &self.outcome {
            PollOutcome::Reading(reading) => Some(reading),
            PollOutcome::Failure { .. } => None,
        }
    }
}

/// 面向 UI 的状态变化事件（尽力投递）。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    #[serde(rename_all = "camelCase")]
    DeviceStatusChanged {
        device_id: String,
        previous: DeviceStatus,
        current: DeviceStatus,
        error: Option<String>,
        ts_ms: i64,
    },
    AlarmTriggered(AlarmEvent),
    #[serde(rename_all = "camelCase")]
    RegisterTableChanged { entries: usize, ts_ms: i64 },
}

/// 结构化事件出口，由各组件通过注入持有。
pub trait EventSink: Send + Sync {
    fn publish(&self, event: GatewayEvent);
}

/// 丢弃所有事件（用于接线与测试）。
#[derive(Debug, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn publish(&self, _event: GatewayEvent) {}
}
