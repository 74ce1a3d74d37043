//! 稳定的 DTO 与 API 响应契约。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 健康检查返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthDto {
    pub ok: bool,
    pub devices: usize,
    pub online_devices: usize,
}

/// 设备返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDto {
    pub device_id: String,
    pub name: String,
    pub protocol: String,
    pub host: String,
    pub poll_interval_ms: u64,
    pub status: String,
    pub last_reading_at: Option<i64>,
    pub last_error: Option<String>,
    pub last_failure: Option<String>,
    /// 最近一次读数（键 → 值），尚未读到时为 null。
    pub values: Option<Value>,
}

/// 寄存器映射条目返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterEntryDto {
    pub source_device_id: String,
    pub source_key: String,
    pub holding_address: u16,
    pub input_address: u16,
    pub raw_value: f64,
    pub scaled_value: f64,
    pub register_value: u16,
}

/// 寄存器映射表与转发服务状态。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTableDto {
    pub server_enabled: bool,
    pub server_addr: Option<String>,
    pub unit_id: u8,
    pub entries: Vec<RegisterEntryDto>,
}

/// 告警事件返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmDto {
    pub id: String,
    pub rule_id: String,
    pub device_id: String,
    pub device_name: String,
    pub severity: String,
    pub message: String,
    pub observed_value: Option<f64>,
    pub condition_text: String,
    pub triggered_at: i64,
}

/// 历史查询参数（毫秒时间戳，闭区间）。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub limit: Option<usize>,
    pub format: Option<String>,
}

/// 历史记录返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecordDto {
    pub timestamp: i64,
    pub device_id: String,
    pub device_name: String,
    pub data: Value,
}

/// 计数指标快照。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub polls_ok: u64,
    pub polls_failed: u64,
    pub polls_timed_out: u64,
    pub alarms_fired: u64,
    pub alarms_suppressed: u64,
    pub notify_failures: u64,
    pub register_rebuilds: u64,
    pub history_records: u64,
    pub history_flushes: u64,
    pub history_flush_failures: u64,
    pub history_dropped: u64,
    pub fanout_dropped: u64,
}
