//! HTTP 响应辅助函数和 DTO 转换
//!
//! 所有错误返回统一的 ApiResponse 格式，HTTP 状态码与错误码一一对应。

use api_contract::{AlarmDto, ApiResponse, DeviceDto, HistoryRecordDto, RegisterEntryDto};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{AlarmEvent, Device};
use ems_history::{HistoryError, HistoryRecord};
use ems_pipeline::GatewayError;
use ems_register::RegisterEntry;

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error("INVALID.REQUEST", message.into())),
    )
        .into_response()
}

/// 资源未找到错误响应
pub fn not_found_error() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error("RESOURCE.NOT_FOUND", "not found")),
    )
        .into_response()
}

/// 网关错误响应
pub fn gateway_error(err: GatewayError) -> Response {
    match err {
        GatewayError::History(HistoryError::NotFound(_)) => not_found_error(),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::error("INTERNAL.ERROR", other.to_string())),
        )
            .into_response(),
    }
}

/// Device 转 DeviceDto
pub fn device_to_dto(device: Device) -> DeviceDto {
    let values = device
        .last_reading
        .as_ref()
        .and_then(|reading| serde_json::to_value(&reading.values).ok());
    DeviceDto {
        device_id: device.config.id.clone(),
        name: device.config.name.clone(),
        protocol: device.config.protocol().to_string(),
        host: device.config.connection.host().to_string(),
        poll_interval_ms: device.config.poll_interval_ms,
        status: device.status.to_string(),
        last_reading_at: device.last_reading_at,
        last_error: device.last_error,
        last_failure: device.last_failure.map(|kind| kind.as_str().to_string()),
        values,
    }
}

/// RegisterEntry 转 RegisterEntryDto
pub fn register_entry_to_dto(entry: &RegisterEntry) -> RegisterEntryDto {
    RegisterEntryDto {
        source_device_id: entry.source_device_id.clone(),
        source_key: entry.source_key.clone(),
        holding_address: entry.holding_address,
        input_address: entry.input_address,
        raw_value: entry.raw_value,
        scaled_value: entry.scaled_value,
        register_value: entry.register_value,
    }
}

/// AlarmEvent 转 AlarmDto
pub fn alarm_to_dto(event: AlarmEvent) -> AlarmDto {
    AlarmDto {
        id: event.id,
        rule_id: event.rule_id,
        device_id: event.device_id,
        device_name: event.device_name,
        severity: event.severity.to_string(),
        message: event.message,
        observed_value: event.observed_value,
        condition_text: event.condition_text,
        triggered_at: event.triggered_at,
    }
}

/// HistoryRecord 转 HistoryRecordDto
pub fn history_record_to_dto(record: HistoryRecord) -> HistoryRecordDto {
    HistoryRecordDto {
        timestamp: record.timestamp,
        device_id: record.device_id,
        device_name: record.device_name,
        data: serde_json::to_value(&record.data).unwrap_or_default(),
    }
}
