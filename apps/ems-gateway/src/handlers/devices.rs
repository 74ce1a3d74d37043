//! 设备查询 handlers
//!
//! - GET /health - 进程存活与设备在线概况
//! - GET /api/devices - 列出设备（注册顺序）
//! - GET /api/devices/{id} - 获取设备详情与最近读数

use crate::app::AppState;
use crate::utils::response::{device_to_dto, not_found_error};
use api_contract::{ApiResponse, DeviceDto, HealthDto};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::DeviceStatus;

#[derive(serde::Deserialize)]
pub struct DevicePath {
    device_id: String,
}

pub async fn health(State(state): State<AppState>) -> Response {
    let devices = state.gateway.devices();
    let online_devices = devices
        .iter()
        .filter(|device| device.status == DeviceStatus::Online)
        .count();
    let dto = HealthDto {
        ok: true,
        devices: devices.len(),
        online_devices,
    };
    (StatusCode::OK, Json(ApiResponse::success(dto))).into_response()
}

pub async fn list_devices(State(state): State<AppState>) -> Response {
    let data: Vec<DeviceDto> = state
        .gateway
        .devices()
        .into_iter()
        .map(device_to_dto)
        .collect();
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

pub async fn get_device(State(state): State<AppState>, Path(path): Path<DevicePath>) -> Response {
    match state.gateway.device(&path.device_id) {
        Some(device) => (
            StatusCode::OK,
            Json(ApiResponse::success(device_to_dto(device))),
        )
            .into_response(),
        None => not_found_error(),
    }
}
