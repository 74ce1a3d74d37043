//! 最近告警查询（最新在前）
//!
//! - GET /api/alarms

use crate::app::AppState;
use crate::utils::response::alarm_to_dto;
use api_contract::{AlarmDto, ApiResponse};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub async fn list_alarms(State(state): State<AppState>) -> Response {
    let data: Vec<AlarmDto> = state
        .gateway
        .recent_alarms()
        .into_iter()
        .map(alarm_to_dto)
        .collect();
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}
