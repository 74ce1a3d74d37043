//! 寄存器映射表查询
//!
//! - GET /api/registers

use crate::app::AppState;
use crate::utils::response::register_entry_to_dto;
use api_contract::{ApiResponse, RegisterTableDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub async fn get_registers(State(state): State<AppState>) -> Response {
    let table = state.gateway.register_table();
    let server = state.gateway.register_server_config().await;
    let server_addr = state
        .gateway
        .register_server_addr()
        .await
        .map(|addr| addr.to_string());
    let dto = RegisterTableDto {
        server_enabled: server_addr.is_some(),
        server_addr,
        unit_id: server.unit_id,
        entries: table.entries().iter().map(register_entry_to_dto).collect(),
    };
    (StatusCode::OK, Json(ApiResponse::success(dto))).into_response()
}
