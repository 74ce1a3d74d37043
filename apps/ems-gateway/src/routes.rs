//! 路由定义
//!
//! 只读查询接口，挂载在 `/api` 之下：
//! - 设备：/devices, /devices/{id}
//! - 寄存器映射表：/registers
//! - 最近告警：/alarms
//! - 历史记录：/history/{logger_id}, /history/{logger_id}/export
//! - 运行指标：/metrics

use crate::app::AppState;
use crate::handlers::*;
use axum::{Router, routing::get};

pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/devices", get(list_devices))
        .route("/devices/:device_id", get(get_device))
        .route("/registers", get(get_registers))
        .route("/alarms", get(list_alarms))
        .route("/history/:logger_id", get(query_history))
        .route("/history/:logger_id/export", get(export_history))
        .route("/metrics", get(get_metrics))
}
