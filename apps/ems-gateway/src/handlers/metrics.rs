//! 运行指标快照
//!
//! - GET /api/metrics

use api_contract::{ApiResponse, MetricsSnapshotDto};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ems_telemetry::metrics;

pub async fn get_metrics() -> Response {
    let snapshot = metrics().snapshot();
    (
        StatusCode::OK,
        Json(ApiResponse::success(MetricsSnapshotDto {
            polls_ok: snapshot.polls_ok,
            polls_failed: snapshot.polls_failed,
            polls_timed_out: snapshot.polls_timed_out,
            alarms_fired: snapshot.alarms_fired,
            alarms_suppressed: snapshot.alarms_suppressed,
            notify_failures: snapshot.notify_failures,
            register_rebuilds: snapshot.register_rebuilds,
            history_records: snapshot.history_records,
            history_flushes: snapshot.history_flushes,
            history_flush_failures: snapshot.history_flush_failures,
            history_dropped: snapshot.history_dropped,
            fanout_dropped: snapshot.fanout_dropped,
        })),
    )
        .into_response()
}
