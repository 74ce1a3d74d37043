//! 历史记录查询与导出
//!
//! - GET /api/history/{logger_id}?start&end&limit
//! - GET /api/history/{logger_id}/export?start&end&limit&format=json|csv
//!
//! 时间为毫秒时间戳（闭区间），缺省为全部范围；`limit` 缺省 1000，上限 10000。

use crate::app::AppState;
use crate::utils::response::{bad_request_error, gateway_error, history_record_to_dto};
use api_contract::{ApiResponse, HistoryQuery, HistoryRecordDto};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use ems_history::ExportFormat;

const DEFAULT_LIMIT: usize = 1000;
const MAX_LIMIT: usize = 10_000;

#[derive(serde::Deserialize)]
pub struct LoggerPath {
    logger_id: String,
}

struct Window {
    start: i64,
    end: i64,
    limit: usize,
}

fn window(query: &HistoryQuery) -> Result<Window, Response> {
    let start = query.start.unwrap_or(0);
    let end = query.end.unwrap_or(i64::MAX);
    if start > end {
        return Err(bad_request_error("start must not be after end"));
    }
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 {
        return Err(bad_request_error("limit must be positive"));
    }
    Ok(Window {
        start,
        end,
        limit: limit.min(MAX_LIMIT),
    })
}

pub async fn query_history(
    State(state): State<AppState>,
    Path(path): Path<LoggerPath>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let window = match window(&query) {
        Ok(window) => window,
        Err(response) => return response,
    };
    match state
        .gateway
        .history_query(&path.logger_id, window.start, window.end, window.limit)
        .await
    {
        Ok(records) => {
            let data: Vec<HistoryRecordDto> =
                records.into_iter().map(history_record_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => gateway_error(err),
    }
}

pub async fn export_history(
    State(state): State<AppState>,
    Path(path): Path<LoggerPath>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let window = match window(&query) {
        Ok(window) => window,
        Err(response) => return response,
    };
    let format = match query.format.as_deref().map(str::parse::<ExportFormat>) {
        None => ExportFormat::Json,
        Some(Ok(format)) => format,
        Some(Err(err)) => return bad_request_error(err.to_string()),
    };
    let body = match state
        .gateway
        .history_export(
            &path.logger_id,
            window.start,
            window.end,
            window.limit,
            format,
        )
        .await
    {
        Ok(body) => body,
        Err(err) => return gateway_error(err),
    };
    let (content_type, extension) = match format {
        ExportFormat::Json => ("application/json", "json"),
        ExportFormat::Csv => ("text/csv; charset=utf-8", "csv"),
    };
    let disposition = format!(
        "attachment; filename=\"{}.{}\"",
        path.logger_id, extension
    );
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}
