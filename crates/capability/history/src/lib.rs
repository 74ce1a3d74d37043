//! # 历史记录
//!
//! 每个记录器（logger）选择一台设备的若干字段，缓冲后追加写入
//! `<dir>/<loggerId>/<loggerId>_<YYYYMMDD>_<HHMMSS>_<seq>.jsonl`（UTC）。
//!
//! - 缓冲达到条数上限或距上次落盘超过间隔时刷盘
//! - 刷盘后文件超过大小上限则轮转到新文件
//! - 按文件修改时间执行保留策略
//! - 落盘失败保留缓冲，连续失败或缓冲过大时丢弃并计数

mod logger;
mod manager;
mod store;

use domain::ReadingValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub use logger::HistoryLogger;
pub use manager::{HistoryManager, validate_loggers};
pub use store::LogStore;

/// 历史模块错误。
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid logger {0}: {1}")]
    InvalidLogger(String, String),
    #[error("logger not found: {0}")]
    NotFound(String),
    #[error("export error: {0}")]
    Export(String),
}

/// 历史模块参数。
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub dir: PathBuf,
    pub flush_records: usize,
    pub flush_interval_ms: u64,
    pub max_file_bytes: u64,
    pub retention: Duration,
    /// 连续刷盘失败达到该次数后丢弃缓冲。
    pub max_failed_flushes: u32,
    /// 缓冲超过该条数后丢弃。
    pub max_buffer_records: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/history"),
            flush_records: 100,
            flush_interval_ms: 60_000,
            max_file_bytes: 10 * 1024 * 1024,
            retention: Duration::from_secs(30 * 24 * 3600),
            max_failed_flushes: 3,
            max_buffer_records: 10_000,
        }
    }
}

/// 记录器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub device_id: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub min_interval_ms: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl LoggerConfig {
    pub fn validate(&self) -> Result<(), HistoryError> {
        let invalid = |reason: &str| {
            Err(HistoryError::InvalidLogger(
                self.id.clone(),
                reason.to_string(),
            ))
        };
        let id = self.id.trim();
        if id.is_empty() {
            return invalid("id is empty");
        }
        // id 直接用作目录与文件名
        if id.contains(['/', '\\']) || id == "." || id == ".." {
            return invalid("id must be a plain file name");
        }
        if self.device_id.trim().is_empty() {
            return invalid("deviceId is empty");
        }
        if self.fields.is_empty() {
            return invalid("fields are empty");
        }
        Ok(())
    }
}

/// 一条历史记录（JSON Lines 的一行）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub timestamp: i64,
    pub device_id: String,
    pub device_name: String,
    pub data: BTreeMap<String, ReadingValue>,
}

/// 导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = HistoryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(HistoryError::Export(format!("unknown format: {}", other))),
        }
    }
}
