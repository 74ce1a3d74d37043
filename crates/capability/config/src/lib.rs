//! 网关运行配置加载。

use std::env;
use std::path::PathBuf;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 网关运行配置。
///
/// 所有变量均可选；设备、告警规则、缩放规则与记录器来自外部配置快照。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub http_addr: String,
    pub settle_delay_ms: u64,
    pub poll_timeout_ms: u64,
    pub consumer_queue_size: usize,
    pub alarm_recent_capacity: usize,
    pub alarm_window_size: usize,
    pub register_holding_base: u16,
    pub register_input_base: u16,
    pub register_rebuild_interval_ms: u64,
    pub register_server_enabled: bool,
    pub register_bind_addr: String,
    pub register_port: u16,
    pub register_unit_id: u8,
    pub history_dir: PathBuf,
    pub history_flush_records: usize,
    pub history_flush_interval_ms: u64,
    pub history_max_file_bytes: u64,
    pub history_retention_days: u64,
    pub snapshot_path: Option<PathBuf>,
}

impl GatewayConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr = env::var("GW_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let settle_delay_ms = read_u64_with_default("GW_SETTLE_DELAY_MS", 2000)?;
        let poll_timeout_ms = read_u64_with_default("GW_POLL_TIMEOUT_MS", 10_000)?;
        if poll_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "GW_POLL_TIMEOUT_MS".to_string(),
                "0".to_string(),
            ));
        }
        let consumer_queue_size = read_positive_usize("GW_CONSUMER_QUEUE_SIZE", 1024)?;
        let alarm_recent_capacity = read_positive_usize("GW_ALARM_RECENT_CAPACITY", 50)?;
        let alarm_window_size = read_positive_usize("GW_ALARM_WINDOW_SIZE", 10)?;
        let register_holding_base = read_u16_with_default("GW_REGISTER_HOLDING_BASE", 0)?;
        let register_input_base = read_u16_with_default("GW_REGISTER_INPUT_BASE", 0)?;
        let register_rebuild_interval_ms =
            read_u64_with_default("GW_REGISTER_REBUILD_INTERVAL_MS", 5000)?;
        let register_server_enabled = read_bool_with_default("GW_REGISTER_SERVER", false);
        let register_bind_addr =
            env::var("GW_REGISTER_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());
        let register_port = read_u16_with_default("GW_REGISTER_PORT", 5020)?;
        let register_unit_id = read_u8_with_default("GW_REGISTER_UNIT_ID", 1)?;
        let history_dir = read_optional("GW_HISTORY_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/history"));
        let history_flush_records = read_positive_usize("GW_HISTORY_FLUSH_RECORDS", 100)?;
        let history_flush_interval_ms =
            read_u64_with_default("GW_HISTORY_FLUSH_INTERVAL_MS", 60_000)?;
        let history_max_file_bytes =
            read_u64_with_default("GW_HISTORY_MAX_FILE_BYTES", 10 * 1024 * 1024)?;
        let history_retention_days = read_u64_with_default("GW_HISTORY_RETENTION_DAYS", 30)?;
        let snapshot_path = read_optional("GW_SNAPSHOT_PATH").map(PathBuf::from);

        Ok(Self {
            http_addr,
            settle_delay_ms,
            poll_timeout_ms,
            consumer_queue_size,
            alarm_recent_capacity,
            alarm_window_size,
            register_holding_base,
            register_input_base,
            register_rebuild_interval_ms,
            register_server_enabled,
            register_bind_addr,
            register_port,
            register_unit_id,
            history_dir,
            history_flush_records,
            history_flush_interval_ms,
            history_max_file_bytes,
            history_retention_days,
            snapshot_path,
        })
    }
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_positive_usize(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
