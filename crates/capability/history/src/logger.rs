use crate::store::LogStore;
use crate::{HistoryConfig, HistoryError, HistoryRecord, LoggerConfig};
use domain::Reading;
use std::collections::BTreeMap;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::warn;

struct LoggerState {
    buffer: Vec<HistoryRecord>,
    last_log_ms: Option<i64>,
    last_flush_ms: i64,
    failed_flushes: u32,
    store: LogStore,
}

/// 单个记录器：字段筛选、最小间隔、缓冲与刷盘。
pub struct HistoryLogger {
    config: LoggerConfig,
    settings: HistoryConfig,
    state: Mutex<LoggerState>,
}

impl HistoryLogger {
    pub fn new(config: LoggerConfig, settings: HistoryConfig, now_ms: i64) -> Self {
        let store = LogStore::new(&settings.dir, &config.id, settings.max_file_bytes);
        Self {
            config,
            settings,
            state: Mutex::new(LoggerState {
                buffer: Vec::new(),
                last_log_ms: None,
                last_flush_ms: now_ms,
                failed_flushes: 0,
                store,
            }),
        }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// 记录一次读数；返回是否进入缓冲。
    pub async fn record(&self, reading: &Reading, device_name: &str, now_ms: i64) -> bool {
        if !self.config.enabled || reading.device_id != self.config.device_id {
            return false;
        }
        let data: BTreeMap<_, _> = self
            .config
            .fields
            .iter()
            .filter_map(|field| {
                reading
                    .get(field)
                    .map(|value| (field.clone(), value.clone()))
            })
            .collect();
        if data.is_empty() {
            return false;
        }

        let mut state = self.state.lock().await;
        if let Some(last) = state.last_log_ms {
            if reading.ts_ms.saturating_sub(last) < self.config.min_interval_ms as i64 {
                return false;
            }
        }
        state.buffer.push(HistoryRecord {
            timestamp: reading.ts_ms,
            device_id: reading.device_id.clone(),
            device_name: device_name.to_string(),
            data,
        });
        state.last_log_ms = Some(reading.ts_ms);
        ems_telemetry::record_history_record();

        if self.flush_due(&state, now_ms) {
            let _ = self.flush_locked(&mut state, now_ms).await;
        }
        true
    }

    fn flush_due(&self, state: &LoggerState, now_ms: i64) -> bool {
        !state.buffer.is_empty()
            && (state.buffer.len() >= self.settings.flush_records
                || now_ms.saturating_sub(state.last_flush_ms)
                    >= self.settings.flush_interval_ms as i64)
    }

    /// 周期检查：距上次刷盘超过间隔时刷盘。
    pub async fn tick(&self, now_ms: i64) {
        let mut state = self.state.lock().await;
        if self.flush_due(&state, now_ms) {
            let _ = self.flush_locked(&mut state, now_ms).await;
        }
    }

    /// 立即刷盘，返回写入条数。
    pub async fn flush(&self, now_ms: i64) -> Result<usize, HistoryError> {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state, now_ms).await
    }

    async fn flush_locked(
        &self,
        state: &mut LoggerState,
        now_ms: i64,
    ) -> Result<usize, HistoryError> {
        state.last_flush_ms = now_ms;
        if state.buffer.is_empty() {
            return Ok(0);
        }
        match state.store.append(&state.buffer).await {
            Ok(()) => {
                let written = state.buffer.len();
                state.buffer.clear();
                state.failed_flushes = 0;
                ems_telemetry::record_history_flush();
                Ok(written)
            }
            Err(err) => {
                state.failed_flushes += 1;
                ems_telemetry::record_history_flush_failure();
                warn!(
                    target: "ems.history",
                    logger_id = %self.config.id,
                    attempts = state.failed_flushes,
                    buffered = state.buffer.len(),
                    error = %err,
                    "history_flush_failed"
                );
                if state.failed_flushes >= self.settings.max_failed_flushes
                    || state.buffer.len() > self.settings.max_buffer_records
                {
                    let dropped = state.buffer.len();
                    state.buffer.clear();
                    state.failed_flushes = 0;
                    ems_telemetry::record_history_dropped(dropped as u64);
                    warn!(
                        target: "ems.history",
                        logger_id = %self.config.id,
                        dropped,
                        "history_buffer_dropped"
                    );
                }
                Err(err)
            }
        }
    }

    /// 查询落盘数据与缓冲中的记录，按时间升序。
    pub async fn query(
        &self,
        start: i64,
        end: i64,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let state = self.state.lock().await;
        let mut records = state.store.scan(start, end, limit).await?;
        records.extend(
            state
                .buffer
                .iter()
                .filter(|r| r.timestamp >= start && r.timestamp <= end)
                .cloned(),
        );
        records.sort_by_key(|record| record.timestamp);
        records.truncate(limit);
        Ok(records)
    }

    pub async fn cleanup(&self, now: SystemTime) -> Result<usize, HistoryError> {
        let mut state = self.state.lock().await;
        state.store.cleanup(now, self.settings.retention).await
    }

    pub async fn buffered(&self) -> usize {
        self.state.lock().await.buffer.len()
    }

    pub async fn data_files(&self) -> Result<Vec<std::path::PathBuf>, HistoryError> {
        self.state.lock().await.store.list_files().await
    }
}
