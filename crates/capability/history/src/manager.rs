use crate::logger::HistoryLogger;
use crate::{ExportFormat, HistoryConfig, HistoryError, HistoryRecord, LoggerConfig};
use domain::{PollEvent, now_epoch_ms};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// 校验一组记录器配置：逐项合法且 id 不重复。
pub fn validate_loggers(configs: &[LoggerConfig]) -> Result<(), HistoryError> {
    let mut seen = HashSet::new();
    for config in configs {
        config.validate()?;
        if !seen.insert(config.id.as_str()) {
            return Err(HistoryError::InvalidLogger(
                config.id.clone(),
                "duplicate logger id".to_string(),
            ));
        }
    }
    Ok(())
}

/// 全部记录器的集合。
pub struct HistoryManager {
    config: HistoryConfig,
    loggers: RwLock<BTreeMap<String, Arc<HistoryLogger>>>,
}

impl HistoryManager {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            loggers: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// 整体替换记录器：移除的先刷盘，未变化的保留状态，新增或变化的重新创建。
    pub async fn replace_loggers(&self, configs: Vec<LoggerConfig>) -> Result<(), HistoryError> {
        validate_loggers(&configs)?;

        let now_ms = now_epoch_ms();
        let mut loggers = self.loggers.write().await;
        let mut next = BTreeMap::new();
        for config in configs {
            match loggers.remove(&config.id) {
                Some(existing) if existing.config() == &config => {
                    next.insert(config.id.clone(), existing);
                }
                previous => {
                    if let Some(previous) = previous {
                        close(&previous, now_ms).await;
                    }
                    let logger = HistoryLogger::new(config.clone(), self.config.clone(), now_ms);
                    next.insert(config.id, Arc::new(logger));
                }
            }
        }
        for (_, removed) in std::mem::take(&mut *loggers) {
            close(&removed, now_ms).await;
        }
        let count = next.len();
        *loggers = next;
        info!(target: "ems.history", loggers = count, "history_loggers_replaced");
        Ok(())
    }

    pub async fn loggers(&self) -> Vec<LoggerConfig> {
        self.loggers
            .read()
            .await
            .values()
            .map(|logger| logger.config().clone())
            .collect()
    }

    pub async fn logger(&self, id: &str) -> Option<Arc<HistoryLogger>> {
        self.loggers.read().await.get(id).cloned()
    }

    async fn require(&self, id: &str) -> Result<Arc<HistoryLogger>, HistoryError> {
        self.logger(id)
            .await
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))
    }

    async fn snapshot(&self) -> Vec<Arc<HistoryLogger>> {
        self.loggers.read().await.values().cloned().collect()
    }

    pub async fn handle(&self, event: &PollEvent) -> usize {
        self.handle_at(event, now_epoch_ms()).await
    }

    /// 把读数交给匹配的记录器，返回记录条数。失败事件不产生记录。
    pub async fn handle_at(&self, event: &PollEvent, now_ms: i64) -> usize {
        let Some(reading) = event.reading() else {
            return 0;
        };
        let mut recorded = 0;
        for logger in self.snapshot().await {
            if logger.record(reading, &event.device_name, now_ms).await {
                recorded += 1;
            }
        }
        recorded
    }

    pub async fn tick(&self, now_ms: i64) {
        for logger in self.snapshot().await {
            logger.tick(now_ms).await;
        }
    }

    pub async fn flush_all(&self) {
        let now_ms = now_epoch_ms();
        for logger in self.snapshot().await {
            close(&logger, now_ms).await;
        }
    }

    /// 执行保留策略，返回删除的文件数。
    pub async fn cleanup(&self, now: SystemTime) -> usize {
        let mut removed = 0;
        for logger in self.snapshot().await {
            match logger.cleanup(now).await {
                Ok(count) => removed += count,
                Err(err) => warn!(
                    target: "ems.history",
                    logger_id = %logger.config().id,
                    error = %err,
                    "history_cleanup_failed"
                ),
            }
        }
        removed
    }

    pub async fn query(
        &self,
        logger_id: &str,
        start: i64,
        end: i64,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        self.require(logger_id).await?.query(start, end, limit).await
    }

    pub async fn export(
        &self,
        logger_id: &str,
        start: i64,
        end: i64,
        limit: usize,
        format: ExportFormat,
    ) -> Result<String, HistoryError> {
        let logger = self.require(logger_id).await?;
        let records = logger.query(start, end, limit).await?;
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&records)?),
            ExportFormat::Csv => to_csv(&logger.config().fields, &records),
        }
    }
}

async fn close(logger: &HistoryLogger, now_ms: i64) {
    if let Err(err) = logger.flush(now_ms).await {
        warn!(
            target: "ems.history",
            logger_id = %logger.config().id,
            error = %err,
            "history_final_flush_failed"
        );
    }
}

fn to_csv(fields: &[String], records: &[HistoryRecord]) -> Result<String, HistoryError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec![
        "timestamp".to_string(),
        "deviceId".to_string(),
        "deviceName".to_string(),
    ];
    header.extend(fields.iter().cloned());
    writer
        .write_record(&header)
        .map_err(|err| HistoryError::Export(err.to_string()))?;

    for record in records {
        let mut row = vec![
            record.timestamp.to_string(),
            record.device_id.clone(),
            record.device_name.clone(),
        ];
        row.extend(fields.iter().map(|field| {
            record
                .data
                .get(field)
                .map(|value| value.to_string())
                .unwrap_or_default()
        }));
        writer
            .write_record(&row)
            .map_err(|err| HistoryError::Export(err.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| HistoryError::Export(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| HistoryError::Export(err.to_string()))
}
