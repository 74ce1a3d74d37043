use crate::{HistoryError, HistoryRecord};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// 单个记录器的追加写文件集合。
pub struct LogStore {
    dir: PathBuf,
    logger_id: String,
    max_file_bytes: u64,
    active: Option<PathBuf>,
    // 活动文件中已确认写完整的字节数
    committed: u64,
}

impl LogStore {
    pub fn new(root: &Path, logger_id: &str, max_file_bytes: u64) -> Self {
        Self {
            dir: root.join(logger_id),
            logger_id: logger_id.to_string(),
            max_file_bytes,
            active: None,
            committed: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn active_file(&self) -> Option<&Path> {
        self.active.as_deref()
    }

    /// 追加一批记录；写入后超过大小上限则轮转。
    pub async fn append(&mut self, records: &[HistoryRecord]) -> Result<(), HistoryError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut payload = Vec::with_capacity(records.len() * 128);
        for record in records {
            serde_json::to_writer(&mut payload, record)?;
            payload.push(b'\n');
        }

        let (path, committed) = match self.active.clone() {
            Some(path) => (path, self.committed),
            None => self.open_target().await?,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let on_disk = file.metadata().await?.len();
        if on_disk > committed {
            // 上次失败的批次留下了半截内容
            file.set_len(committed).await?;
            warn!(
                target: "ems.history",
                logger_id = %self.logger_id,
                file = %path.display(),
                discarded = on_disk - committed,
                "history_partial_write_truncated"
            );
        }
        self.active = Some(path.clone());
        self.committed = committed;

        if let Err(err) = write_batch(&mut file, &payload).await {
            if let Err(truncate_err) = file.set_len(committed).await {
                warn!(
                    target: "ems.history",
                    logger_id = %self.logger_id,
                    error = %truncate_err,
                    "history_truncate_failed"
                );
            }
            return Err(err.into());
        }
        let size = committed + payload.len() as u64;
        self.committed = size;

        if size > self.max_file_bytes {
            info!(
                target: "ems.history",
                logger_id = %self.logger_id,
                file = %path.display(),
                size,
                "history_file_rotated"
            );
            self.active = None;
            self.committed = 0;
        }
        Ok(())
    }

    /// 沿用未写满的最新文件，否则新建。
    async fn open_target(&self) -> Result<(PathBuf, u64), HistoryError> {
        fs::create_dir_all(&self.dir).await?;
        if let Some(latest) = self.list_files().await?.pop() {
            let len = fs::metadata(&latest).await?.len();
            if len <= self.max_file_bytes {
                return Ok((latest, len));
            }
        }
        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        for seq in 0..1000u32 {
            let name = format!("{}_{}_{:03}.jsonl", self.logger_id, stamp, seq);
            let path = self.dir.join(name);
            if !fs::try_exists(&path).await? {
                debug!(target: "ems.history", file = %path.display(), "history_file_created");
                return Ok((path, 0));
            }
        }
        Err(HistoryError::Io(std::io::Error::other(format!(
            "no free file name for {} at {}",
            self.logger_id, stamp
        ))))
    }

    /// 按名称（即时间）排序的数据文件。
    pub async fn list_files(&self) -> Result<Vec<PathBuf>, HistoryError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let prefix = format!("{}_", self.logger_id);
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(&prefix) && name.ends_with(".jsonl") {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// 顺序扫描文件，跳过损坏行，达到条数上限即停止。
    pub async fn scan(
        &self,
        start: i64,
        end: i64,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let mut records = Vec::new();
        if limit == 0 {
            return Ok(records);
        }
        for path in self.list_files().await? {
            let content = fs::read_to_string(&path).await?;
            let mut corrupt = 0usize;
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let record = match serde_json::from_str::<HistoryRecord>(line) {
                    Ok(record) => record,
                    Err(_) => {
                        corrupt += 1;
                        continue;
                    }
                };
                if record.timestamp < start || record.timestamp > end {
                    continue;
                }
                records.push(record);
                if records.len() >= limit {
                    return Ok(records);
                }
            }
            if corrupt > 0 {
                warn!(
                    target: "ems.history",
                    file = %path.display(),
                    lines = corrupt,
                    "history_corrupt_lines_skipped"
                );
            }
        }
        Ok(records)
    }

    /// 删除修改时间早于 `now - retention` 的文件，返回删除数量。
    pub async fn cleanup(
        &mut self,
        now: SystemTime,
        retention: Duration,
    ) -> Result<usize, HistoryError> {
        let mut removed = 0;
        for path in self.list_files().await? {
            let modified = fs::metadata(&path).await?.modified()?;
            let expired = now
                .duration_since(modified)
                .map(|age| age > retention)
                .unwrap_or(false);
            if !expired {
                continue;
            }
            fs::remove_file(&path).await?;
            if self.active.as_deref() == Some(path.as_path()) {
                self.active = None;
            }
            info!(target: "ems.history", file = %path.display(), "history_file_expired");
            removed += 1;
        }
        Ok(removed)
    }
}

async fn write_batch(file: &mut fs::File, payload: &[u8]) -> std::io::Result<()> {
    file.write_all(payload).await?;
    file.flush().await
}
