use domain::{DeviceStatus, PollEvent, PollOutcome, Reading};
use ems_history::{
    ExportFormat, HistoryConfig, HistoryError, HistoryLogger, HistoryManager, HistoryRecord,
    LogStore, LoggerConfig,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn settings(dir: &std::path::Path) -> HistoryConfig {
    HistoryConfig {
        dir: dir.to_path_buf(),
        flush_records: 1000,
        flush_interval_ms: 3_600_000,
        ..HistoryConfig::default()
    }
}

fn logger_config(id: &str, fields: &[&str]) -> LoggerConfig {
    LoggerConfig {
        id: id.to_string(),
        name: format!("{} logger", id),
        device_id: "boiler-1".to_string(),
        fields: fields.iter().map(|f| f.to_string()).collect(),
        min_interval_ms: 0,
        enabled: true,
    }
}

fn reading(ts_ms: i64, temp: f64) -> Reading {
    Reading::new("boiler-1", ts_ms)
        .with_value("temp", temp)
        .with_value("humidity", 40_i64)
        .with_value("pressure", 1.2)
}

fn poll_event(reading: Reading) -> PollEvent {
    PollEvent {
        device_id: reading.device_id.clone(),
        device_name: "Boiler".to_string(),
        status: DeviceStatus::Online,
        ts_ms: reading.ts_ms,
        outcome: PollOutcome::Reading(Arc::new(reading)),
    }
}

#[tokio::test]
async fn selects_configured_fields_for_matching_device() {
    let dir = tempfile::tempdir().unwrap();
    let logger = HistoryLogger::new(logger_config("temps", &["temp", "humidity"]), settings(dir.path()), 0);

    assert!(logger.record(&reading(1_000, 21.5), "Boiler", 1_000).await);
    let other = Reading::new("chiller-1", 1_000).with_value("temp", 5.0);
    assert!(!logger.record(&other, "Chiller", 1_000).await);
    let unrelated = Reading::new("boiler-1", 2_000).with_value("flow", 3.0);
    assert!(!logger.record(&unrelated, "Boiler", 2_000).await);

    let records = logger.query(0, i64::MAX, 100).await.unwrap();
    assert_eq!(records.len(), 1);
    let keys: Vec<_> = records[0].data.keys().cloned().collect();
    assert_eq!(keys, vec!["humidity".to_string(), "temp".to_string()]);
    assert_eq!(records[0].device_name, "Boiler");
}

#[tokio::test]
async fn min_interval_uses_reading_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = logger_config("temps", &["temp"]);
    config.min_interval_ms = 1_000;
    let logger = HistoryLogger::new(config, settings(dir.path()), 0);

    assert!(logger.record(&reading(0, 1.0), "Boiler", 0).await);
    assert!(!logger.record(&reading(500, 2.0), "Boiler", 500).await);
    assert!(logger.record(&reading(1_000, 3.0), "Boiler", 1_000).await);
    assert_eq!(logger.buffered().await, 2);
}

#[tokio::test]
async fn rotates_files_and_queries_across_them() {
    let dir = tempfile::tempdir().unwrap();
    let config = HistoryConfig {
        flush_records: 2,
        max_file_bytes: 100,
        ..settings(dir.path())
    };
    let logger = HistoryLogger::new(logger_config("temps", &["temp"]), config, 0);

    for i in 0..4 {
        let ts = 1_000 + i * 1_000;
        assert!(logger.record(&reading(ts, i as f64), "Boiler", ts).await);
    }
    assert_eq!(logger.buffered().await, 0);

    let files = logger.data_files().await.unwrap();
    assert_eq!(files.len(), 2);
    for file in &files {
        let name = file.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("temps_"));
        assert!(name.ends_with(".jsonl"));
    }

    let records = logger.query(0, i64::MAX, 100).await.unwrap();
    let stamps: Vec<_> = records.iter().map(|r| r.timestamp).collect();
    assert_eq!(stamps, vec![1_000, 2_000, 3_000, 4_000]);

    let window = logger.query(2_000, 3_000, 100).await.unwrap();
    assert_eq!(window.len(), 2);
    let limited = logger.query(0, i64::MAX, 3).await.unwrap();
    assert_eq!(limited.len(), 3);
}

#[tokio::test]
async fn interval_tick_flushes_pending_records() {
    let dir = tempfile::tempdir().unwrap();
    let config = HistoryConfig {
        flush_interval_ms: 60_000,
        ..settings(dir.path())
    };
    let logger = HistoryLogger::new(logger_config("temps", &["temp"]), config, 0);

    logger.record(&reading(1_000, 1.0), "Boiler", 1_000).await;
    logger.tick(30_000).await;
    assert_eq!(logger.buffered().await, 1);
    logger.tick(60_000).await;
    assert_eq!(logger.buffered().await, 0);
    assert_eq!(logger.data_files().await.unwrap().len(), 1);
}

#[tokio::test]
async fn skips_corrupt_lines() {
    let dir = tempfile::tempdir().unwrap();
    let logger_dir = dir.path().join("temps");
    std::fs::create_dir_all(&logger_dir).unwrap();
    let good = |ts: i64| {
        format!(
            r#"{{"timestamp":{},"deviceId":"boiler-1","deviceName":"Boiler","data":{{"temp":20.0}}}}"#,
            ts
        )
    };
    let content = format!("{}\nnot json at all\n{{\"timestamp\":\n{}\n", good(1), good(2));
    std::fs::write(logger_dir.join("temps_20250101_000000_000.jsonl"), content).unwrap();

    let logger = HistoryLogger::new(logger_config("temps", &["temp"]), settings(dir.path()), 0);
    let records = logger.query(0, i64::MAX, 100).await.unwrap();
    let stamps: Vec<_> = records.iter().map(|r| r.timestamp).collect();
    assert_eq!(stamps, vec![1, 2]);
}

#[tokio::test]
async fn retention_removes_only_expired_files() {
    let dir = tempfile::tempdir().unwrap();
    let logger_dir = dir.path().join("temps");
    std::fs::create_dir_all(&logger_dir).unwrap();
    let retention = Duration::from_secs(7 * 24 * 3600);
    let now = SystemTime::now();

    let old = logger_dir.join("temps_20250101_000000_000.jsonl");
    let fresh = logger_dir.join("temps_20250102_000000_000.jsonl");
    for (path, age) in [
        (&old, retention + Duration::from_secs(1)),
        (&fresh, retention - Duration::from_secs(1)),
    ] {
        let file = std::fs::File::create(path).unwrap();
        file.set_modified(now - age).unwrap();
    }

    let manager = HistoryManager::new(HistoryConfig {
        retention,
        ..settings(dir.path())
    });
    manager
        .replace_loggers(vec![logger_config("temps", &["temp"])])
        .await
        .unwrap();

    assert_eq!(manager.cleanup(now).await, 1);
    assert!(!old.exists());
    assert!(fresh.exists());
}

#[tokio::test]
async fn drops_buffer_after_repeated_flush_failures() {
    let dir = tempfile::tempdir().unwrap();
    // 以普通文件占位，目录无法创建
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"x").unwrap();
    let config = HistoryConfig {
        flush_records: 1,
        ..settings(&blocker)
    };
    let logger = HistoryLogger::new(logger_config("temps", &["temp"]), config, 0);

    logger.record(&reading(1, 1.0), "Boiler", 1).await;
    logger.record(&reading(2, 2.0), "Boiler", 2).await;
    assert_eq!(logger.buffered().await, 2);
    logger.record(&reading(3, 3.0), "Boiler", 3).await;
    assert_eq!(logger.buffered().await, 0);
}

#[tokio::test]
async fn manager_routes_events_and_exports() {
    let dir = tempfile::tempdir().unwrap();
    let manager = HistoryManager::new(settings(dir.path()));
    manager
        .replace_loggers(vec![
            logger_config("temps", &["temp", "flow"]),
            logger_config("humidity", &["humidity"]),
        ])
        .await
        .unwrap();

    assert_eq!(manager.handle_at(&poll_event(reading(1_000, 21.5)), 1_000).await, 2);
    let failure = PollEvent {
        device_id: "boiler-1".to_string(),
        device_name: "Boiler".to_string(),
        status: DeviceStatus::Error,
        ts_ms: 2_000,
        outcome: PollOutcome::Failure {
            kind: domain::FailureKind::Connectivity,
            message: "refused".to_string(),
        },
    };
    assert_eq!(manager.handle_at(&failure, 2_000).await, 0);

    let csv = manager
        .export("temps", 0, i64::MAX, 100, ExportFormat::Csv)
        .await
        .unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines[0], "timestamp,deviceId,deviceName,temp,flow");
    assert_eq!(lines[1], "1000,boiler-1,Boiler,21.5,");

    let json = manager
        .export("humidity", 0, i64::MAX, 100, ExportFormat::Json)
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed[0]["data"]["humidity"], 40);
    assert_eq!(parsed[0]["deviceId"], "boiler-1");

    let missing = manager.query("nope", 0, i64::MAX, 10).await;
    assert!(matches!(missing, Err(HistoryError::NotFound(_))));
}

#[tokio::test]
async fn replacing_loggers_flushes_removed_ones() {
    let dir = tempfile::tempdir().unwrap();
    let manager = HistoryManager::new(settings(dir.path()));
    manager
        .replace_loggers(vec![logger_config("temps", &["temp"])])
        .await
        .unwrap();
    manager.handle_at(&poll_event(reading(1_000, 20.0)), 1_000).await;

    manager.replace_loggers(Vec::new()).await.unwrap();
    assert!(manager.loggers().await.is_empty());
    let files: Vec<_> = std::fs::read_dir(dir.path().join("temps")).unwrap().collect();
    assert_eq!(files.len(), 1);

    let duplicate = manager
        .replace_loggers(vec![
            logger_config("a", &["temp"]),
            logger_config("a", &["humidity"]),
        ])
        .await;
    assert!(matches!(duplicate, Err(HistoryError::InvalidLogger(_, _))));
}

fn record(ts_ms: i64) -> HistoryRecord {
    HistoryRecord {
        timestamp: ts_ms,
        device_id: "boiler-1".to_string(),
        device_name: "Boiler".to_string(),
        data: [("temp".to_string(), 20.0.into())].into_iter().collect(),
    }
}

#[tokio::test]
async fn partial_batch_is_truncated_before_next_append() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = LogStore::new(dir.path(), "boiler", 1_000_000);
    store.append(&[record(1)]).await.unwrap();
    let active = store.active_file().unwrap().to_path_buf();

    // 模拟中途失败的写入
    let mut content = tokio::fs::read(&active).await.unwrap();
    content.extend_from_slice(br#"{"timestamp":2,"devi"#);
    tokio::fs::write(&active, &content).await.unwrap();

    store.append(&[record(2), record(3)]).await.unwrap();

    let text = tokio::fs::read_to_string(&active).await.unwrap();
    assert_eq!(text.lines().count(), 3);
    let stamps: Vec<i64> = store
        .scan(0, i64::MAX, 100)
        .await
        .unwrap()
        .iter()
        .map(|r| r.timestamp)
        .collect();
    assert_eq!(stamps, vec![1, 2, 3]);
}
