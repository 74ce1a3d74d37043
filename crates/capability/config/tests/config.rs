use ems_config::{ConfigError, GatewayConfig};

// 环境变量为进程级共享状态，相关断言放在同一个测试里顺序执行。
#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("GW_HTTP_ADDR", "127.0.0.1:8081");
        std::env::set_var("GW_SETTLE_DELAY_MS", "500");
        std::env::set_var("GW_REGISTER_SERVER", "on");
        std::env::set_var("GW_REGISTER_PORT", "1502");
        std::env::set_var("GW_HISTORY_DIR", "/tmp/gw-history");
    }

    let config = GatewayConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8081");
    assert_eq!(config.settle_delay_ms, 500);
    assert!(config.register_server_enabled);
    assert_eq!(config.register_port, 1502);
    assert_eq!(config.register_unit_id, 1);
    assert_eq!(config.history_flush_records, 100);
    assert_eq!(config.history_max_file_bytes, 10 * 1024 * 1024);
    assert_eq!(config.history_retention_days, 30);
    assert_eq!(config.history_dir.to_str(), Some("/tmp/gw-history"));
    assert!(config.snapshot_path.is_none());

    unsafe {
        std::env::set_var("GW_REGISTER_PORT", "not-a-port");
    }
    let err = GatewayConfig::from_env().expect_err("invalid port");
    assert!(matches!(err, ConfigError::Invalid(key, _) if key == "GW_REGISTER_PORT"));

    unsafe {
        std::env::remove_var("GW_REGISTER_PORT");
        std::env::set_var("GW_CONSUMER_QUEUE_SIZE", "0");
    }
    let err = GatewayConfig::from_env().expect_err("zero queue");
    assert!(matches!(err, ConfigError::Invalid(key, _) if key == "GW_CONSUMER_QUEUE_SIZE"));
}
