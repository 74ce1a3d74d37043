//! 协议网关进程：组装轮询器与各消费者，提供只读 HTTP 查询接口。

mod app;
mod handlers;
mod routes;
mod utils;

use app::{AppState, build_app};
use domain::GatewayEvent;
use ems_alarm::LogNotifier;
use ems_config::GatewayConfig;
use ems_pipeline::{BroadcastEventSink, Gateway, GatewayOptions, GatewaySnapshot};
use ems_protocol::{AdapterSet, ModbusTcpAdapter};
use ems_telemetry::init_tracing;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = GatewayConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    // 内置 Modbus TCP；SNMP / BACnet 需注入对应客户端后再挂载
    let adapter = Arc::new(AdapterSet::new().with_modbus_tcp(Arc::new(ModbusTcpAdapter::new())));
    let events = BroadcastEventSink::new(256);
    spawn_event_log(&events);

    let gateway = Gateway::start(
        GatewayOptions::from_config(&config),
        adapter,
        Arc::new(LogNotifier),
        Arc::new(events),
    )
    .await?;
    let gateway = Arc::new(gateway);

    // 外部配置快照（设备、告警规则、缩放规则、记录器）
    if let Some(path) = &config.snapshot_path {
        let raw = tokio::fs::read_to_string(path).await?;
        gateway
            .load_snapshot(GatewaySnapshot::from_json(&raw)?)
            .await?;
        info!(target: "ems.gateway", path = %path.display(), "snapshot_applied");
    }

    let app = build_app(AppState {
        gateway: Arc::clone(&gateway),
    });
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(target: "ems.gateway", addr = %config.http_addr, "http_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    gateway.shutdown().await;
    Ok(())
}

/// UI 事件的默认订阅者：写入 debug 日志。
fn spawn_event_log(events: &BroadcastEventSink) {
    let mut receiver = events.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(GatewayEvent::DeviceStatusChanged {
                    device_id,
                    previous,
                    current,
                    ..
                }) => {
                    debug!(target: "ems.gateway", device_id = %device_id, %previous, %current, "device_status_changed");
                }
                Ok(GatewayEvent::AlarmTriggered(alarm)) => {
                    debug!(target: "ems.gateway", alarm_id = %alarm.id, rule_id = %alarm.rule_id, "alarm_event");
                }
                Ok(GatewayEvent::RegisterTableChanged { entries, .. }) => {
                    debug!(target: "ems.gateway", entries, "register_table_changed");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "ems.gateway", skipped, "event_log_lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: "ems.gateway", error = %err, "shutdown_signal_failed");
    }
    info!(target: "ems.gateway", "shutdown_requested");
}
