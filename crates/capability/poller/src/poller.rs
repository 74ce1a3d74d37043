use crate::registry::DeviceRegistry;
use crate::{PollEventHandler, PollerConfig, PollerError};
use domain::{
    DeviceConfig, DeviceStatus, EventSink, FailureKind, GatewayEvent, PollEvent, PollOutcome,
    Reading, now_epoch_ms,
};
use ems_protocol::{AdapterError, ProtocolAdapter};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{error::Elapsed, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct PollTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollTask {
    /// 取消并等待任务退出（进行中的读取会先完成或到达截止时间）。
    async fn stop(self) {
        self.token.cancel();
        if let Err(err) = self.handle.await {
            warn!(target: "ems.poller", error = %err, "poll_task_join_failed");
        }
    }
}

struct PollContext {
    registry: DeviceRegistry,
    adapter: Arc<dyn ProtocolAdapter>,
    handler: Arc<dyn PollEventHandler>,
    events: Arc<dyn EventSink>,
    config: PollerConfig,
}

/// 设备轮询器。
///
/// 增删改在同一把锁下先停旧任务再起新任务，保证同一设备至多一个读取在进行。
pub struct DevicePoller {
    ctx: Arc<PollContext>,
    master_token: CancellationToken,
    tasks: Mutex<HashMap<String, PollTask>>,
}

impl DevicePoller {
    pub fn new(
        registry: DeviceRegistry,
        adapter: Arc<dyn ProtocolAdapter>,
        handler: Arc<dyn PollEventHandler>,
        events: Arc<dyn EventSink>,
        config: PollerConfig,
    ) -> Self {
        Self {
            ctx: Arc::new(PollContext {
                registry,
                adapter,
                handler,
                events,
                config,
            }),
            master_token: CancellationToken::new(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.ctx.registry
    }

    pub async fn add_device(&self, config: DeviceConfig) -> Result<(), PollerError> {
        validate(&config)?;
        let mut tasks = self.tasks.lock().await;
        if self.master_token.is_cancelled() {
            return Err(PollerError::Stopped);
        }
        let device_id = config.id.clone();
        self.ctx.registry.insert(config)?;
        tasks.insert(device_id.clone(), self.spawn(device_id.clone()));
        info!(target: "ems.poller", device_id = %device_id, "device_added");
        Ok(())
    }

    pub async fn update_device(&self, config: DeviceConfig) -> Result<(), PollerError> {
        validate(&config)?;
        let mut tasks = self.tasks.lock().await;
        if self.master_token.is_cancelled() {
            return Err(PollerError::Stopped);
        }
        if !self.ctx.registry.contains(&config.id) {
            return Err(PollerError::NotFound(config.id));
        }
        let device_id = config.id.clone();
        if let Some(task) = tasks.remove(&device_id) {
            task.stop().await;
        }
        self.ctx.registry.replace_config(config)?;
        tasks.insert(device_id.clone(), self.spawn(device_id.clone()));
        info!(target: "ems.poller", device_id = %device_id, "device_updated");
        Ok(())
    }

    pub async fn remove_device(&self, device_id: &str) -> Result<(), PollerError> {
        let mut tasks = self.tasks.lock().await;
        if !self.ctx.registry.contains(device_id) {
            return Err(PollerError::NotFound(device_id.to_string()));
        }
        if let Some(task) = tasks.remove(device_id) {
            task.stop().await;
        }
        self.ctx.registry.remove(device_id);
        info!(target: "ems.poller", device_id = %device_id, "device_removed");
        Ok(())
    }

    /// 停止全部定时器并等待进行中的读取结束。
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        self.master_token.cancel();
        let count = tasks.len();
        for (_, task) in tasks.drain() {
            task.stop().await;
        }
        info!(target: "ems.poller", tasks = count, "poller_stopped");
    }

    fn spawn(&self, device_id: String) -> PollTask {
        let token = self.master_token.child_token();
        let ctx = Arc::clone(&self.ctx);
        let task_token = token.clone();
        let handle = tokio::spawn(async move { run_device(ctx, device_id, task_token).await });
        PollTask { token, handle }
    }
}

/// 校验单台设备配置，添加与更新前调用。
pub fn validate(config: &DeviceConfig) -> Result<(), PollerError> {
    if config.id.trim().is_empty() {
        return Err(PollerError::InvalidConfig("device id is empty".to_string()));
    }
    if config.poll_interval_ms == 0 {
        return Err(PollerError::InvalidConfig(format!(
            "device {}: pollIntervalMs must be > 0",
            config.id
        )));
    }
    Ok(())
}

async fn run_device(ctx: Arc<PollContext>, device_id: String, token: CancellationToken) {
    tokio::select! {
        _ = token.cancelled() => return,
        _ = sleep(ctx.config.settle_delay) => {}
    }

    loop {
        let Some(config) = ctx.registry.config(&device_id) else {
            break;
        };

        // 读取不与取消竞争，由截止时间保证有界
        let result = timeout(ctx.config.poll_timeout, ctx.adapter.read(&config)).await;
        if token.is_cancelled() {
            debug!(target: "ems.poller", device_id = %device_id, "poll_result_discarded");
            break;
        }
        ctx.complete_poll(&config, result).await;

        let interval = Duration::from_millis(config.poll_interval_ms);
        tokio::select! {
            _ = token.cancelled() => break,
            _ = sleep(interval) => {}
        }
    }
}

impl PollContext {
    async fn complete_poll(
        &self,
        config: &DeviceConfig,
        result: Result<Result<Reading, AdapterError>, Elapsed>,
    ) {
        let ts_ms = now_epoch_ms();
        let (status, outcome, previous) = match result {
            Ok(Ok(reading)) => {
                let reading = Arc::new(reading);
                let Some(previous) = self.registry.record_success(&config.id, reading.clone())
                else {
                    return;
                };
                ems_telemetry::record_poll_ok();
                debug!(
                    target: "ems.poller",
                    device_id = %config.id,
                    values = reading.values.len(),
                    "poll_ok"
                );
                (DeviceStatus::Online, PollOutcome::Reading(reading), previous)
            }
            Ok(Err(err)) => {
                let kind = err.kind();
                let message = err.to_string();
                let Some(previous) = self.record_failure(config, kind, &message) else {
                    return;
                };
                (DeviceStatus::Error, PollOutcome::Failure { kind, message }, previous)
            }
            Err(_) => {
                ems_telemetry::record_poll_timeout();
                let kind = FailureKind::Connectivity;
                let message = format!(
                    "poll timed out after {}ms",
                    self.config.poll_timeout.as_millis()
                );
                let Some(previous) = self.record_failure(config, kind, &message) else {
                    return;
                };
                (DeviceStatus::Error, PollOutcome::Failure { kind, message }, previous)
            }
        };

        if previous != status {
            let error = match &outcome {
                PollOutcome::Failure { message, .. } => Some(message.clone()),
                PollOutcome::Reading(_) => None,
            };
            info!(
                target: "ems.poller",
                device_id = %config.id,
                from = %previous,
                to = %status,
                "device_status_changed"
            );
            self.events.publish(GatewayEvent::DeviceStatusChanged {
                device_id: config.id.clone(),
                previous,
                current: status,
                error,
                ts_ms,
            });
        }

        self.handler
            .handle(PollEvent {
                device_id: config.id.clone(),
                device_name: config.name.clone(),
                status,
                ts_ms,
                outcome,
            })
            .await;
    }

    fn record_failure(
        &self,
        config: &DeviceConfig,
        kind: FailureKind,
        message: &str,
    ) -> Option<DeviceStatus> {
        let previous = self
            .registry
            .record_failure(&config.id, kind, message.to_string())?;
        ems_telemetry::record_poll_failed();
        warn!(
            target: "ems.poller",
            device_id = %config.id,
            protocol = %config.protocol(),
            kind = kind.as_str(),
            error = %message,
            "poll_failed"
        );
        Some(previous)
    }
}
