use crate::GatewayError;
use crate::fanout::Fanout;
use domain::{AlarmEvent, Device, DeviceConfig, EventSink, PollEvent, now_epoch_ms};
use ems_alarm::{AlarmEngine, AlarmEngineConfig, AlarmRule, Notifier, validate_rules};
use ems_config::GatewayConfig;
use ems_history::{
    ExportFormat, HistoryConfig, HistoryManager, HistoryRecord, LoggerConfig, validate_loggers,
};
use ems_poller::{
    DevicePoller, DeviceRegistry, PollEventHandler, PollerConfig, PollerError,
    validate as validate_device,
};
use ems_protocol::ProtocolAdapter;
use ems_register::{
    RegisterServer, RegisterServerConfig, RegisterTable, RegisterTranslator, ScalingRule,
    TranslatorConfig,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 网关组装参数。
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub poller: PollerConfig,
    pub alarm: AlarmEngineConfig,
    pub translator: TranslatorConfig,
    pub register_server: RegisterServerConfig,
    pub history: HistoryConfig,
    pub consumer_queue_size: usize,
    pub register_rebuild_interval: Duration,
    pub history_tick_interval: Duration,
    pub history_cleanup_interval: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            poller: PollerConfig::default(),
            alarm: AlarmEngineConfig::default(),
            translator: TranslatorConfig {
                holding_base: 0,
                input_base: 0,
            },
            register_server: RegisterServerConfig::default(),
            history: HistoryConfig::default(),
            consumer_queue_size: 1024,
            register_rebuild_interval: Duration::from_millis(5000),
            history_tick_interval: Duration::from_secs(1),
            history_cleanup_interval: Duration::from_secs(3600),
        }
    }
}

impl GatewayOptions {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            poller: PollerConfig {
                settle_delay: Duration::from_millis(config.settle_delay_ms),
                poll_timeout: Duration::from_millis(config.poll_timeout_ms),
            },
            alarm: AlarmEngineConfig {
                recent_capacity: config.alarm_recent_capacity,
                window_size: config.alarm_window_size,
            },
            translator: TranslatorConfig {
                holding_base: config.register_holding_base,
                input_base: config.register_input_base,
            },
            register_server: RegisterServerConfig {
                enabled: config.register_server_enabled,
                bind_addr: config.register_bind_addr.clone(),
                port: config.register_port,
                unit_id: config.register_unit_id,
            },
            history: HistoryConfig {
                dir: config.history_dir.clone(),
                flush_records: config.history_flush_records,
                flush_interval_ms: config.history_flush_interval_ms,
                max_file_bytes: config.history_max_file_bytes,
                retention: Duration::from_secs(config.history_retention_days * 24 * 3600),
                ..HistoryConfig::default()
            },
            consumer_queue_size: config.consumer_queue_size,
            register_rebuild_interval: Duration::from_millis(config.register_rebuild_interval_ms),
            ..Self::default()
        }
    }
}

/// 外部配置系统下发的完整配置快照。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySnapshot {
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub alarm_rules: Vec<AlarmRule>,
    #[serde(default)]
    pub scaling_rules: Vec<ScalingRule>,
    #[serde(default)]
    pub loggers: Vec<LoggerConfig>,
    #[serde(default)]
    pub register_server: Option<RegisterServerConfig>,
}

impl GatewaySnapshot {
    pub fn from_json(raw: &str) -> Result<Self, GatewayError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// 网关门面：持有轮询器与三个消费者，负责配置替换与有序停机。
pub struct Gateway {
    poller: DevicePoller,
    fanout: Arc<Fanout>,
    alarm: Arc<AlarmEngine>,
    translator: Arc<RegisterTranslator>,
    history: Arc<HistoryManager>,
    server: RegisterServer,
    server_config: Mutex<RegisterServerConfig>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    maintenance_token: CancellationToken,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl Gateway {
    pub async fn start(
        options: GatewayOptions,
        adapter: Arc<dyn ProtocolAdapter>,
        notifier: Arc<dyn Notifier>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, GatewayError> {
        let alarm = Arc::new(AlarmEngine::new(
            options.alarm,
            notifier,
            Arc::clone(&events),
        ));
        let translator = Arc::new(RegisterTranslator::new(
            options.translator,
            Arc::clone(&events),
        ));
        let history = Arc::new(HistoryManager::new(options.history.clone()));

        let server = RegisterServer::new(Arc::clone(&translator));
        server.apply(&options.register_server).await?;

        let registry = DeviceRegistry::new();
        let fanout = Arc::new(Fanout::new(options.consumer_queue_size));
        let workers = vec![
            spawn_worker(fanout.subscribe("alarm"), {
                let alarm = Arc::clone(&alarm);
                let registry = registry.clone();
                move |event| {
                    let alarm = Arc::clone(&alarm);
                    let registry = registry.clone();
                    async move {
                        route_alarm(&alarm, &registry, &event);
                    }
                }
            }),
            spawn_worker(fanout.subscribe("register"), {
                let translator = Arc::clone(&translator);
                let registry = registry.clone();
                move |_event| {
                    let translator = Arc::clone(&translator);
                    let registry = registry.clone();
                    async move {
                        translator.rebuild(&registry.snapshot());
                    }
                }
            }),
            spawn_worker(fanout.subscribe("history"), {
                let history = Arc::clone(&history);
                move |event| {
                    let history = Arc::clone(&history);
                    async move {
                        history.handle(&event).await;
                    }
                }
            }),
        ];

        let handler: Arc<dyn PollEventHandler> = fanout.clone();
        let poller = DevicePoller::new(registry.clone(), adapter, handler, events, options.poller);

        let maintenance_token = CancellationToken::new();
        let maintenance = tokio::spawn(run_maintenance(
            Arc::clone(&translator),
            registry,
            Arc::clone(&history),
            options.clone(),
            maintenance_token.clone(),
        ));

        info!(
            target: "ems.pipeline",
            queue_size = options.consumer_queue_size,
            register_server = options.register_server.enabled,
            "gateway_started"
        );
        Ok(Self {
            poller,
            fanout,
            alarm,
            translator,
            history,
            server,
            server_config: Mutex::new(options.register_server),
            workers: Mutex::new(workers),
            maintenance_token,
            maintenance: Mutex::new(Some(maintenance)),
        })
    }

    /// 应用完整配置快照：先校验全部内容，再依次替换规则、记录器与设备。
    pub async fn load_snapshot(&self, snapshot: GatewaySnapshot) -> Result<(), GatewayError> {
        validate_rules(&snapshot.alarm_rules)?;
        for rule in &snapshot.scaling_rules {
            rule.validate()?;
        }
        validate_loggers(&snapshot.loggers)?;
        let mut seen = HashSet::new();
        for device in &snapshot.devices {
            validate_device(device)?;
            if !seen.insert(device.id.as_str()) {
                return Err(PollerError::AlreadyExists(device.id.clone()).into());
            }
        }

        self.alarm.replace_rules(snapshot.alarm_rules)?;
        self.translator.replace_scaling(snapshot.scaling_rules)?;
        self.replace_loggers(snapshot.loggers).await?;

        let registry = self.poller.registry();
        for existing in registry.snapshot() {
            if !seen.contains(existing.id()) {
                self.remove_device(existing.id()).await?;
            }
        }
        let device_count = snapshot.devices.len();
        for config in snapshot.devices {
            match registry.config(&config.id) {
                Some(current) if current == config => {}
                Some(_) => self.poller.update_device(config).await?,
                None => self.poller.add_device(config).await?,
            }
        }
        if let Some(server) = snapshot.register_server {
            self.configure_register_server(server).await?;
        }
        info!(target: "ems.pipeline", devices = device_count, "snapshot_loaded");
        Ok(())
    }

    pub fn devices(&self) -> Vec<Device> {
        self.poller.registry().snapshot()
    }

    pub fn device(&self, id: &str) -> Option<Device> {
        self.poller.registry().get(id)
    }

    pub fn register_table(&self) -> Arc<RegisterTable> {
        self.translator.table()
    }

    pub fn recent_alarms(&self) -> Vec<AlarmEvent> {
        self.alarm.recent()
    }

    pub fn alarm_rules(&self) -> Vec<AlarmRule> {
        self.alarm.rules()
    }

    pub fn scaling_rules(&self) -> Vec<ScalingRule> {
        self.translator.scaling_rules()
    }

    pub async fn loggers(&self) -> Vec<LoggerConfig> {
        self.history.loggers().await
    }

    pub async fn history_query(
        &self,
        logger_id: &str,
        start: i64,
        end: i64,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, GatewayError> {
        Ok(self.history.query(logger_id, start, end, limit).await?)
    }

    pub async fn history_export(
        &self,
        logger_id: &str,
        start: i64,
        end: i64,
        limit: usize,
        format: ExportFormat,
    ) -> Result<String, GatewayError> {
        Ok(self
            .history
            .export(logger_id, start, end, limit, format)
            .await?)
    }

    pub async fn add_device(&self, config: DeviceConfig) -> Result<(), GatewayError> {
        Ok(self.poller.add_device(config).await?)
    }

    pub async fn update_device(&self, config: DeviceConfig) -> Result<(), GatewayError> {
        Ok(self.poller.update_device(config).await?)
    }

    /// 移除设备并清理其告警窗口，映射表随即重建。
    pub async fn remove_device(&self, id: &str) -> Result<(), GatewayError> {
        self.poller.remove_device(id).await?;
        self.alarm.forget_device(id);
        self.translator.rebuild(&self.poller.registry().snapshot());
        Ok(())
    }

    pub fn replace_alarm_rules(&self, rules: Vec<AlarmRule>) -> Result<(), GatewayError> {
        Ok(self.alarm.replace_rules(rules)?)
    }

    pub fn replace_scaling_rules(&self, rules: Vec<ScalingRule>) -> Result<(), GatewayError> {
        self.translator.replace_scaling(rules)?;
        self.translator.rebuild(&self.poller.registry().snapshot());
        Ok(())
    }

    /// 替换记录器后立即执行一次保留策略。
    pub async fn replace_loggers(&self, loggers: Vec<LoggerConfig>) -> Result<(), GatewayError> {
        self.history.replace_loggers(loggers).await?;
        let removed = self.history.cleanup(SystemTime::now()).await;
        if removed > 0 {
            info!(target: "ems.history", files = removed, "history_retention_applied");
        }
        Ok(())
    }

    pub async fn configure_register_server(
        &self,
        config: RegisterServerConfig,
    ) -> Result<Option<SocketAddr>, GatewayError> {
        let mut current = self.server_config.lock().await;
        let addr = self.server.apply(&config).await?;
        *current = config;
        Ok(addr)
    }

    pub async fn register_server_config(&self) -> RegisterServerConfig {
        self.server_config.lock().await.clone()
    }

    pub async fn register_server_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr().await
    }

    /// 有序停机：停定时器并等待进行中的读取 → 关闭队列并等待消费者排空
    /// → 刷写全部历史缓冲 → 停止转发服务。
    pub async fn shutdown(&self) {
        self.poller.shutdown().await;

        self.fanout.close();
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(err) = worker.await {
                warn!(target: "ems.pipeline", error = %err, "consumer_join_failed");
            }
        }

        self.maintenance_token.cancel();
        if let Some(handle) = self.maintenance.lock().await.take() {
            if let Err(err) = handle.await {
                warn!(target: "ems.pipeline", error = %err, "maintenance_join_failed");
            }
        }

        self.history.flush_all().await;
        self.server.stop().await;
        info!(target: "ems.pipeline", "gateway_stopped");
    }
}

fn spawn_worker<F, Fut>(mut receiver: Receiver<PollEvent>, handle: F) -> JoinHandle<()>
where
    F: Fn(PollEvent) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut processed = 0u64;
        while let Some(event) = receiver.recv().await {
            handle(event).await;
            processed += 1;
        }
        debug!(target: "ems.pipeline", processed, "consumer_drained");
    })
}

/// 已移除设备的排队事件不再建立告警窗口。
fn route_alarm(alarm: &AlarmEngine, registry: &DeviceRegistry, event: &PollEvent) {
    if registry.contains(&event.device_id) {
        alarm.process(event);
    } else {
        alarm.forget_device(&event.device_id);
    }
}

fn period(value: Duration) -> Duration {
    value.max(Duration::from_millis(1))
}

/// 周期任务：映射表重建、历史刷盘检查、保留策略。
async fn run_maintenance(
    translator: Arc<RegisterTranslator>,
    registry: DeviceRegistry,
    history: Arc<HistoryManager>,
    options: GatewayOptions,
    token: CancellationToken,
) {
    let mut rebuild = interval(period(options.register_rebuild_interval));
    let mut tick = interval(period(options.history_tick_interval));
    let mut cleanup = interval(period(options.history_cleanup_interval));
    rebuild.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    cleanup.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = rebuild.tick() => {
                translator.rebuild(&registry.snapshot());
            }
            _ = tick.tick() => {
                history.tick(now_epoch_ms()).await;
            }
            _ = cleanup.tick() => {
                let removed = history.cleanup(SystemTime::now()).await;
                if removed > 0 {
                    info!(target: "ems.history", files = removed, "history_retention_applied");
                }
            }
        }
    }
    debug!(target: "ems.pipeline", "maintenance_stopped");
}
