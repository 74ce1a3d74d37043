//! 追踪、请求 ID 与网关运行指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 运行指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub polls_ok: u64,
    pub polls_failed: u64,
    pub polls_timed_out: u64,
    pub alarms_fired: u64,
    pub alarms_suppressed: u64,
    pub notify_failures: u64,
    pub register_rebuilds: u64,
    pub history_records: u64,
    pub history_flushes: u64,
    pub history_flush_failures: u64,
    pub history_dropped: u64,
    pub fanout_dropped: u64,
}

/// 进程级计数器。
pub struct TelemetryMetrics {
    polls_ok: AtomicU64,
    polls_failed: AtomicU64,
    polls_timed_out: AtomicU64,
    alarms_fired: AtomicU64,
    alarms_suppressed: AtomicU64,
    notify_failures: AtomicU64,
    register_rebuilds: AtomicU64,
    history_records: AtomicU64,
    history_flushes: AtomicU64,
    history_flush_failures: AtomicU64,
    history_dropped: AtomicU64,
    fanout_dropped: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            polls_ok: AtomicU64::new(0),
            polls_failed: AtomicU64::new(0),
            polls_timed_out: AtomicU64::new(0),
            alarms_fired: AtomicU64::new(0),
            alarms_suppressed: AtomicU64::new(0),
            notify_failures: AtomicU64::new(0),
            register_rebuilds: AtomicU64::new(0),
            history_records: AtomicU64::new(0),
            history_flushes: AtomicU64::new(0),
            history_flush_failures: AtomicU64::new(0),
            history_dropped: AtomicU64::new(0),
            fanout_dropped: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            polls_ok: self.polls_ok.load(Ordering::Relaxed),
            polls_failed: self.polls_failed.load(Ordering::Relaxed),
            polls_timed_out: self.polls_timed_out.load(Ordering::Relaxed),
            alarms_fired: self.alarms_fired.load(Ordering::Relaxed),
            alarms_suppressed: self.alarms_suppressed.load(Ordering::Relaxed),
            notify_failures: self.notify_failures.load(Ordering::Relaxed),
            register_rebuilds: self.register_rebuilds.load(Ordering::Relaxed),
            history_records: self.history_records.load(Ordering::Relaxed),
            history_flushes: self.history_flushes.load(Ordering::Relaxed),
            history_flush_failures: self.history_flush_failures.load(Ordering::Relaxed),
            history_dropped: self.history_dropped.load(Ordering::Relaxed),
            fanout_dropped: self.fanout_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录成功轮询次数。
pub fn record_poll_ok() {
    metrics().polls_ok.fetch_add(1, Ordering::Relaxed);
}

/// 记录失败轮询次数（含超时）。
pub fn record_poll_failed() {
    metrics().polls_failed.fetch_add(1, Ordering::Relaxed);
}

/// 记录超过轮询截止时间的次数。
pub fn record_poll_timeout() {
    metrics().polls_timed_out.fetch_add(1, Ordering::Relaxed);
}

/// 记录告警触发次数。
pub fn record_alarm_fired() {
    metrics().alarms_fired.fetch_add(1, Ordering::Relaxed);
}

/// 记录冷却期内被抑制的告警次数。
pub fn record_alarm_suppressed() {
    metrics().alarms_suppressed.fetch_add(1, Ordering::Relaxed);
}

/// 记录通知投递失败次数。
pub fn record_notify_failure() {
    metrics().notify_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录寄存器表重建次数。
pub fn record_register_rebuild() {
    metrics().register_rebuilds.fetch_add(1, Ordering::Relaxed);
}

/// 记录进入缓冲区的历史记录条数。
pub fn record_history_record() {
    metrics().history_records.fetch_add(1, Ordering::Relaxed);
}

/// 记录历史缓冲刷盘成功次数。
pub fn record_history_flush() {
    metrics().history_flushes.fetch_add(1, Ordering::Relaxed);
}

/// 记录历史缓冲刷盘失败次数。
pub fn record_history_flush_failure() {
    metrics()
        .history_flush_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录被丢弃的历史记录条数。
pub fn record_history_dropped(count: u64) {
    metrics().history_dropped.fetch_add(count, Ordering::Relaxed);
}

/// 记录消费者队列已满而丢弃的事件数。
pub fn record_fanout_dropped() {
    metrics().fanout_dropped.fetch_add(1, Ordering::Relaxed);
}
