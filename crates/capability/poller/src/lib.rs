//! 设备轮询：每台设备一个可取消的定时任务，维护状态机并分发轮询事件。

mod poller;
mod registry;

use async_trait::async_trait;
use domain::PollEvent;
use std::time::Duration;

pub use poller::{DevicePoller, validate};
pub use registry::DeviceRegistry;

/// 轮询器错误。
#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error("device already exists: {0}")]
    AlreadyExists(String),
    #[error("device not found: {0}")]
    NotFound(String),
    #[error("invalid device config: {0}")]
    InvalidConfig(String),
    #[error("poller stopped")]
    Stopped,
}

/// 轮询事件处理器。
#[async_trait]
pub trait PollEventHandler: Send + Sync {
    async fn handle(&self, event: PollEvent);
}

/// 占位处理器（用于接线与测试）。
#[derive(Debug, Default)]
pub struct NoopHandler;

#[async_trait]
impl PollEventHandler for NoopHandler {
    async fn handle(&self, _event: PollEvent) {}
}

/// 轮询参数。
#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    /// 新任务首次轮询前的等待时间。
    pub settle_delay: Duration,
    /// 单次读取的硬截止时间，与适配器内部超时相互独立。
    pub poll_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(2000),
            poll_timeout: Duration::from_millis(10_000),
        }
    }
}
