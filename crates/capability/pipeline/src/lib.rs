//! # 数据流水线
//!
//! 轮询器产出的事件经 [`Fanout`] 分发到三个相互独立的消费者：
//!
//! ```text
//! DevicePoller ──PollEvent──▶ Fanout ─┬─▶ AlarmEngine
//!                                     ├─▶ RegisterTranslator ──▶ RegisterServer
//!                                     └─▶ HistoryManager
//! ```
//!
//! 每个消费者一个有界队列、一个工作任务；同一设备的事件按完成顺序处理。
//! [`Gateway`] 负责组装、配置替换与有序停机。

mod events;
mod fanout;
mod gateway;

pub use events::BroadcastEventSink;
pub use fanout::Fanout;
pub use gateway::{Gateway, GatewayOptions, GatewaySnapshot};

use ems_alarm::AlarmError;
use ems_history::HistoryError;
use ems_poller::PollerError;
use ems_register::RegisterError;

/// 网关门面错误。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Poller(#[from] PollerError),
    #[error(transparent)]
    Alarm(#[from] AlarmError),
    #[error(transparent)]
    Register(#[from] RegisterError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}
