use async_trait::async_trait;
use tracing::info;

/// 通知投递错误。
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// 外部通知通道（模板与传输不在本模块内）。
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        event_type: &str,
        message: &str,
        details: serde_json::Value,
    ) -> Result<(), NotifyError>;
}

/// 丢弃所有通知。
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(
        &self,
        _event_type: &str,
        _message: &str,
        _details: serde_json::Value,
    ) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// 将通知写入日志。
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        event_type: &str,
        message: &str,
        details: serde_json::Value,
    ) -> Result<(), NotifyError> {
        info!(
            target: "ems.notify",
            event_type,
            message,
            details = %details,
            "notification"
        );
        Ok(())
    }
}
