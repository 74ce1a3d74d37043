use async_trait::async_trait;
use domain::PollEvent;
use ems_poller::PollEventHandler;
use std::sync::RwLock;
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use tracing::{debug, warn};

struct Consumer {
    name: &'static str,
    sender: Sender<PollEvent>,
}

/// 轮询事件扇出：每个消费者一个有界队列，队列满时丢弃并计数。
///
/// 单个消费者变慢不会阻塞轮询，也不会影响其他消费者。
pub struct Fanout {
    queue_size: usize,
    consumers: RwLock<Vec<Consumer>>,
}

impl Fanout {
    pub fn new(queue_size: usize) -> Self {
        Self {
            queue_size: queue_size.max(1),
            consumers: RwLock::new(Vec::new()),
        }
    }

    /// 注册消费者，返回其接收端。
    pub fn subscribe(&self, name: &'static str) -> Receiver<PollEvent> {
        let (sender, receiver) = mpsc::channel(self.queue_size);
        self.consumers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Consumer { name, sender });
        receiver
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// 释放全部发送端；消费者处理完队列中剩余事件后退出。
    pub fn close(&self) {
        let closed = std::mem::take(
            &mut *self
                .consumers
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        debug!(target: "ems.pipeline", consumers = closed.len(), "fanout_closed");
    }

    pub fn dispatch(&self, event: PollEvent) {
        let consumers = self
            .consumers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for consumer in consumers.iter() {
            match consumer.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    ems_telemetry::record_fanout_dropped();
                    warn!(
                        target: "ems.pipeline",
                        consumer = consumer.name,
                        device_id = %event.device_id,
                        "fanout_queue_full"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(target: "ems.pipeline", consumer = consumer.name, "fanout_consumer_closed");
                }
            }
        }
    }
}

#[async_trait]
impl PollEventHandler for Fanout {
    async fn handle(&self, event: PollEvent) {
        self.dispatch(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{DeviceStatus, PollOutcome, Reading};
    use std::sync::Arc;

    fn event(ts_ms: i64) -> PollEvent {
        PollEvent {
            device_id: "d1".to_string(),
            device_name: "Device".to_string(),
            status: DeviceStatus::Online,
            ts_ms,
            outcome: PollOutcome::Reading(Arc::new(Reading::new("d1", ts_ms))),
        }
    }

    #[tokio::test]
    async fn full_queue_drops_only_for_that_consumer() {
        let fanout = Fanout::new(1);
        let mut slow = fanout.subscribe("slow");
        let mut fast = fanout.subscribe("fast");

        fanout.dispatch(event(1));
        assert_eq!(fast.recv().await.map(|e| e.ts_ms), Some(1));
        fanout.dispatch(event(2));
        assert_eq!(fast.recv().await.map(|e| e.ts_ms), Some(2));

        assert_eq!(slow.recv().await.map(|e| e.ts_ms), Some(1));
        assert!(slow.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_ends_consumers_after_draining() {
        let fanout = Fanout::new(4);
        let mut rx = fanout.subscribe("history");
        fanout.dispatch(event(1));
        fanout.close();
        assert_eq!(fanout.consumer_count(), 0);
        assert_eq!(rx.recv().await.map(|e| e.ts_ms), Some(1));
        assert!(rx.recv().await.is_none());
    }
}
