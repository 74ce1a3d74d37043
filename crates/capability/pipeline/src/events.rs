use domain::{EventSink, GatewayEvent};
use tokio::sync::broadcast;
use tracing::trace;

/// 基于 broadcast 的事件出口：没有订阅者或订阅者落后时直接丢弃。
#[derive(Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<GatewayEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(&self, event: GatewayEvent) {
        if self.sender.send(event).is_err() {
            trace!(target: "ems.pipeline", "gateway_event_unobserved");
        }
    }
}
