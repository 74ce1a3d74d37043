//! 适配器接口与按协议分派。

use crate::error::AdapterError;
use async_trait::async_trait;
use domain::{DeviceConfig, ProtocolKind, Reading};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// 协议适配器：对一台设备执行一次读取周期。
///
/// 适配器自身不做重试；超时由连接参数里的 `timeoutMs` 控制，
/// 轮询器另有独立的硬截止时间。
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    async fn read(&self, device: &DeviceConfig) -> Result<Reading, AdapterError>;
}

/// 按 `ConnectionParams` 变体分派到对应适配器。
#[derive(Clone, Default)]
pub struct AdapterSet {
    modbus_tcp: Option<Arc<dyn ProtocolAdapter>>,
    snmp: Option<Arc<dyn ProtocolAdapter>>,
    bacnet: Option<Arc<dyn ProtocolAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_modbus_tcp(mut self, adapter: Arc<dyn ProtocolAdapter>) -> Self {
        self.modbus_tcp = Some(adapter);
        self
    }

    pub fn with_snmp(mut self, adapter: Arc<dyn ProtocolAdapter>) -> Self {
        self.snmp = Some(adapter);
        self
    }

    pub fn with_bacnet(mut self, adapter: Arc<dyn ProtocolAdapter>) -> Self {
        self.bacnet = Some(adapter);
        self
    }

    pub fn supports(&self, kind: ProtocolKind) -> bool {
        self.adapter_for(kind).is_some()
    }

    fn adapter_for(&self, kind: ProtocolKind) -> Option<&Arc<dyn ProtocolAdapter>> {
        match kind {
            ProtocolKind::ModbusTcp => self.modbus_tcp.as_ref(),
            ProtocolKind::Snmp => self.snmp.as_ref(),
            ProtocolKind::Bacnet => self.bacnet.as_ref(),
        }
    }
}

#[async_trait]
impl ProtocolAdapter for AdapterSet {
    async fn read(&self, device: &DeviceConfig) -> Result<Reading, AdapterError> {
        let kind = device.protocol();
        match self.adapter_for(kind) {
            Some(adapter) => adapter.read(device).await,
            None => Err(AdapterError::Unsupported(kind.to_string())),
        }
    }
}

/// 以连接参数中的超时包裹一次读取。
pub(crate) async fn with_timeout<T, F>(timeout_ms: u64, fut: F) -> Result<T, AdapterError>
where
    F: Future<Output = Result<T, AdapterError>>,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms.max(1)), fut).await {
        Ok(result) => result,
        Err(_) => Err(AdapterError::Timeout(format!("{}ms", timeout_ms))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ConnectionParams, SnmpParams};

    struct Fixed;

    #[async_trait]
    impl ProtocolAdapter for Fixed {
        async fn read(&self, device: &DeviceConfig) -> Result<Reading, AdapterError> {
            Ok(Reading::new(device.id.clone(), 1).with_value("x", 1i64))
        }
    }

    fn snmp_device() -> DeviceConfig {
        DeviceConfig {
            id: "ups-1".to_string(),
            name: "UPS".to_string(),
            connection: ConnectionParams::Snmp(SnmpParams {
                host: "127.0.0.1".to_string(),
                port: 161,
                community: "public".to_string(),
                oids: Vec::new(),
                timeout_ms: 1000,
            }),
            poll_interval_ms: 1000,
        }
    }

    #[tokio::test]
    async fn missing_adapter_is_unsupported() {
        let set = AdapterSet::new();
        let err = set.read(&snmp_device()).await.expect_err("unsupported");
        assert!(matches!(err, AdapterError::Unsupported(ref p) if p == "snmp"));
    }

    #[tokio::test]
    async fn dispatches_by_protocol() {
        let set = AdapterSet::new().with_snmp(Arc::new(Fixed));
        assert!(set.supports(ProtocolKind::Snmp));
        assert!(!set.supports(ProtocolKind::ModbusTcp));
        let reading = set.read(&snmp_device()).await.expect("reading");
        assert_eq!(reading.device_id, "ups-1");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_maps_to_connectivity() {
        let err = with_timeout::<(), _>(50, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .expect_err("timeout");
        assert_eq!(err.kind(), domain::FailureKind::Connectivity);
    }
}
