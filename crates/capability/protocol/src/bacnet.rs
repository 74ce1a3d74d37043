//! BACnet/IP 适配器
//!
//! 对象发现与属性读取由外部 `BacnetClient` 提供。

use crate::adapter::{ProtocolAdapter, with_timeout};
use crate::error::AdapterError;
use async_trait::async_trait;
use domain::{BacnetObject, ConnectionParams, DeviceConfig, Reading, ReadingValue, now_epoch_ms};
use std::sync::Arc;
use std::time::Duration;

/// BACnet 读取目标设备。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacnetTarget {
    pub host: String,
    pub port: u16,
    pub device_instance: u32,
    pub timeout: Duration,
}

/// Present_Value 的应用层取值
#[derive(Debug, Clone, PartialEq)]
pub enum BacnetValue {
    Null,
    Boolean(bool),
    Unsigned(u64),
    Signed(i64),
    Real(f32),
    Double(f64),
    Enumerated(u32),
    CharacterString(String),
}

impl BacnetValue {
    fn into_reading_value(self) -> Option<ReadingValue> {
        match self {
            BacnetValue::Null => None,
            BacnetValue::Boolean(v) => Some(ReadingValue::Bool(v)),
            BacnetValue::Unsigned(v) => Some(ReadingValue::I64(i64::try_from(v).unwrap_or(i64::MAX))),
            BacnetValue::Signed(v) => Some(ReadingValue::I64(v)),
            BacnetValue::Real(v) => Some(ReadingValue::F64(v as f64)),
            BacnetValue::Double(v) => Some(ReadingValue::F64(v)),
            BacnetValue::Enumerated(v) => Some(ReadingValue::I64(v as i64)),
            BacnetValue::CharacterString(v) => Some(ReadingValue::String(v)),
        }
    }
}

/// BACnet 报文层能力。
#[async_trait]
pub trait BacnetClient: Send + Sync {
    /// 读取设备的 Object_List。
    async fn list_objects(&self, target: &BacnetTarget) -> Result<Vec<BacnetObject>, AdapterError>;

    /// 读取单个对象的 Present_Value。
    async fn read_present_value(
        &self,
        target: &BacnetTarget,
        object: &BacnetObject,
    ) -> Result<BacnetValue, AdapterError>;
}

pub struct BacnetAdapter {
    client: Arc<dyn BacnetClient>,
}

impl BacnetAdapter {
    pub fn new(client: Arc<dyn BacnetClient>) -> Self {
        Self { client }
    }

    async fn read_objects(
        &self,
        device_id: &str,
        target: &BacnetTarget,
        configured: &[BacnetObject],
    ) -> Result<Reading, AdapterError> {
        let discovered;
        let objects = if configured.is_empty() {
            discovered = self
                .client
                .list_objects(target)
                .await?
                .into_iter()
                .filter(|object| has_present_value(&object.object_type))
                .collect::<Vec<_>>();
            &discovered[..]
        } else {
            configured
        };

        let mut reading = Reading::new(device_id, now_epoch_ms());
        // 任一对象读取失败即整次读取失败
        for object in objects {
            let value = self.client.read_present_value(target, object).await?;
            if let Some(value) = value.into_reading_value() {
                reading.insert(object.key(), value);
            }
        }
        if reading.is_empty() {
            return Err(AdapterError::Bacnet("no present values read".to_string()));
        }
        Ok(reading)
    }
}

#[async_trait]
impl ProtocolAdapter for BacnetAdapter {
    async fn read(&self, device: &DeviceConfig) -> Result<Reading, AdapterError> {
        let ConnectionParams::Bacnet(params) = &device.connection else {
            return Err(AdapterError::Config(format!(
                "device {} is not a bacnet device",
                device.id
            )));
        };
        let target = BacnetTarget {
            host: params.host.clone(),
            port: params.port,
            device_instance: params.device_instance,
            timeout: Duration::from_millis(params.timeout_ms),
        };
        with_timeout(
            params.timeout_ms,
            self.read_objects(&device.id, &target, &params.objects),
        )
        .await
    }
}

fn has_present_value(object_type: &str) -> bool {
    ["analog-", "binary-", "multi-state-"]
        .iter()
        .any(|prefix| object_type.starts_with(prefix))
}
