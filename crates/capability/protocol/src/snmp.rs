//! SNMP 适配器
//!
//! 报文编解码由外部 `SnmpClient` 提供；适配器只负责目标组装与结果规整。

use crate::adapter::{ProtocolAdapter, with_timeout};
use crate::error::AdapterError;
use async_trait::async_trait;
use domain::{ConnectionParams, DeviceConfig, Reading, ReadingValue, SnmpOid, now_epoch_ms};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

/// 一次 GET 请求的目标。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnmpTarget {
    pub host: String,
    pub port: u16,
    pub community: String,
    pub timeout: Duration,
}

/// SNMP 变量绑定值
#[derive(Debug, Clone, PartialEq)]
pub enum SnmpValue {
    Integer(i64),
    Counter(u64),
    Gauge(u64),
    TimeTicks(u64),
    OctetString(String),
    ObjectId(String),
    IpAddress(Ipv4Addr),
    Null,
    NoSuchObject,
    NoSuchInstance,
}

impl SnmpValue {
    fn into_reading_value(self) -> Option<ReadingValue> {
        match self {
            SnmpValue::Integer(v) => Some(ReadingValue::I64(v)),
            SnmpValue::Counter(v) | SnmpValue::Gauge(v) | SnmpValue::TimeTicks(v) => {
                Some(ReadingValue::I64(i64::try_from(v).unwrap_or(i64::MAX)))
            }
            SnmpValue::OctetString(v) | SnmpValue::ObjectId(v) => Some(ReadingValue::String(v)),
            SnmpValue::IpAddress(v) => Some(ReadingValue::String(v.to_string())),
            SnmpValue::Null | SnmpValue::NoSuchObject | SnmpValue::NoSuchInstance => None,
        }
    }
}

/// SNMP 报文层能力。
#[async_trait]
pub trait SnmpClient: Send + Sync {
    /// 一次 GET，返回 `(oid, value)` 列表。
    async fn get(
        &self,
        target: &SnmpTarget,
        oids: &[String],
    ) -> Result<Vec<(String, SnmpValue)>, AdapterError>;
}

pub struct SnmpAdapter {
    client: Arc<dyn SnmpClient>,
}

impl SnmpAdapter {
    pub fn new(client: Arc<dyn SnmpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProtocolAdapter for SnmpAdapter {
    async fn read(&self, device: &DeviceConfig) -> Result<Reading, AdapterError> {
        let ConnectionParams::Snmp(params) = &device.connection else {
            return Err(AdapterError::Config(format!(
                "device {} is not an snmp device",
                device.id
            )));
        };
        if params.oids.is_empty() {
            return Err(AdapterError::Config("no oids configured".to_string()));
        }

        let target = SnmpTarget {
            host: params.host.clone(),
            port: params.port,
            community: params.community.clone(),
            timeout: Duration::from_millis(params.timeout_ms),
        };
        let oids: Vec<String> = params.oids.iter().map(|o| normalize_oid(&o.oid)).collect();
        let bindings = with_timeout(params.timeout_ms, self.client.get(&target, &oids)).await?;

        let mut reading = Reading::new(device.id.clone(), now_epoch_ms());
        for (oid, value) in bindings {
            let Some(value) = value.into_reading_value() else {
                continue;
            };
            reading.insert(key_for(&params.oids, &oid), value);
        }
        if reading.is_empty() {
            return Err(AdapterError::Snmp("no values returned".to_string()));
        }
        Ok(reading)
    }
}

fn normalize_oid(oid: &str) -> String {
    oid.trim().trim_start_matches('.').to_string()
}

fn key_for(configured: &[SnmpOid], oid: &str) -> String {
    let oid = normalize_oid(oid);
    configured
        .iter()
        .find(|entry| normalize_oid(&entry.oid) == oid)
        .map(SnmpOid::key)
        .unwrap_or_else(|| oid.replace('.', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::SnmpParams;
    use std::sync::Mutex;

    struct FakeClient {
        response: Vec<(String, SnmpValue)>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SnmpClient for FakeClient {
        async fn get(
            &self,
            _target: &SnmpTarget,
            oids: &[String],
        ) -> Result<Vec<(String, SnmpValue)>, AdapterError> {
            self.seen.lock().unwrap().extend(oids.iter().cloned());
            Ok(self.response.clone())
        }
    }

    fn device(oids: Vec<SnmpOid>) -> DeviceConfig {
        DeviceConfig {
            id: "ups-1".to_string(),
            name: "UPS".to_string(),
            connection: ConnectionParams::Snmp(SnmpParams {
                host: "10.0.0.5".to_string(),
                port: 161,
                community: "public".to_string(),
                oids,
                timeout_ms: 1000,
            }),
            poll_interval_ms: 1000,
        }
    }

    #[tokio::test]
    async fn normalizes_bindings_into_keys() {
        let client = Arc::new(FakeClient {
            response: vec![
                ("1.3.6.1.2.1.1.3.0".to_string(), SnmpValue::TimeTicks(4200)),
                ("1.3.6.1.4.1.1".to_string(), SnmpValue::Gauge(73)),
                ("1.3.6.1.4.1.2".to_string(), SnmpValue::NoSuchObject),
            ],
            seen: Mutex::new(Vec::new()),
        });
        let adapter = SnmpAdapter::new(client.clone());
        let reading = adapter
            .read(&device(vec![
                SnmpOid {
                    oid: ".1.3.6.1.2.1.1.3.0".to_string(),
                    name: None,
                },
                SnmpOid {
                    oid: "1.3.6.1.4.1.1".to_string(),
                    name: Some("load".to_string()),
                },
                SnmpOid {
                    oid: "1.3.6.1.4.1.2".to_string(),
                    name: None,
                },
            ]))
            .await
            .expect("reading");

        assert_eq!(
            reading.get("1_3_6_1_2_1_1_3_0"),
            Some(&ReadingValue::I64(4200))
        );
        assert_eq!(reading.get("load"), Some(&ReadingValue::I64(73)));
        assert_eq!(reading.values.len(), 2);
        assert_eq!(client.seen.lock().unwrap()[0], "1.3.6.1.2.1.1.3.0");
    }

    #[tokio::test]
    async fn empty_response_is_protocol_failure() {
        let client = Arc::new(FakeClient {
            response: vec![("1.3.6.1.4.1.1".to_string(), SnmpValue::Null)],
            seen: Mutex::new(Vec::new()),
        });
        let err = SnmpAdapter::new(client)
            .read(&device(vec![SnmpOid {
                oid: "1.3.6.1.4.1.1".to_string(),
                name: None,
            }]))
            .await
            .expect_err("empty");
        assert_eq!(err.kind(), domain::FailureKind::Protocol);
    }
}
