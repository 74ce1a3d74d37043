use crate::PollerError;
use domain::{Device, DeviceConfig, DeviceStatus, FailureKind, Reading};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct RegistryInner {
    order: Vec<String>,
    devices: HashMap<String, Device>,
}

/// 设备记录表（按插入顺序）。
///
/// 轮询器负责写入，寄存器转换与查询接口只读快照。
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().devices.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<Device> {
        self.read().devices.get(id).cloned()
    }

    pub fn config(&self, id: &str) -> Option<DeviceConfig> {
        self.read().devices.get(id).map(|device| device.config.clone())
    }

    /// 全部设备快照（插入顺序）。
    pub fn snapshot(&self) -> Vec<Device> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.devices.get(id).cloned())
            .collect()
    }

    pub(crate) fn insert(&self, config: DeviceConfig) -> Result<(), PollerError> {
        let mut inner = self.write();
        if inner.devices.contains_key(&config.id) {
            return Err(PollerError::AlreadyExists(config.id));
        }
        inner.order.push(config.id.clone());
        inner.devices.insert(config.id.clone(), Device::new(config));
        Ok(())
    }

    /// 替换配置，保留运行时状态。
    pub(crate) fn replace_config(&self, config: DeviceConfig) -> Result<(), PollerError> {
        let mut inner = self.write();
        match inner.devices.get_mut(&config.id) {
            Some(device) => {
                device.config = config;
                Ok(())
            }
            None => Err(PollerError::NotFound(config.id)),
        }
    }

    pub(crate) fn remove(&self, id: &str) -> Option<Device> {
        let mut inner = self.write();
        let removed = inner.devices.remove(id)?;
        inner.order.retain(|existing| existing != id);
        Some(removed)
    }

    /// 记录一次成功读取，返回之前的状态；设备已删除时返回 None。
    pub(crate) fn record_success(&self, id: &str, reading: Arc<Reading>) -> Option<DeviceStatus> {
        let mut inner = self.write();
        let device = inner.devices.get_mut(id)?;
        let previous = device.status;
        device.status = DeviceStatus::Online;
        device.last_reading_at = Some(reading.ts_ms);
        device.last_reading = Some(reading);
        device.last_error = None;
        device.last_failure = None;
        Some(previous)
    }

    /// 记录一次失败，返回之前的状态；设备已删除时返回 None。
    pub(crate) fn record_failure(
        &self,
        id: &str,
        kind: FailureKind,
        message: String,
    ) -> Option<DeviceStatus> {
        let mut inner = self.write();
        let device = inner.devices.get_mut(id)?;
        let previous = device.status;
        device.status = DeviceStatus::Error;
        device.last_error = Some(message);
        device.last_failure = Some(kind);
        Some(previous)
    }
}
