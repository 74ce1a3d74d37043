use crate::RegisterError;
use crate::scale::{Scale, ScalingRule, register_word, scaled_value};
use domain::{Device, DeviceStatus, EventSink, GatewayEvent, now_epoch_ms};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// 地址分配起点。
#[derive(Debug, Clone, Copy, Default)]
pub struct TranslatorConfig {
    pub holding_base: u16,
    pub input_base: u16,
}

/// 寄存器映射条目。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterEntry {
    pub source_device_id: String,
    pub source_key: String,
    pub holding_address: u16,
    pub input_address: u16,
    pub scale: Option<Scale>,
    pub raw_value: f64,
    pub scaled_value: f64,
    pub register_value: u16,
}

/// 一次重建产生的不可变映射表。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterTable {
    holding_base: u16,
    input_base: u16,
    entries: Vec<RegisterEntry>,
}

impl RegisterTable {
    pub fn entries(&self) -> &[RegisterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn read_holding(&self, start: u16, count: u16) -> Vec<u16> {
        self.read_words(self.holding_base, start, count)
    }

    pub fn read_input(&self, start: u16, count: u16) -> Vec<u16> {
        self.read_words(self.input_base, start, count)
    }

    /// 未映射地址读为 0。
    fn read_words(&self, base: u16, start: u16, count: u16) -> Vec<u16> {
        (0..count as u32)
            .map(|i| {
                let address = start as u32 + i;
                address
                    .checked_sub(base as u32)
                    .and_then(|index| self.entries.get(index as usize))
                    .map(|entry| entry.register_value)
                    .unwrap_or(0)
            })
            .collect()
    }
}

/// 寄存器转换器：按设备快照重建映射表，整体替换。
pub struct RegisterTranslator {
    config: TranslatorConfig,
    scaling: RwLock<HashMap<(String, String), Scale>>,
    table: RwLock<Arc<RegisterTable>>,
    events: Arc<dyn EventSink>,
}

impl RegisterTranslator {
    pub fn new(config: TranslatorConfig, events: Arc<dyn EventSink>) -> Self {
        let table = RegisterTable {
            holding_base: config.holding_base,
            input_base: config.input_base,
            entries: Vec::new(),
        };
        Self {
            config,
            scaling: RwLock::new(HashMap::new()),
            table: RwLock::new(Arc::new(table)),
            events,
        }
    }

    fn scaling_read(&self) -> RwLockReadGuard<'_, HashMap<(String, String), Scale>> {
        self.scaling.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn table_write(&self) -> RwLockWriteGuard<'_, Arc<RegisterTable>> {
        self.table.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 整体替换缩放规则；任一规则非法则不做修改。
    pub fn replace_scaling(&self, rules: Vec<ScalingRule>) -> Result<(), RegisterError> {
        for rule in &rules {
            rule.validate()?;
        }
        let map: HashMap<_, _> = rules
            .into_iter()
            .map(|rule| ((rule.device_id, rule.key), rule.scale))
            .collect();
        let count = map.len();
        *self.scaling.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = map;
        info!(target: "ems.register", rules = count, "scaling_rules_replaced");
        Ok(())
    }

    pub fn scaling_rules(&self) -> Vec<ScalingRule> {
        let mut rules: Vec<_> = self
            .scaling_read()
            .iter()
            .map(|((device_id, key), scale)| ScalingRule {
                device_id: device_id.clone(),
                key: key.clone(),
                scale: *scale,
            })
            .collect();
        rules.sort_by(|a, b| (&a.device_id, &a.key).cmp(&(&b.device_id, &b.key)));
        rules
    }

    /// 当前映射表快照。
    pub fn table(&self) -> Arc<RegisterTable> {
        self.table
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn read_holding(&self, start: u16, count: u16) -> Vec<u16> {
        self.table().read_holding(start, count)
    }

    pub fn read_input(&self, start: u16, count: u16) -> Vec<u16> {
        self.table().read_input(start, count)
    }

    /// 基于设备快照（插入顺序）重建映射表；内容有变化时替换并返回 true。
    pub fn rebuild(&self, devices: &[Device]) -> bool {
        let table = self.build(devices);
        ems_telemetry::record_register_rebuild();

        let mut current = self.table_write();
        if **current == table {
            return false;
        }
        let entries = table.len();
        *current = Arc::new(table);
        drop(current);

        debug!(target: "ems.register", entries, "register_table_rebuilt");
        self.events.publish(GatewayEvent::RegisterTableChanged {
            entries,
            ts_ms: now_epoch_ms(),
        });
        true
    }

    fn build(&self, devices: &[Device]) -> RegisterTable {
        let scaling = self.scaling_read();
        let mut entries = Vec::new();
        let capacity = (u16::MAX - self.config.holding_base.max(self.config.input_base)) as usize + 1;

        'devices: for device in devices {
            if device.status != DeviceStatus::Online {
                continue;
            }
            let Some(reading) = device.last_reading.as_ref() else {
                continue;
            };
            for (key, value) in &reading.values {
                let Some(raw) = value.as_f64() else {
                    continue;
                };
                if entries.len() == capacity {
                    warn!(target: "ems.register", device_id = %device.id(), "register_space_exhausted");
                    break 'devices;
                }
                let index = entries.len() as u16;
                let scale = scaling.get(&(device.id().to_string(), key.clone())).copied();
                let scaled = scaled_value(raw, scale.as_ref());
                entries.push(RegisterEntry {
                    source_device_id: device.id().to_string(),
                    source_key: key.clone(),
                    holding_address: self.config.holding_base + index,
                    input_address: self.config.input_base + index,
                    scale,
                    raw_value: raw,
                    scaled_value: scaled,
                    register_value: register_word(scaled),
                });
            }
        }

        RegisterTable {
            holding_base: self.config.holding_base,
            input_base: self.config.input_base,
            entries,
        }
    }
}
