use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 规范化后的单个数据值。
///
/// 所有协议适配器的输出都收敛到这四种形态。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingValue {
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
}

impl ReadingValue {
    /// 数值视图：布尔按 0/1，字符串尝试解析，失败返回 None。
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ReadingValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            ReadingValue::I64(v) => Some(*v as f64),
            ReadingValue::F64(v) => v.is_finite().then_some(*v),
            ReadingValue::String(v) => v.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingValue::Bool(v) => write!(f, "{}", v),
            ReadingValue::I64(v) => write!(f, "{}", v),
            ReadingValue::F64(v) => write!(f, "{}", v),
            ReadingValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for ReadingValue {
    fn from(value: f64) -> Self {
        ReadingValue::F64(value)
    }
}

impl From<i64> for ReadingValue {
    fn from(value: i64) -> Self {
        ReadingValue::I64(value)
    }
}

impl From<bool> for ReadingValue {
    fn from(value: bool) -> Self {
        ReadingValue::Bool(value)
    }
}

impl From<String> for ReadingValue {
    fn from(value: String) -> Self {
        ReadingValue::String(value)
    }
}

/// 一次适配器读取产生的规范化快照。
///
/// 创建后不可变；通过 `Arc<Reading>` 只读地分发给所有消费者。
/// 键按字典序迭代，下游的地址分配依赖这个稳定顺序。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub device_id: String,
    pub ts_ms: i64,
    pub values: BTreeMap<String, ReadingValue>,
}

impl Reading {
    pub fn new(device_id: impl Into<String>, ts_ms: i64) -> Self {
        Self {
            device_id: device_id.into(),
            ts_ms,
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<ReadingValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ReadingValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ReadingValue> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 获取当前时间戳（毫秒）
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
