//! 设备配置与运行时记录。

use crate::data::Reading;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 设备状态。
///
/// `offline|error --成功--> online`，`任意 --失败--> error`，没有终止态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    #[default]
    Offline,
    Online,
    Error,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Offline => "offline",
            DeviceStatus::Online => "online",
            DeviceStatus::Error => "error",
        }
    }

    /// offline 与 error 都视为不可用。
    pub fn is_faulted(&self) -> bool {
        matches!(self, DeviceStatus::Offline | DeviceStatus::Error)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 读取失败分类：连通性（超时/拒绝连接）或协议（解码/异常响应）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Connectivity,
    Protocol,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Connectivity => "connectivity",
            FailureKind::Protocol => "protocol",
        }
    }
}

/// 协议族。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    ModbusTcp,
    Snmp,
    Bacnet,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::ModbusTcp => "modbus_tcp",
            ProtocolKind::Snmp => "snmp",
            ProtocolKind::Bacnet => "bacnet",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Modbus 读取区
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModbusFunction {
    /// 线圈 (0x01)
    Coils,
    /// 离散输入 (0x02)
    DiscreteInputs,
    /// 保持寄存器 (0x03)
    Holding,
    /// 输入寄存器 (0x04)
    Input,
}

impl ModbusFunction {
    /// 键名前缀：`<function>_<address>`。
    pub fn key_prefix(&self) -> &'static str {
        match self {
            ModbusFunction::Coils => "coil",
            ModbusFunction::DiscreteInputs => "discrete",
            ModbusFunction::Holding => "holding",
            ModbusFunction::Input => "input",
        }
    }
}

/// Modbus 寄存器数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModbusDataType {
    /// 16位有符号整数
    #[default]
    Int16,
    /// 16位无符号整数
    Uint16,
    /// 32位有符号整数（2个寄存器）
    Int32,
    /// 32位无符号整数（2个寄存器）
    Uint32,
    /// 32位浮点数（2个寄存器）
    Float32,
    /// 64位浮点数（4个寄存器）
    Float64,
}

impl ModbusDataType {
    /// 占用的寄存器个数。
    pub fn word_count(&self) -> u16 {
        match self {
            ModbusDataType::Int16 | ModbusDataType::Uint16 => 1,
            ModbusDataType::Int32 | ModbusDataType::Uint32 | ModbusDataType::Float32 => 2,
            ModbusDataType::Float64 => 4,
        }
    }
}

/// 单个 Modbus 读取项。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModbusRegister {
    pub function: ModbusFunction,
    pub address: u16,
    /// 线圈/离散输入的位数；寄存器区按数据类型决定字数。
    #[serde(default = "default_count")]
    pub count: u16,
    #[serde(default)]
    pub data_type: ModbusDataType,
}

fn default_count() -> u16 {
    1
}

/// Modbus TCP 连接参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModbusTcpParams {
    pub host: String,
    #[serde(default = "default_modbus_port")]
    pub port: u16,
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    #[serde(default)]
    pub registers: Vec<ModbusRegister>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_modbus_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    3000
}

/// SNMP 查询项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnmpOid {
    pub oid: String,
    /// 自定义键名；缺省时使用 OID（`.` 替换为 `_`）。
    #[serde(default)]
    pub name: Option<String>,
}

impl SnmpOid {
    pub fn key(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.oid.trim_start_matches('.').replace('.', "_"),
        }
    }
}

/// SNMP 连接参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnmpParams {
    pub host: String,
    #[serde(default = "default_snmp_port")]
    pub port: u16,
    #[serde(default = "default_community")]
    pub community: String,
    #[serde(default)]
    pub oids: Vec<SnmpOid>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_snmp_port() -> u16 {
    161
}

fn default_community() -> String {
    "public".to_string()
}

/// BACnet 对象引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacnetObject {
    /// 对象类型，如 `analog-input`、`binary-value`
    pub object_type: String,
    pub instance: u32,
}

impl BacnetObject {
    pub fn key(&self) -> String {
        format!("{}_{}", self.object_type, self.instance)
    }
}

/// BACnet/IP 连接参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacnetParams {
    pub host: String,
    #[serde(default = "default_bacnet_port")]
    pub port: u16,
    pub device_instance: u32,
    /// 为空时先做对象发现，再读取全部对象。
    #[serde(default)]
    pub objects: Vec<BacnetObject>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_bacnet_port() -> u16 {
    47808
}

/// 连接参数：每个协议族一个变体。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum ConnectionParams {
    ModbusTcp(ModbusTcpParams),
    Snmp(SnmpParams),
    Bacnet(BacnetParams),
}

impl ConnectionParams {
    pub fn kind(&self) -> ProtocolKind {
        match self {
            ConnectionParams::ModbusTcp(_) => ProtocolKind::ModbusTcp,
            ConnectionParams::Snmp(_) => ProtocolKind::Snmp,
            ConnectionParams::Bacnet(_) => ProtocolKind::Bacnet,
        }
    }

    pub fn host(&self) -> &str {
        match self {
            ConnectionParams::ModbusTcp(p) => &p.host,
            ConnectionParams::Snmp(p) => &p.host,
            ConnectionParams::Bacnet(p) => &p.host,
        }
    }
}

/// 设备配置（由外部配置系统给出的不可变快照）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub connection: ConnectionParams,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    5000
}

impl DeviceConfig {
    pub fn protocol(&self) -> ProtocolKind {
        self.connection.kind()
    }
}

/// 设备运行时记录：配置 + 最近一次轮询结果。
///
/// 只由该设备自己的轮询任务修改。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub config: DeviceConfig,
    pub status: DeviceStatus,
    pub last_reading_at: Option<i64>,
    pub last_error: Option<String>,
    pub last_failure: Option<FailureKind>,
    pub last_reading: Option<Arc<Reading>>,
}

impl Device {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            status: DeviceStatus::Offline,
            last_reading_at: None,
            last_error: None,
            last_failure: None,
            last_reading: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
}
