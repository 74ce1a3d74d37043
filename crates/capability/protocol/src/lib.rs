//! # 协议适配能力模块
//!
//! 每个协议族一个适配器，统一输出规范化读数 [`domain::Reading`]：
//! - **Modbus TCP**：`tokio-modbus` 客户端直接读取线圈/离散输入/保持/输入寄存器
//! - **SNMP**：依赖外部 [`SnmpClient`] 完成报文编解码
//! - **BACnet/IP**：依赖外部 [`BacnetClient`] 完成对象发现与属性读取
//!
//! ```text
//! DeviceConfig.connection
//!       │
//!       ▼
//! AdapterSet ── ModbusTcpAdapter
//!            ├─ SnmpAdapter ── SnmpClient
//!            └─ BacnetAdapter ── BacnetClient
//!       │
//!       ▼
//! Result<Reading, AdapterError>
//! ```

mod adapter;
mod bacnet;
mod error;
mod modbus_tcp;
mod snmp;

pub use adapter::{AdapterSet, ProtocolAdapter};
pub use bacnet::{BacnetAdapter, BacnetClient, BacnetTarget, BacnetValue};
pub use error::AdapterError;
pub use modbus_tcp::{ModbusTcpAdapter, parse_registers};
pub use snmp::{SnmpAdapter, SnmpClient, SnmpTarget, SnmpValue};
