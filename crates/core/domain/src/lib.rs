//! 网关共享领域模型：设备、规范化读数、轮询事件、告警事件。

pub mod alarm;
pub mod data;
pub mod device;
pub mod event;

pub use alarm::{AlarmEvent, Severity};
pub use data::{Reading, ReadingValue, now_epoch_ms};
pub use device::{
    BacnetObject, BacnetParams, ConnectionParams, Device, DeviceConfig, DeviceStatus, FailureKind,
    ModbusDataType, ModbusFunction, ModbusRegister, ModbusTcpParams, ProtocolKind, SnmpOid,
    SnmpParams,
};
pub use event::{EventSink, GatewayEvent, NoopEventSink, PollEvent, PollOutcome};
