//! Modbus TCP 适配器
//!
//! 每次读取建立一条短连接，按配置的读取项依次读取并解码。
//!
//! ```json
//! {
//!   "protocol": "modbus_tcp", "host": "192.168.1.100", "port": 502, "unitId": 1,
//!   "registers": [{ "function": "holding", "address": 100, "dataType": "float32" }]
//! }
//! ```

use crate::adapter::{ProtocolAdapter, with_timeout};
use crate::error::AdapterError;
use async_trait::async_trait;
use domain::{
    ConnectionParams, DeviceConfig, ModbusDataType, ModbusFunction, ModbusRegister,
    ModbusTcpParams, Reading, ReadingValue, now_epoch_ms,
};
use std::net::SocketAddr;
use tokio_modbus::prelude::*;
use tracing::debug;

/// Modbus TCP 采集适配器
#[derive(Debug, Default, Clone)]
pub struct ModbusTcpAdapter;

impl ModbusTcpAdapter {
    pub fn new() -> Self {
        Self
    }

    async fn read_all(
        &self,
        device_id: &str,
        params: &ModbusTcpParams,
    ) -> Result<Reading, AdapterError> {
        let addr = resolve(&params.host, params.port).await?;
        let mut ctx = tcp::connect_slave(addr, Slave(params.unit_id))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::ConnectionRefused => {
                    AdapterError::Connection(format!("{}: {}", addr, e))
                }
                _ => AdapterError::Io(e),
            })?;

        let mut reading = Reading::new(device_id, now_epoch_ms());
        let result = read_registers(&mut ctx, &params.registers, &mut reading).await;
        let _ = ctx.disconnect().await;
        result?;

        debug!(
            target: "ems.protocol",
            device_id,
            addr = %addr,
            values = reading.values.len(),
            "modbus_read"
        );
        Ok(reading)
    }
}

#[async_trait]
impl ProtocolAdapter for ModbusTcpAdapter {
    async fn read(&self, device: &DeviceConfig) -> Result<Reading, AdapterError> {
        let ConnectionParams::ModbusTcp(params) = &device.connection else {
            return Err(AdapterError::Config(format!(
                "device {} is not a modbus_tcp device",
                device.id
            )));
        };
        if params.registers.is_empty() {
            return Err(AdapterError::Config("no registers configured".to_string()));
        }
        with_timeout(params.timeout_ms, self.read_all(&device.id, params)).await
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, AdapterError> {
    if let Ok(addr) = format!("{}:{}", host, port).parse::<SocketAddr>() {
        return Ok(addr);
    }
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| AdapterError::Connection(format!("resolve {}: {}", host, e)))?
        .next()
        .ok_or_else(|| AdapterError::Connection(format!("no address for {}", host)))
}

async fn read_registers(
    ctx: &mut tokio_modbus::client::Context,
    registers: &[ModbusRegister],
    reading: &mut Reading,
) -> Result<(), AdapterError> {
    for register in registers {
        let prefix = register.function.key_prefix();
        match register.function {
            ModbusFunction::Coils | ModbusFunction::DiscreteInputs => {
                let count = register.count.max(1);
                let response = if register.function == ModbusFunction::Coils {
                    ctx.read_coils(register.address, count).await
                } else {
                    ctx.read_discrete_inputs(register.address, count).await
                };
                let bits = response
                    .map_err(map_modbus_error)?
                    .map_err(|e| AdapterError::Modbus(format!("exception: {:?}", e)))?;
                for (offset, bit) in bits.into_iter().take(count as usize).enumerate() {
                    let address = register.address as usize + offset;
                    reading.insert(format!("{}_{}", prefix, address), bit);
                }
            }
            ModbusFunction::Holding | ModbusFunction::Input => {
                let words = register.data_type.word_count();
                let response = if register.function == ModbusFunction::Holding {
                    ctx.read_holding_registers(register.address, words).await
                } else {
                    ctx.read_input_registers(register.address, words).await
                };
                let values = response
                    .map_err(map_modbus_error)?
                    .map_err(|e| AdapterError::Modbus(format!("exception: {:?}", e)))?;
                let value = parse_registers(&values, register.data_type)?;
                reading.insert(format!("{}_{}", prefix, register.address), value);
            }
        }
    }
    Ok(())
}

fn map_modbus_error(err: tokio_modbus::Error) -> AdapterError {
    match err {
        tokio_modbus::Error::Transport(io) => AdapterError::Io(io),
        other => AdapterError::Modbus(other.to_string()),
    }
}

/// 按数据类型解码寄存器（高字在前）。
pub fn parse_registers(
    registers: &[u16],
    data_type: ModbusDataType,
) -> Result<ReadingValue, AdapterError> {
    let needed = data_type.word_count() as usize;
    if registers.len() < needed {
        return Err(AdapterError::DataParse(format!(
            "need {} registers for {:?}, got {}",
            needed,
            data_type,
            registers.len()
        )));
    }

    let value = match data_type {
        ModbusDataType::Int16 => ReadingValue::I64(registers[0] as i16 as i64),
        ModbusDataType::Uint16 => ReadingValue::I64(registers[0] as i64),
        ModbusDataType::Int32 => ReadingValue::I64(join_u32(registers) as i32 as i64),
        ModbusDataType::Uint32 => ReadingValue::I64(join_u32(registers) as i64),
        ModbusDataType::Float32 => ReadingValue::F64(f32::from_bits(join_u32(registers)) as f64),
        ModbusDataType::Float64 => {
            let bits = registers[..4]
                .iter()
                .fold(0u64, |acc, word| (acc << 16) | *word as u64);
            ReadingValue::F64(f64::from_bits(bits))
        }
    };
    Ok(value)
}

fn join_u32(registers: &[u16]) -> u32 {
    ((registers[0] as u32) << 16) | registers[1] as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::FailureKind;

    #[test]
    fn test_parse_registers_int16() {
        let value = parse_registers(&[100u16], ModbusDataType::Int16).unwrap();
        assert_eq!(value, ReadingValue::I64(100));

        // 负数
        let value = parse_registers(&[(-100i16) as u16], ModbusDataType::Int16).unwrap();
        assert_eq!(value, ReadingValue::I64(-100));

        let value = parse_registers(&[(-100i16) as u16], ModbusDataType::Uint16).unwrap();
        assert_eq!(value, ReadingValue::I64(65436));
    }

    #[test]
    fn test_parse_registers_wide_types() {
        let bits = 230.5f32.to_bits();
        let value = parse_registers(
            &[(bits >> 16) as u16, bits as u16],
            ModbusDataType::Float32,
        )
        .unwrap();
        assert_eq!(value, ReadingValue::F64(230.5));

        let value = parse_registers(&[0xFFFF, 0xFFFE], ModbusDataType::Int32).unwrap();
        assert_eq!(value, ReadingValue::I64(-2));

        let value = parse_registers(&[0x0001, 0x0000], ModbusDataType::Uint32).unwrap();
        assert_eq!(value, ReadingValue::I64(65536));

        let bits = (-1.25f64).to_bits();
        let words = [
            (bits >> 48) as u16,
            (bits >> 32) as u16,
            (bits >> 16) as u16,
            bits as u16,
        ];
        let value = parse_registers(&words, ModbusDataType::Float64).unwrap();
        assert_eq!(value, ReadingValue::F64(-1.25));
    }

    #[test]
    fn test_parse_registers_short_input() {
        let err = parse_registers(&[1], ModbusDataType::Float32).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Protocol);
    }

    #[tokio::test]
    async fn refused_connection_is_connectivity_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let device = DeviceConfig {
            id: "meter-1".to_string(),
            name: "Meter".to_string(),
            connection: ConnectionParams::ModbusTcp(ModbusTcpParams {
                host: "127.0.0.1".to_string(),
                port,
                unit_id: 1,
                registers: vec![ModbusRegister {
                    function: ModbusFunction::Holding,
                    address: 0,
                    count: 1,
                    data_type: ModbusDataType::Int16,
                }],
                timeout_ms: 1000,
            }),
            poll_interval_ms: 1000,
        };
        let err = ModbusTcpAdapter::new().read(&device).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Connectivity);
    }
}
