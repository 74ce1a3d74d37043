//! # 寄存器地址转换
//!
//! 将在线设备的数据点按顺序映射到 16 位寄存器空间：
//! 每个数据点同时占用一个保持寄存器地址与一个输入寄存器地址，
//! 两类地址分别从各自基址顺序分配，重建后不保证稳定。
//!
//! ```text
//! DeviceRegistry 快照 ──rebuild──▶ Arc<RegisterTable> ──▶ read_holding / read_input
//!                                        │
//!                                        └──▶ RegisterServer (Modbus TCP 0x03 / 0x04)
//! ```

mod scale;
mod server;
mod translator;

pub use scale::{Scale, ScalingRule, register_word, scaled_value};
pub use server::{RegisterServer, RegisterServerConfig, respond};
pub use translator::{RegisterEntry, RegisterTable, RegisterTranslator, TranslatorConfig};

/// 寄存器模块错误。
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("invalid scaling rule: {0}")]
    InvalidScaling(String),
    #[error("bind {0}: {1}")]
    Bind(String, #[source] std::io::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
