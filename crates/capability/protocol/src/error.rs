//! 适配器错误类型定义

use domain::FailureKind;

/// 单次读取失败
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// 连接错误（拒绝连接、地址不可达）
    #[error("connection error: {0}")]
    Connection(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 超时错误
    #[error("timeout: {0}")]
    Timeout(String),

    /// Modbus 错误（异常响应、帧错误）
    #[error("modbus error: {0}")]
    Modbus(String),

    /// SNMP 错误
    #[error("snmp error: {0}")]
    Snmp(String),

    /// BACnet 错误
    #[error("bacnet error: {0}")]
    Bacnet(String),

    /// 数据解析错误
    #[error("data parse error: {0}")]
    DataParse(String),

    /// 连接参数不合法
    #[error("config error: {0}")]
    Config(String),

    /// 没有注册对应协议的适配器
    #[error("unsupported protocol: {0}")]
    Unsupported(String),
}

impl AdapterError {
    /// 失败分类：两类都在下一个轮询周期重试，只影响日志与状态记录。
    pub fn kind(&self) -> FailureKind {
        match self {
            AdapterError::Connection(_) | AdapterError::Io(_) | AdapterError::Timeout(_) => {
                FailureKind::Connectivity
            }
            _ => FailureKind::Protocol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_failures() {
        assert_eq!(
            AdapterError::Timeout("3000ms".into()).kind(),
            FailureKind::Connectivity
        );
        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        assert_eq!(AdapterError::from(refused).kind(), FailureKind::Connectivity);
        assert_eq!(
            AdapterError::Modbus("exception: IllegalDataAddress".into()).kind(),
            FailureKind::Protocol
        );
        assert_eq!(
            AdapterError::Unsupported("snmp".into()).kind(),
            FailureKind::Protocol
        );
    }
}
