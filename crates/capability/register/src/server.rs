//! Modbus TCP 转发服务：以当前映射表应答读保持 / 读输入寄存器。

use crate::RegisterError;
use crate::translator::{RegisterTable, RegisterTranslator};
use serde::{Deserialize, Serialize};
use std::future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_modbus::prelude::*;
use tokio_modbus::server::tcp::{Server, accept_tcp_connection};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 单次读取的最大寄存器数（Modbus 协议限制）。
const MAX_READ_COUNT: u16 = 125;

/// 转发服务配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterServerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5020
}

fn default_unit_id() -> u8 {
    1
}

impl Default for RegisterServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: default_bind_addr(),
            port: default_port(),
            unit_id: default_unit_id(),
        }
    }
}

/// 以映射表快照应答一次请求（只读：写请求一律拒绝）。
pub fn respond(
    table: &RegisterTable,
    unit_id: u8,
    request: SlaveRequest<'_>,
) -> Result<Response, ExceptionCode> {
    if request.slave != unit_id {
        return Err(ExceptionCode::GatewayTargetDevice);
    }
    match request.request {
        Request::ReadHoldingRegisters(start, count) => {
            check_range(start, count)?;
            Ok(Response::ReadHoldingRegisters(table.read_holding(start, count)))
        }
        Request::ReadInputRegisters(start, count) => {
            check_range(start, count)?;
            Ok(Response::ReadInputRegisters(table.read_input(start, count)))
        }
        _ => Err(ExceptionCode::IllegalFunction),
    }
}

fn check_range(start: u16, count: u16) -> Result<(), ExceptionCode> {
    if count == 0 || count > MAX_READ_COUNT {
        return Err(ExceptionCode::IllegalDataValue);
    }
    if start as u32 + count as u32 > u16::MAX as u32 + 1 {
        return Err(ExceptionCode::IllegalDataAddress);
    }
    Ok(())
}

#[derive(Clone)]
struct RegisterService {
    translator: Arc<RegisterTranslator>,
    unit_id: u8,
}

impl tokio_modbus::server::Service for RegisterService {
    type Request = SlaveRequest<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let table = self.translator.table();
        future::ready(respond(&table, self.unit_id, req))
    }
}

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// 可重配置的转发服务：重配置时先停旧监听再启动新监听。
pub struct RegisterServer {
    translator: Arc<RegisterTranslator>,
    running: Mutex<Option<Running>>,
}

impl RegisterServer {
    pub fn new(translator: Arc<RegisterTranslator>) -> Self {
        Self {
            translator,
            running: Mutex::new(None),
        }
    }

    /// 应用配置，返回实际监听地址（禁用时为 None）。
    pub async fn apply(
        &self,
        config: &RegisterServerConfig,
    ) -> Result<Option<SocketAddr>, RegisterError> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.take() {
            stop_running(current).await;
        }
        if !config.enabled {
            return Ok(None);
        }

        let bind = format!("{}:{}", config.bind_addr, config.port);
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|err| RegisterError::Bind(bind.clone(), err))?;
        let local_addr = listener.local_addr()?;
        let token = CancellationToken::new();
        let service = RegisterService {
            translator: Arc::clone(&self.translator),
            unit_id: config.unit_id,
        };
        let handle = tokio::spawn(serve(listener, service, token.clone()));
        info!(
            target: "ems.register",
            addr = %local_addr,
            unit_id = config.unit_id,
            "register_server_started"
        );
        *running = Some(Running {
            token,
            handle,
            local_addr,
        });
        Ok(Some(local_addr))
    }

    pub async fn stop(&self) {
        if let Some(current) = self.running.lock().await.take() {
            stop_running(current).await;
        }
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }
}

async fn stop_running(running: Running) {
    running.token.cancel();
    if let Err(err) = running.handle.await {
        warn!(target: "ems.register", error = %err, "register_server_join_failed");
    }
    info!(target: "ems.register", addr = %running.local_addr, "register_server_stopped");
}

async fn serve(listener: TcpListener, service: RegisterService, token: CancellationToken) {
    let server = Server::new(listener);
    let on_connected = move |stream: TcpStream, socket_addr: SocketAddr| {
        let service = service.clone();
        async move { accept_tcp_connection(stream, socket_addr, move |_| Ok(Some(service.clone()))) }
    };
    let on_process_error = |err: std::io::Error| {
        warn!(target: "ems.register", error = %err, "register_request_failed");
    };
    tokio::select! {
        _ = token.cancelled() => {}
        result = server.serve(&on_connected, on_process_error) => {
            if let Err(err) = result {
                warn!(target: "ems.register", error = %err, "register_server_failed");
            }
        }
    }
}
