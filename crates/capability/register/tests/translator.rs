use domain::{
    ConnectionParams, Device, DeviceConfig, DeviceStatus, EventSink, GatewayEvent,
    ModbusTcpParams, Reading,
};
use ems_register::{
    RegisterServer, RegisterServerConfig, RegisterTranslator, Scale, ScalingRule,
    TranslatorConfig, respond,
};
use std::sync::{Arc, Mutex};
use tokio_modbus::prelude::*;

#[derive(Default)]
struct CountingSink {
    changes: Mutex<Vec<usize>>,
}

impl EventSink for CountingSink {
    fn publish(&self, event: GatewayEvent) {
        if let GatewayEvent::RegisterTableChanged { entries, .. } = event {
            self.changes.lock().unwrap().push(entries);
        }
    }
}

fn device(id: &str, status: DeviceStatus, reading: Reading) -> Device {
    let mut device = Device::new(DeviceConfig {
        id: id.to_string(),
        name: id.to_string(),
        connection: ConnectionParams::ModbusTcp(ModbusTcpParams {
            host: "127.0.0.1".to_string(),
            port: 502,
            unit_id: 1,
            registers: Vec::new(),
            timeout_ms: 1000,
        }),
        poll_interval_ms: 1000,
    });
    device.status = status;
    device.last_reading_at = Some(reading.ts_ms);
    device.last_reading = Some(Arc::new(reading));
    device
}

fn fleet() -> Vec<Device> {
    vec![
        device(
            "meter-b",
            DeviceStatus::Online,
            Reading::new("meter-b", 1)
                .with_value("voltage", 2305i64)
                .with_value("alarm", true)
                .with_value("label", "north".to_string()),
        ),
        device(
            "meter-offline",
            DeviceStatus::Error,
            Reading::new("meter-offline", 1).with_value("voltage", 1i64),
        ),
        device(
            "meter-a",
            DeviceStatus::Online,
            Reading::new("meter-a", 1)
                .with_value("power", 40000.0)
                .with_value("current", -1.4),
        ),
    ]
}

#[test]
fn rebuild_assigns_sequential_addresses_in_device_order() {
    let translator = RegisterTranslator::new(
        TranslatorConfig {
            holding_base: 0,
            input_base: 100,
        },
        Arc::new(CountingSink::default()),
    );
    translator
        .replace_scaling(vec![ScalingRule {
            device_id: "meter-b".to_string(),
            key: "voltage".to_string(),
            scale: Scale {
                multiplier: 0.1,
                offset: 0.0,
                decimals: 1,
            },
        }])
        .unwrap();
    assert!(translator.rebuild(&fleet()));

    let table = translator.table();
    let keys: Vec<_> = table
        .entries()
        .iter()
        .map(|e| format!("{}/{}", e.source_device_id, e.source_key))
        .collect();
    // 设备按插入顺序，键按字典序；离线设备与字符串值跳过
    assert_eq!(
        keys,
        vec![
            "meter-b/alarm",
            "meter-b/voltage",
            "meter-a/current",
            "meter-a/power"
        ]
    );
    let voltage = &table.entries()[1];
    assert_eq!(voltage.holding_address, 1);
    assert_eq!(voltage.input_address, 101);
    assert_eq!(voltage.scaled_value, 230.5);
    assert_eq!(voltage.register_value, 231);

    let power = &table.entries()[3];
    assert_eq!(power.scaled_value, 32767.0);
    assert_eq!(power.register_value, 32767);

    assert_eq!(translator.read_holding(0, 5), vec![1, 231, 0xFFFF, 32767, 0]);
    assert_eq!(translator.read_input(99, 3), vec![0, 1, 231]);
}

#[test]
fn rebuild_is_idempotent() {
    let sink = Arc::new(CountingSink::default());
    let translator = RegisterTranslator::new(TranslatorConfig::default(), sink.clone());
    let devices = fleet();

    assert!(translator.rebuild(&devices));
    let first = translator.table();
    assert!(!translator.rebuild(&devices));
    let second = translator.table();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(sink.changes.lock().unwrap().as_slice(), &[4]);
}

#[test]
fn invalid_scaling_keeps_previous_rules() {
    let translator =
        RegisterTranslator::new(TranslatorConfig::default(), Arc::new(CountingSink::default()));
    let valid = ScalingRule {
        device_id: "meter-a".to_string(),
        key: "power".to_string(),
        scale: Scale {
            multiplier: 0.001,
            offset: 0.0,
            decimals: 0,
        },
    };
    translator.replace_scaling(vec![valid.clone()]).unwrap();
    let mut invalid = valid.clone();
    invalid.scale.decimals = 9;
    assert!(translator.replace_scaling(vec![invalid]).is_err());
    assert_eq!(translator.scaling_rules(), vec![valid]);
}

#[test]
fn respond_refuses_writes_and_foreign_units() {
    let translator =
        RegisterTranslator::new(TranslatorConfig::default(), Arc::new(CountingSink::default()));
    translator.rebuild(&fleet());
    let table = translator.table();

    let ok = respond(
        &table,
        1,
        SlaveRequest {
            slave: 1,
            request: Request::ReadHoldingRegisters(0, 2),
        },
    );
    assert_eq!(ok, Ok(Response::ReadHoldingRegisters(vec![1, 2305])));

    let write = respond(
        &table,
        1,
        SlaveRequest {
            slave: 1,
            request: Request::WriteSingleRegister(0, 7),
        },
    );
    assert_eq!(write, Err(ExceptionCode::IllegalFunction));

    let foreign = respond(
        &table,
        1,
        SlaveRequest {
            slave: 9,
            request: Request::ReadInputRegisters(0, 1),
        },
    );
    assert_eq!(foreign, Err(ExceptionCode::GatewayTargetDevice));

    let too_many = respond(
        &table,
        1,
        SlaveRequest {
            slave: 1,
            request: Request::ReadInputRegisters(0, 126),
        },
    );
    assert_eq!(too_many, Err(ExceptionCode::IllegalDataValue));
}

#[tokio::test]
async fn server_answers_reads_and_reconfigures() {
    let translator = Arc::new(RegisterTranslator::new(
        TranslatorConfig::default(),
        Arc::new(CountingSink::default()),
    ));
    translator.rebuild(&fleet());
    let server = RegisterServer::new(translator.clone());

    let config = RegisterServerConfig {
        enabled: true,
        bind_addr: "127.0.0.1".to_string(),
        port: 0,
        unit_id: 3,
    };
    let addr = server.apply(&config).await.unwrap().expect("listening");

    let mut ctx = tcp::connect_slave(addr, Slave(3)).await.unwrap();
    let words = ctx.read_input_registers(0, 3).await.unwrap().unwrap();
    assert_eq!(words, vec![1, 2305, 0xFFFF]);
    let _ = ctx.disconnect().await;

    let disabled = RegisterServerConfig {
        enabled: false,
        ..config
    };
    assert!(server.apply(&disabled).await.unwrap().is_none());
    assert!(server.local_addr().await.is_none());
}
