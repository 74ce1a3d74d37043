use domain::{
    ConnectionParams, DeviceConfig, DeviceStatus, ModbusDataType, ModbusFunction, ProtocolKind,
    Reading, ReadingValue,
};

#[test]
fn modbus_device_config_parses_with_defaults() {
    let json = r#"{
        "id": "meter-1",
        "name": "Main meter",
        "protocol": "modbus_tcp",
        "host": "192.168.1.100",
        "registers": [
            {"function": "holding", "address": 100, "dataType": "float32"},
            {"function": "coils", "address": 3, "count": 2}
        ]
    }"#;
    let config: DeviceConfig = serde_json::from_str(json).expect("parse");
    assert_eq!(config.protocol(), ProtocolKind::ModbusTcp);
    assert_eq!(config.poll_interval_ms, 5000);
    let ConnectionParams::ModbusTcp(params) = &config.connection else {
        panic!("expected modbus params");
    };
    assert_eq!(params.port, 502);
    assert_eq!(params.unit_id, 1);
    assert_eq!(params.registers.len(), 2);
    assert_eq!(params.registers[0].function, ModbusFunction::Holding);
    assert_eq!(params.registers[0].data_type, ModbusDataType::Float32);
    assert_eq!(params.registers[1].count, 2);
}

#[test]
fn snmp_and_bacnet_configs_parse() {
    let snmp: DeviceConfig = serde_json::from_str(
        r#"{"id":"ups-1","name":"UPS","protocol":"snmp","host":"10.0.0.5",
            "oids":[{"oid":"1.3.6.1.2.1.1.3.0"},{"oid":"1.3.6.1.4.1.1","name":"load"}]}"#,
    )
    .expect("snmp");
    let ConnectionParams::Snmp(params) = &snmp.connection else {
        panic!("expected snmp params");
    };
    assert_eq!(params.community, "public");
    assert_eq!(params.oids[0].key(), "1_3_6_1_2_1_1_3_0");
    assert_eq!(params.oids[1].key(), "load");

    let bacnet: DeviceConfig = serde_json::from_str(
        r#"{"id":"ahu-1","name":"AHU","protocol":"bacnet","host":"10.0.0.9",
            "deviceInstance":1200,"pollIntervalMs":10000}"#,
    )
    .expect("bacnet");
    assert_eq!(bacnet.protocol(), ProtocolKind::Bacnet);
    assert_eq!(bacnet.poll_interval_ms, 10000);
}

#[test]
fn reading_value_numeric_view() {
    let reading = Reading::new("dev-1", 1000)
        .with_value("temp", 21.5)
        .with_value("count", 7i64)
        .with_value("running", true)
        .with_value("label", "42.5".to_string())
        .with_value("name", "pump".to_string());
    assert_eq!(reading.get("temp").and_then(ReadingValue::as_f64), Some(21.5));
    assert_eq!(reading.get("count").and_then(ReadingValue::as_f64), Some(7.0));
    assert_eq!(reading.get("running").and_then(ReadingValue::as_f64), Some(1.0));
    assert_eq!(reading.get("label").and_then(ReadingValue::as_f64), Some(42.5));
    assert_eq!(reading.get("name").and_then(ReadingValue::as_f64), None);
    assert!(DeviceStatus::Error.is_faulted());
    assert!(!DeviceStatus::Online.is_faulted());
}
