use api_contract::{DeviceDto, HistoryQuery, RegisterEntryDto};

#[test]
fn device_dto_is_camel_case() {
    let dto = DeviceDto {
        device_id: "boiler-1".to_string(),
        name: "Boiler".to_string(),
        protocol: "modbus_tcp".to_string(),
        host: "10.0.0.5".to_string(),
        poll_interval_ms: 5000,
        status: "online".to_string(),
        last_reading_at: Some(1_700_000_000_000),
        last_error: None,
        last_failure: None,
        values: None,
    };
    let value = serde_json::to_value(dto).expect("serialize");
    assert_eq!(value["deviceId"], "boiler-1");
    assert_eq!(value["pollIntervalMs"], 5000);
    assert!(value.get("lastReadingAt").is_some());
    assert!(value.get("device_id").is_none());
}

#[test]
fn register_entry_dto_is_camel_case() {
    let dto = RegisterEntryDto {
        source_device_id: "d1".to_string(),
        source_key: "temp".to_string(),
        holding_address: 40,
        input_address: 0,
        raw_value: 23.456,
        scaled_value: 234.56,
        register_value: 235,
    };
    let value = serde_json::to_value(dto).expect("serialize");
    assert_eq!(value["holdingAddress"], 40);
    assert_eq!(value["registerValue"], 235);
}

#[test]
fn history_query_fields_are_optional() {
    let query: HistoryQuery = serde_json::from_str(r#"{"limit":10}"#).expect("parse");
    assert_eq!(query.limit, Some(10));
    assert!(query.start.is_none());
    assert!(query.format.is_none());
}
