//! Integration tests for thermoscan-common library.

use thermoscan_common::{
    DecodedValue, Format, Record, decode, encode, read_records, write_record,
};

#[test]
fn test_full_record_workflow() {
    let record = Record::new(
        42,
        "/dev/ttyUSB0:3",
        "TemperatureTarget",
        DecodedValue::Float32(37.5),
    );

    // Encode as JSON
    let json_bytes = encode(&record, Format::Json).expect("JSON encode failed");
    assert!(!json_bytes.is_empty());

    // Decode from JSON
    let decoded: Record = decode(&json_bytes, Format::Json).expect("JSON decode failed");
    assert_eq!(decoded.iteration, 42);
    assert_eq!(decoded.device, "/dev/ttyUSB0:3");
    assert_eq!(decoded.variable, "TemperatureTarget");
    assert_eq!(decoded.value, DecodedValue::Float32(37.5));

    // Encode as CBOR
    let cbor_bytes = encode(&record, Format::Cbor).expect("CBOR encode failed");
    assert!(!cbor_bytes.is_empty());

    let cbor_decoded: Record = decode(&cbor_bytes, Format::Cbor).expect("CBOR decode failed");
    assert_eq!(cbor_decoded, decoded);
}

#[test]
fn test_record_json_shape() {
    let record = Record::new(0, "COM1:1", "SlaveAddress", DecodedValue::UInt16(1));

    let json: serde_json::Value =
        serde_json::from_slice(&encode(&record, Format::Json).unwrap()).unwrap();

    assert_eq!(json["iteration"], 0);
    assert_eq!(json["device"], "COM1:1");
    assert_eq!(json["variable"], "SlaveAddress");
    assert_eq!(json["value"]["type"], "UInt16");
    assert_eq!(json["value"]["value"], 1);
    assert!(json["timestamp"].as_i64().unwrap() > 0);
}

/// A sensor fault pattern (all bits set) decodes to NaN; the emitted stream
/// must still read back.
#[test]
fn test_fault_reading_round_trip() {
    let fault = f32::from_bits(0xFFFF_FFFF);
    assert!(fault.is_nan());

    let records = [
        Record::new(0, "COM1:2", "TemperatureDet", DecodedValue::Float32(fault)),
        Record::new(0, "COM1:2", "TemperatureTarget", DecodedValue::Float32(21.0)),
    ];

    let mut out = Vec::new();
    for record in &records {
        write_record(&mut out, record, Format::Json).unwrap();
    }

    let text = std::str::from_utf8(&out).unwrap();
    assert!(!text.contains("null"));

    let back = read_records(&out, Format::Json).unwrap();
    assert_eq!(back.len(), 2);
    assert!(matches!(back[0].value, DecodedValue::Float32(v) if v.is_nan()));
    assert_eq!(back[1], records[1]);
}
