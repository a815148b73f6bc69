use std::io::Write;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};
use crate::telemetry::Record;

/// Serialization format for emitted records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON format (human-readable, one record per line).
    #[default]
    Json,

    /// CBOR format (compact binary, concatenated items).
    Cbor,
}

/// Encode a value to bytes using the specified format.
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => serde_json::to_vec(value).map_err(Error::from),
        Format::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf)?;
            Ok(buf)
        }
    }
}

/// Decode bytes to a value using the specified format.
pub fn decode<T: DeserializeOwned>(data: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Json => serde_json::from_slice(data).map_err(Error::from),
        Format::Cbor => ciborium::from_reader(data).map_err(|e| Error::Cbor(e.to_string())),
    }
}

/// Write one record to an output stream.
///
/// JSON records are newline-delimited; CBOR items are concatenated.
pub fn write_record<W: Write>(out: &mut W, record: &Record, format: Format) -> Result<()> {
    let bytes = encode(record, format)?;
    out.write_all(&bytes)?;
    if format == Format::Json {
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// Read back every record of a stream written by [`write_record`].
pub fn read_records(data: &[u8], format: Format) -> Result<Vec<Record>> {
    match format {
        Format::Json => serde_json::Deserializer::from_slice(data)
            .into_iter::<Record>()
            .map(|record| record.map_err(Error::from))
            .collect(),
        Format::Cbor => {
            let mut records = Vec::new();
            let mut rest = data;
            while !rest.is_empty() {
                records.push(ciborium::from_reader(&mut rest)?);
            }
            Ok(records)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{DecodedValue, Record};

    fn sample_record() -> Record {
        Record::new(0, "COM3:5", "TemperatureDet", DecodedValue::Float32(23.25))
    }

    #[test]
    fn test_json_record() {
        let record = sample_record();

        let encoded = encode(&record, Format::Json).unwrap();
        let decoded: Record = decode(&encoded, Format::Json).unwrap();

        assert_eq!(record, decoded);
    }

    #[test]
    fn test_cbor_record() {
        let record = sample_record();

        let encoded = encode(&record, Format::Cbor).unwrap();
        let decoded: Record = decode(&encoded, Format::Cbor).unwrap();

        assert_eq!(record.device, decoded.device);
        assert_eq!(record.value, decoded.value);
    }

    #[test]
    fn test_cbor_is_smaller() {
        let record = sample_record();

        let json = encode(&record, Format::Json).unwrap();
        let cbor = encode(&record, Format::Cbor).unwrap();

        assert!(cbor.len() < json.len(), "CBOR should be smaller than JSON");
    }

    #[test]
    fn test_record_stream() {
        let records = vec![
            sample_record(),
            Record::new(0, "COM3:5", "TemperatureTarget", DecodedValue::Float32(f32::NAN)),
            Record::new(1, "COM3:5", "SlaveAddress", DecodedValue::UInt32(5)),
        ];

        for format in [Format::Json, Format::Cbor] {
            let mut out = Vec::new();
            for record in &records {
                write_record(&mut out, record, format).unwrap();
            }

            let back = read_records(&out, format).unwrap();
            assert_eq!(back.len(), 3);
            assert_eq!(back[0], records[0]);
            assert!(matches!(back[1].value, DecodedValue::Float32(v) if v.is_nan()));
            assert_eq!(back[2].value, DecodedValue::UInt32(5));
        }
    }

    #[test]
    fn test_json_stream_is_line_delimited() {
        let mut out = Vec::new();
        write_record(&mut out, &sample_record(), Format::Json).unwrap();
        write_record(&mut out, &sample_record(), Format::Json).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_truncated_stream_is_error() {
        let mut out = Vec::new();
        write_record(&mut out, &sample_record(), Format::Cbor).unwrap();
        out.truncate(out.len() - 2);
        assert!(read_records(&out, Format::Cbor).is_err());
    }
}
