//! Configuration for the thermoscan poller.
//!
//! Every section is optional; an empty file (or no file at all) reproduces
//! the reference behaviour: 9600 8E1 with a 50 ms response timeout, units
//! 1..=16, 100 iterations of `TemperatureDet` and `TemperatureTarget`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thermoscan_common::{Format, LoggingConfig, load_config};
use thiserror::Error;

use crate::codec::RegisterLayout;
use crate::registry::{TEMPERATURE_DET, TEMPERATURE_TARGET};
use crate::scanner::MAX_UNIT_ADDRESS;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] thermoscan_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete poller configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThermoscanConfig {
    /// Serial line settings, shared by every port
    #[serde(default)]
    pub serial: SerialConfig,

    /// Discovery settings
    #[serde(default)]
    pub scan: ScanConfig,

    /// Sampling settings
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Register layout of the device family
    #[serde(default)]
    pub layout: RegisterLayout,

    /// Extra (or overriding) variable definitions
    #[serde(default)]
    pub variables: HashMap<String, VariableDef>,

    /// Record output
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial line parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Baud rate (default: 9600)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Data bits (default: 8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Parity: "none", "even", or "odd" (default: "even")
    #[serde(default = "default_parity")]
    pub parity: String,
    /// Stop bits: 1 or 2 (default: 1)
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Time to wait for a reply before giving up on a unit (default: 50)
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "even".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

fn default_response_timeout_ms() -> u64 {
    50
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

impl SerialConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Highest unit address to probe (1-247, default: 16)
    #[serde(default = "default_max_address")]
    pub max_address: u8,

    /// Ports to scan; empty means every port found on the host
    #[serde(default)]
    pub ports: Vec<String>,
}

fn default_max_address() -> u8 {
    16
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_address: default_max_address(),
            ports: Vec::new(),
        }
    }
}

/// Sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Iterations per device (default: 100)
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Variables read on every iteration, in order
    #[serde(default = "default_variables")]
    pub variables: Vec<String>,
}

fn default_iterations() -> u32 {
    100
}

fn default_variables() -> Vec<String> {
    vec![TEMPERATURE_DET.to_string(), TEMPERATURE_TARGET.to_string()]
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            variables: default_variables(),
        }
    }
}

/// Definition of a variable in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDef {
    /// First holding register
    pub address: u16,

    /// Wire type name ("uint16", "int16", "uint32", "int32", "float32")
    #[serde(rename = "type")]
    pub wire_type: String,

    /// Register count; defaults to the wire type's width
    #[serde(default)]
    pub count: Option<u16>,
}

/// Record output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Write every record to stdout
    #[serde(default)]
    pub emit_records: bool,

    /// Record encoding (default: json)
    #[serde(default)]
    pub format: Format,
}

impl ThermoscanConfig {
    /// Load configuration from a JSON5 file.
    ///
    /// The result is not validated: command-line overrides are applied on
    /// top of it first, then [`validate`](Self::validate) runs once.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Ok(load_config(path)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.max_address == 0 || self.scan.max_address > MAX_UNIT_ADDRESS {
            return Err(ConfigError::Validation(format!(
                "scan.max_address must be 1-{}, got {}",
                MAX_UNIT_ADDRESS, self.scan.max_address
            )));
        }

        if self.sampling.variables.is_empty() {
            return Err(ConfigError::Validation(
                "sampling.variables cannot be empty".to_string(),
            ));
        }

        if self.serial.response_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "serial.response_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Validation(
                "serial.baud_rate must be greater than zero".to_string(),
            ));
        }

        match self.serial.parity.to_lowercase().as_str() {
            "none" | "even" | "odd" => {}
            _ => {
                return Err(ConfigError::Validation(format!(
                    "invalid parity '{}' (use none, even, or odd)",
                    self.serial.parity
                )));
            }
        }

        if !(5..=8).contains(&self.serial.data_bits) {
            return Err(ConfigError::Validation(format!(
                "serial.data_bits must be 5-8, got {}",
                self.serial.data_bits
            )));
        }

        if !matches!(self.serial.stop_bits, 1 | 2) {
            return Err(ConfigError::Validation(format!(
                "serial.stop_bits must be 1 or 2, got {}",
                self.serial.stop_bits
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ByteOrder, WordOrder};
    use thermoscan_common::parse_config;

    #[test]
    fn test_empty_config_uses_reference_defaults() {
        let config: ThermoscanConfig = parse_config("{}").unwrap();
        config.validate().unwrap();

        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(config.serial.parity, "even");
        assert_eq!(config.serial.stop_bits, 1);
        assert_eq!(config.serial.response_timeout(), Duration::from_millis(50));
        assert_eq!(config.scan.max_address, 16);
        assert!(config.scan.ports.is_empty());
        assert_eq!(config.sampling.iterations, 100);
        assert_eq!(
            config.sampling.variables,
            vec!["TemperatureDet", "TemperatureTarget"]
        );
        assert_eq!(config.layout, RegisterLayout::default());
        assert!(!config.output.emit_records);
        assert_eq!(config.output.format, Format::Json);
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            serial: { baud_rate: 19200, parity: "none", response_timeout_ms: 100 },
            scan: { max_address: 32, ports: ["/dev/ttyUSB0", "/dev/ttyUSB1"] },
            sampling: { iterations: 10, variables: ["TemperatureDet"] },
            layout: { word_order: "msb_first" },
            variables: {
                Humidity: { address: 1040, type: "uint16" },
            },
            output: { emit_records: true, format: "cbor" },
            logging: { level: "debug" },
        }"#;

        let config: ThermoscanConfig = parse_config(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.serial.baud_rate, 19200);
        assert_eq!(config.serial.parity, "none");
        assert_eq!(config.scan.max_address, 32);
        assert_eq!(config.scan.ports.len(), 2);
        assert_eq!(config.sampling.iterations, 10);
        assert_eq!(config.layout.word_order, WordOrder::MsbFirst);
        assert_eq!(config.layout.byte_order, ByteOrder::Little);
        assert_eq!(config.variables["Humidity"].address, 0x0410);
        assert_eq!(config.variables["Humidity"].count, None);
        assert!(config.output.emit_records);
        assert_eq!(config.output.format, Format::Cbor);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_max_address() {
        let mut config = ThermoscanConfig::default();
        config.scan.max_address = 0;
        assert!(config.validate().is_err());

        config.scan.max_address = 248;
        assert!(config.validate().is_err());

        config.scan.max_address = 247;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_serial() {
        let mut config = ThermoscanConfig::default();
        config.serial.parity = "mark".to_string();
        assert!(config.validate().is_err());

        let mut config = ThermoscanConfig::default();
        config.serial.response_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ThermoscanConfig::default();
        config.serial.stop_bits = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_variables() {
        let mut config = ThermoscanConfig::default();
        config.sampling.variables.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = ThermoscanConfig::load_from_file("/nonexistent/thermoscan.json5").unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_invalid_file_value_can_be_overridden() {
        let mut config: ThermoscanConfig = parse_config("{ scan: { max_address: 0 } }").unwrap();
        assert!(config.validate().is_err());

        config.scan.max_address = 20;
        config.validate().unwrap();
    }
}
