//! Discovery and sampling of Modbus RTU temperature sensors.
//!
//! Each serial port is one shared bus. A pass over a bus probes unit
//! addresses `1..=max_address`, keeps the units whose `SlaveAddress`
//! register matches the address they answered at, then reads a list of
//! variables from each of them a fixed number of times.
//!
//! # Variables
//!
//! | Name | Register | Type |
//! |------|----------|------|
//! | `SlaveAddress` | `0x0800` | `UInt16` |
//! | `TemperatureTarget` | `0x0400` | `Float32` |
//! | `TemperatureDet` | `0x0404` | `Float32` |
//!
//! Multi-register values use the [`codec::RegisterLayout`] of the device
//! family; the default is least-significant word first, little-endian bytes.

pub mod bus;
pub mod codec;
pub mod config;
pub mod device;
pub mod registry;
pub mod sampler;
pub mod scanner;
pub mod sim;
pub mod transport;

pub use bus::{BusError, BusReport, run_bus_pass};
pub use codec::{ByteOrder, RegisterLayout, WireType, WordOrder};
pub use config::{ConfigError, ThermoscanConfig};
pub use device::{DeviceError, DeviceHandle};
pub use registry::{VariableRegistry, VariableSpec};
pub use sampler::{SampleError, Sampler, SamplingRun};
pub use scanner::{BusScanner, ScanError};
pub use transport::{RegisterTransport, RtuTransport, TransportError};
