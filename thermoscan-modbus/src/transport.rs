//! Holding-register transport.
//!
//! The discovery and sampling code only needs one primitive: read `count`
//! consecutive holding registers from a unit, or fail. [`RegisterTransport`]
//! captures that; [`RtuTransport`] implements it over a serial line with
//! `tokio-modbus`.

use std::time::Duration;

use tokio_modbus::client::{Context, Reader};
use tokio_modbus::prelude::*;
use tracing::debug;

use crate::config::SerialConfig;

/// Error type for register reads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Unit {unit}: no response within {timeout:?}")]
    Timeout { unit: u8, timeout: Duration },
    #[error("Unit {unit}: exception response {code}")]
    Exception { unit: u8, code: String },
    #[error("Unit {unit}: malformed response: {message}")]
    Protocol { unit: u8, message: String },
    #[error("Serial I/O error: {0}")]
    Io(String),
    #[error("Failed to open {port}: {message}")]
    Open { port: String, message: String },
}

impl TransportError {
    /// No device answered in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }

    /// A device answered, but not with a usable reply.
    pub fn is_bad_reply(&self) -> bool {
        matches!(
            self,
            TransportError::Exception { .. } | TransportError::Protocol { .. }
        )
    }
}

/// One shared half-duplex bus that can read holding registers.
///
/// Implementations must serialize requests; callers await each read before
/// issuing the next.
#[allow(async_fn_in_trait)]
pub trait RegisterTransport {
    /// Identity of the bus (e.g., the serial port name).
    fn bus_name(&self) -> &str;

    /// Read `count` holding registers starting at `start` from `unit`.
    async fn read_holding_registers(
        &mut self,
        unit: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    /// Release the underlying line. Further reads fail.
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl<T: RegisterTransport> RegisterTransport for &mut T {
    fn bus_name(&self) -> &str {
        (**self).bus_name()
    }

    async fn read_holding_registers(
        &mut self,
        unit: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        (**self).read_holding_registers(unit, start, count).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        (**self).close().await
    }
}

/// Modbus RTU master on a serial port.
pub struct RtuTransport {
    port: String,
    ctx: Option<Context>,
    timeout: Duration,
}

impl RtuTransport {
    /// Open a serial port and attach an RTU client to it.
    pub fn open(port: &str, serial: &SerialConfig) -> Result<Self, TransportError> {
        let parity = match serial.parity.to_lowercase().as_str() {
            "none" => tokio_serial::Parity::None,
            "odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::Even,
        };

        let stop_bits = match serial.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };

        let data_bits = match serial.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };

        let timeout = serial.response_timeout();
        let builder = tokio_serial::new(port, serial.baud_rate)
            .parity(parity)
            .stop_bits(stop_bits)
            .data_bits(data_bits)
            .timeout(timeout);

        let stream = tokio_serial::SerialStream::open(&builder).map_err(|e| TransportError::Open {
            port: port.to_string(),
            message: e.to_string(),
        })?;

        debug!(
            port = %port,
            baud_rate = serial.baud_rate,
            parity = %serial.parity,
            "Opened serial port"
        );

        Ok(Self {
            port: port.to_string(),
            ctx: Some(rtu::attach(stream)),
            timeout,
        })
    }
}

impl RegisterTransport for RtuTransport {
    fn bus_name(&self) -> &str {
        &self.port
    }

    async fn read_holding_registers(
        &mut self,
        unit: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let timeout = self.timeout;
        let ctx = self
            .ctx
            .as_mut()
            .ok_or_else(|| TransportError::Io(format!("{} is closed", self.port)))?;

        ctx.set_slave(Slave(unit));

        let response = tokio::time::timeout(timeout, ctx.read_holding_registers(start, count))
            .await
            .map_err(|_| TransportError::Timeout { unit, timeout })?;

        #[allow(unreachable_patterns)]
        let words = match response {
            Ok(Ok(words)) => words,
            Ok(Err(exception)) => {
                return Err(TransportError::Exception {
                    unit,
                    code: format!("{:?}", exception),
                });
            }
            Err(tokio_modbus::Error::Transport(e)) if e.kind() == std::io::ErrorKind::TimedOut => {
                return Err(TransportError::Timeout { unit, timeout });
            }
            Err(tokio_modbus::Error::Transport(e)) => {
                return Err(TransportError::Io(e.to_string()));
            }
            Err(e) => {
                return Err(TransportError::Protocol {
                    unit,
                    message: e.to_string(),
                });
            }
        };

        if words.len() != usize::from(count) {
            return Err(TransportError::Protocol {
                unit,
                message: format!("expected {} registers, got {}", count, words.len()),
            });
        }

        Ok(words)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // Dropping the context closes the serial stream.
        if self.ctx.take().is_some() {
            debug!(port = %self.port, "Closed serial port");
        }
        Ok(())
    }
}

/// List the serial ports present on this host, sorted by name.
pub fn available_ports() -> Result<Vec<String>, TransportError> {
    let mut ports: Vec<String> = tokio_serial::available_ports()
        .map_err(|e| TransportError::Io(e.to_string()))?
        .into_iter()
        .map(|info| info.port_name)
        .collect();
    ports.sort();
    Ok(ports)
}
