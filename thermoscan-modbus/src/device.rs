//! A single addressable unit on a bus.

use std::fmt;
use std::sync::Arc;

use thermoscan_common::DecodedValue;
use tracing::trace;

use crate::codec::{CodecError, RegisterLayout};
use crate::registry::{RegistryError, VariableRegistry};
use crate::transport::{RegisterTransport, TransportError};

/// Error type for variable reads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DeviceError {
    /// The unit did not answer in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DeviceError::Transport(e) if e.is_timeout())
    }

    /// A defect in the variable table or codec; never caused by the bus.
    pub fn is_config(&self) -> bool {
        matches!(self, DeviceError::Registry(_) | DeviceError::Codec(_))
    }
}

/// Handle to one unit on one bus.
///
/// The handle carries no transport; every read borrows the bus's transport
/// so that all handles on a bus share it one request at a time.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    bus: String,
    address: u8,
    registry: Arc<VariableRegistry>,
    layout: RegisterLayout,
}

impl DeviceHandle {
    pub fn new(
        bus: impl Into<String>,
        address: u8,
        registry: Arc<VariableRegistry>,
        layout: RegisterLayout,
    ) -> Self {
        Self {
            bus: bus.into(),
            address,
            registry,
            layout,
        }
    }

    pub fn bus(&self) -> &str {
        &self.bus
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Label used in records: `<bus>:<address>`.
    pub fn label(&self) -> String {
        format!("{}:{}", self.bus, self.address)
    }

    /// Read and decode a named variable.
    ///
    /// No retries: a timeout is returned to the caller as-is.
    pub async fn read_variable<T: RegisterTransport>(
        &self,
        transport: &mut T,
        name: &str,
    ) -> Result<DecodedValue, DeviceError> {
        debug_assert_eq!(transport.bus_name(), self.bus);

        let spec = *self.registry.get(name)?;
        let registers = transport
            .read_holding_registers(self.address, spec.address, spec.span)
            .await?;
        if registers.len() != usize::from(spec.span) {
            return Err(TransportError::Protocol {
                unit: self.address,
                message: format!(
                    "expected {} registers, got {}",
                    spec.span,
                    registers.len()
                ),
            }
            .into());
        }
        let value = self.layout.decode_registers(&registers, spec.wire_type)?;

        trace!(
            device = %self,
            variable = name,
            registers = ?registers,
            value = %value,
            "Read variable"
        );

        Ok(value)
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bus, self.address)
    }
}
