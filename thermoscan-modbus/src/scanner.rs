//! Bus discovery.
//!
//! Probes unit addresses in ascending order and keeps those whose
//! self-reported `SlaveAddress` matches the address they were probed at.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::codec::RegisterLayout;
use crate::device::{DeviceError, DeviceHandle};
use crate::registry::{SLAVE_ADDRESS, VariableRegistry};
use crate::transport::{RegisterTransport, TransportError};

/// Highest unit address the protocol allows.
pub const MAX_UNIT_ADDRESS: u8 = 247;

/// Error type for discovery.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Variable table or codec defect; cannot be caused by the bus.
    #[error("Bus {bus}: {source}")]
    Config {
        bus: String,
        #[source]
        source: DeviceError,
    },
    /// The line itself failed (not a missing or misbehaving unit).
    #[error("Bus {bus}: {source}")]
    Transport {
        bus: String,
        #[source]
        source: TransportError,
    },
}

/// Result of probing a single address.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// The unit answered with its own address.
    Confirmed,
    /// Nothing answered.
    Absent,
    /// Something answered with a different address.
    Inconsistent { reported: String },
    /// Something answered with an exception or a malformed frame.
    BadReply(TransportError),
}

/// Discovers live units on a bus.
#[derive(Debug, Clone)]
pub struct BusScanner {
    registry: Arc<VariableRegistry>,
    layout: RegisterLayout,
    max_address: u8,
}

impl BusScanner {
    /// `max_address` is capped at [`MAX_UNIT_ADDRESS`].
    pub fn new(registry: Arc<VariableRegistry>, layout: RegisterLayout, max_address: u8) -> Self {
        Self {
            registry,
            layout,
            max_address: max_address.min(MAX_UNIT_ADDRESS),
        }
    }

    pub fn max_address(&self) -> u8 {
        self.max_address
    }

    /// Probe one address.
    pub async fn probe<T: RegisterTransport>(
        &self,
        transport: &mut T,
        device: &DeviceHandle,
    ) -> Result<ProbeOutcome, ScanError> {
        match device.read_variable(transport, SLAVE_ADDRESS).await {
            Ok(value) if value.as_u64() == Some(u64::from(device.address())) => {
                Ok(ProbeOutcome::Confirmed)
            }
            Ok(value) => Ok(ProbeOutcome::Inconsistent {
                reported: value.to_string(),
            }),
            Err(DeviceError::Transport(e)) if e.is_timeout() => Ok(ProbeOutcome::Absent),
            Err(DeviceError::Transport(e)) if e.is_bad_reply() => Ok(ProbeOutcome::BadReply(e)),
            Err(DeviceError::Transport(e)) => Err(ScanError::Transport {
                bus: device.bus().to_string(),
                source: e,
            }),
            Err(e) => Err(ScanError::Config {
                bus: device.bus().to_string(),
                source: e,
            }),
        }
    }

    /// Scan `1..=max_address` and return the confirmed units in ascending
    /// address order.
    pub async fn scan<T: RegisterTransport>(
        &self,
        transport: &mut T,
    ) -> Result<Vec<DeviceHandle>, ScanError> {
        let bus = transport.bus_name().to_string();
        info!(bus = %bus, max_address = self.max_address, "Searching bus");

        let mut found = Vec::new();
        for address in 1..=self.max_address {
            let device =
                DeviceHandle::new(bus.clone(), address, self.registry.clone(), self.layout);

            match self.probe(transport, &device).await? {
                ProbeOutcome::Confirmed => {
                    debug!(device = %device, "Unit confirmed");
                    found.push(device);
                }
                ProbeOutcome::Absent => {
                    debug!(device = %device, "No response");
                }
                ProbeOutcome::Inconsistent { reported } => {
                    warn!(
                        device = %device,
                        reported = %reported,
                        "Unit reported a different address, discarding"
                    );
                }
                ProbeOutcome::BadReply(e) => {
                    debug!(device = %device, error = %e, "Unusable reply, discarding");
                }
            }
        }

        info!(
            bus = %bus,
            units = ?found.iter().map(DeviceHandle::address).collect::<Vec<_>>(),
            "Found units"
        );

        Ok(found)
    }
}
