//! One complete discovery and sampling pass over a bus.

use thermoscan_common::Record;
use tracing::{info, warn};

use crate::device::DeviceHandle;
use crate::sampler::{SampleError, Sampler, SamplingRun};
use crate::scanner::{BusScanner, ScanError};
use crate::transport::RegisterTransport;

/// Error type for a bus pass.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Sample(#[from] SampleError),
}

impl BusError {
    /// Table defects abort the whole run; anything else only this bus.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            BusError::Scan(ScanError::Config { .. }) | BusError::Sample(SampleError::Config { .. })
        )
    }
}

/// Result of one bus pass.
#[derive(Debug, Clone)]
pub struct BusReport {
    /// Bus identity (port name).
    pub bus: String,
    /// Confirmed units, ascending address.
    pub devices: Vec<DeviceHandle>,
    /// One run per confirmed unit, same order as `devices`.
    pub runs: Vec<SamplingRun>,
}

impl BusReport {
    /// All records of this bus, device by device.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.runs.iter().flat_map(|run| run.records.iter())
    }

    /// Runs that ended early.
    pub fn failed_runs(&self) -> impl Iterator<Item = &SamplingRun> {
        self.runs.iter().filter(|run| !run.is_complete())
    }
}

/// Discover and sample every unit on `transport`, then close it.
///
/// The pass owns the transport for its whole duration. It is closed on
/// every exit path, including errors, and dropped on return.
pub async fn run_bus_pass<T: RegisterTransport>(
    mut transport: T,
    scanner: &BusScanner,
    sampler: &Sampler,
) -> Result<BusReport, BusError> {
    let result = discover_and_sample(&mut transport, scanner, sampler).await;

    if let Err(e) = transport.close().await {
        warn!(bus = %transport.bus_name(), error = %e, "Failed to close bus");
    }

    result
}

async fn discover_and_sample<T: RegisterTransport>(
    transport: &mut T,
    scanner: &BusScanner,
    sampler: &Sampler,
) -> Result<BusReport, BusError> {
    let bus = transport.bus_name().to_string();
    let devices = scanner.scan(transport).await?;
    let runs = sampler.sample_devices(transport, &devices).await?;

    info!(
        bus = %bus,
        devices = devices.len(),
        records = runs.iter().map(|r| r.records.len()).sum::<usize>(),
        "Bus pass complete"
    );

    Ok(BusReport { bus, devices, runs })
}
