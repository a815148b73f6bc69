//! Repeated sampling of discovered units.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thermoscan_common::Record;
use tracing::{debug, error, info};

use crate::device::{DeviceError, DeviceHandle};
use crate::transport::RegisterTransport;

/// Upper bound on records reserved up front for one run.
const MAX_PREALLOCATED_RECORDS: usize = 1024;

/// Error type for sampling.
///
/// Only table defects are errors here; a unit that stops answering is
/// reported in its [`SamplingRun`].
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("Device {device}: {source}")]
    Config {
        device: String,
        #[source]
        source: DeviceError,
    },
}

/// Outcome of sampling one unit.
#[derive(Debug, Clone)]
pub struct SamplingRun {
    /// Device label, `<bus>:<address>`.
    pub device: String,
    /// Wall-clock start of the run.
    pub started_at: DateTime<Utc>,
    /// Time spent on the run.
    pub elapsed: Duration,
    /// Records in generation order.
    pub records: Vec<Record>,
    /// The failure that cut the run short, if any.
    pub error: Option<DeviceError>,
}

impl SamplingRun {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Reads a fixed list of variables from each unit, `iterations` times.
#[derive(Debug, Clone)]
pub struct Sampler {
    variables: Vec<String>,
    iterations: u32,
}

impl Sampler {
    pub fn new(variables: Vec<String>, iterations: u32) -> Self {
        Self {
            variables,
            iterations,
        }
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Sample a single unit.
    ///
    /// The first transport failure ends the run; the records taken before it
    /// are kept.
    pub async fn sample_device<T: RegisterTransport>(
        &self,
        transport: &mut T,
        device: &DeviceHandle,
    ) -> Result<SamplingRun, SampleError> {
        let label = device.label();
        let started_at = Utc::now();
        let start = Instant::now();
        let expected = (self.iterations as usize).saturating_mul(self.variables.len());
        let mut records = Vec::with_capacity(expected.min(MAX_PREALLOCATED_RECORDS));
        let mut failure = None;

        'iterations: for iteration in 0..self.iterations {
            for variable in &self.variables {
                match device.read_variable(transport, variable).await {
                    Ok(value) => {
                        debug!(device = %label, iteration, variable = %variable, value = %value, "Sample");
                        records.push(Record::new(iteration, label.clone(), variable.clone(), value));
                    }
                    Err(e) if e.is_config() => {
                        return Err(SampleError::Config {
                            device: label,
                            source: e,
                        });
                    }
                    Err(e) => {
                        error!(
                            device = %label,
                            iteration,
                            variable = %variable,
                            error = %e,
                            "Sampling aborted"
                        );
                        failure = Some(e);
                        break 'iterations;
                    }
                }
            }
        }

        let elapsed = start.elapsed();
        info!(
            device = %label,
            records = records.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Time used"
        );

        Ok(SamplingRun {
            device: label,
            started_at,
            elapsed,
            records,
            error: failure,
        })
    }

    /// Sample units one after another, in the order given.
    ///
    /// A unit that fails does not stop the others.
    pub async fn sample_devices<T: RegisterTransport>(
        &self,
        transport: &mut T,
        devices: &[DeviceHandle],
    ) -> Result<Vec<SamplingRun>, SampleError> {
        let mut runs = Vec::with_capacity(devices.len());
        for device in devices {
            runs.push(self.sample_device(transport, device).await?);
        }
        Ok(runs)
    }
}

impl Default for Sampler {
    fn default() -> Self {
        let defaults = crate::config::SamplingConfig::default();
        Self::new(defaults.variables, defaults.iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RegisterLayout;
    use crate::registry::{TEMPERATURE_DET, TEMPERATURE_TARGET, VariableRegistry};
    use crate::sim::SimulatedBus;
    use thermoscan_common::DecodedValue;

    fn device(address: u8) -> DeviceHandle {
        DeviceHandle::new(
            "sim0",
            address,
            VariableRegistry::builtin().shared(),
            RegisterLayout::default(),
        )
    }

    fn sampler(iterations: u32) -> Sampler {
        Sampler::new(
            vec![TEMPERATURE_DET.to_string(), TEMPERATURE_TARGET.to_string()],
            iterations,
        )
    }

    #[tokio::test]
    async fn test_record_order() {
        let mut bus = SimulatedBus::new("sim0").with_sensor(1, 20.5, 22.0);

        let run = sampler(3).sample_device(&mut bus, &device(1)).await.unwrap();

        assert!(run.is_complete());
        let order: Vec<(u32, &str)> = run
            .records
            .iter()
            .map(|r| (r.iteration, r.variable.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, TEMPERATURE_DET),
                (0, TEMPERATURE_TARGET),
                (1, TEMPERATURE_DET),
                (1, TEMPERATURE_TARGET),
                (2, TEMPERATURE_DET),
                (2, TEMPERATURE_TARGET),
            ]
        );
        assert!(run.records.iter().all(|r| r.device == "sim0:1"));
        assert_eq!(run.records[0].value, DecodedValue::Float32(20.5));
        assert_eq!(run.records[1].value, DecodedValue::Float32(22.0));
    }

    #[tokio::test]
    async fn test_timeout_stops_device() {
        let mut bus = SimulatedBus::new("sim0")
            .with_sensor(1, 20.0, 21.0)
            .fail_after(1, 1);

        let run = sampler(3).sample_device(&mut bus, &device(1)).await.unwrap();

        assert_eq!(run.records.len(), 1);
        assert!(run.error.as_ref().is_some_and(DeviceError::is_timeout));
        // No reads after the failing one
        assert_eq!(bus.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_huge_iteration_count_on_silent_unit() {
        let mut bus = SimulatedBus::new("sim0");

        let run = sampler(u32::MAX)
            .sample_device(&mut bus, &device(1))
            .await
            .unwrap();

        assert!(run.records.is_empty());
        assert!(run.error.as_ref().is_some_and(DeviceError::is_timeout));
        assert!(run.started_at <= Utc::now());
        assert_eq!(bus.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_variable_aborts() {
        let mut bus = SimulatedBus::new("sim0").with_sensor(1, 20.0, 21.0);
        let sampler = Sampler::new(vec!["Humidity".to_string()], 2);

        let err = sampler
            .sample_device(&mut bus, &device(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SampleError::Config { .. }));
    }

    #[tokio::test]
    async fn test_zero_iterations() {
        let mut bus = SimulatedBus::new("sim0").with_sensor(1, 20.0, 21.0);

        let run = sampler(0).sample_device(&mut bus, &device(1)).await.unwrap();
        assert!(run.records.is_empty());
        assert!(run.is_complete());
        assert!(bus.requests().is_empty());
    }

    #[test]
    fn test_default_sampler() {
        let sampler = Sampler::default();
        assert_eq!(sampler.iterations(), 100);
        assert_eq!(sampler.variables(), &[TEMPERATURE_DET, TEMPERATURE_TARGET]);
    }
}
