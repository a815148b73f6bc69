//! In-process simulated bus.
//!
//! Answers holding-register reads the way a bus of real sensors would,
//! without any serial hardware. Used by `thermoscan --simulate` and by the
//! tests.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use thermoscan_common::DecodedValue;

use crate::codec::RegisterLayout;
use crate::registry::{SLAVE_ADDRESS, TEMPERATURE_DET, TEMPERATURE_TARGET, VariableRegistry};
use crate::transport::{RegisterTransport, TransportError};

/// A simulated unit: a sparse holding-register map.
#[derive(Debug, Clone, Default)]
struct SimUnit {
    registers: HashMap<u16, u16>,
    /// Successful reads served before the unit falls silent.
    reads_left: Option<usize>,
}

/// A simulated half-duplex bus.
#[derive(Debug, Clone)]
pub struct SimulatedBus {
    name: String,
    layout: RegisterLayout,
    registry: VariableRegistry,
    response_timeout: Duration,
    units: BTreeMap<u8, SimUnit>,
    requests: Vec<(u8, u16, u16)>,
    closed: bool,
}

impl SimulatedBus {
    /// An empty bus; every unit times out.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layout: RegisterLayout::default(),
            registry: VariableRegistry::builtin(),
            response_timeout: Duration::from_millis(1),
            units: BTreeMap::new(),
            requests: Vec::new(),
            closed: false,
        }
    }

    /// A small demo bus: sensors at units 1 and 5, and a unit at 9 whose
    /// reported address is wrong.
    pub fn demo(name: impl Into<String>, layout: RegisterLayout, timeout: Duration) -> Self {
        Self::new(name)
            .with_layout(layout)
            .with_response_timeout(timeout)
            .with_sensor(1, 21.75, 22.0)
            .with_sensor(5, 36.5, 37.0)
            .with_misreporting_sensor(9, 99)
    }

    /// Register layout used to encode values placed on this bus.
    pub fn with_layout(mut self, layout: RegisterLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Time an absent unit takes to "time out".
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Add a consistent sensor with the given temperatures.
    pub fn with_sensor(self, unit: u8, detected: f32, target: f32) -> Self {
        self.with_variable(unit, SLAVE_ADDRESS, DecodedValue::UInt16(u16::from(unit)))
            .with_variable(unit, TEMPERATURE_DET, DecodedValue::Float32(detected))
            .with_variable(unit, TEMPERATURE_TARGET, DecodedValue::Float32(target))
    }

    /// Add a unit that answers at `unit` but reports `reported` as its address.
    pub fn with_misreporting_sensor(self, unit: u8, reported: u16) -> Self {
        self.with_variable(unit, SLAVE_ADDRESS, DecodedValue::UInt16(reported))
            .with_variable(unit, TEMPERATURE_DET, DecodedValue::Float32(0.0))
            .with_variable(unit, TEMPERATURE_TARGET, DecodedValue::Float32(0.0))
    }

    /// Store a value in the registers of a registry variable.
    ///
    /// Unknown variable names leave the bus unchanged.
    pub fn with_variable(self, unit: u8, name: &str, value: DecodedValue) -> Self {
        let Some(address) = self.registry.get(name).ok().map(|spec| spec.address) else {
            return self;
        };
        let words = self.layout.encode(value);
        self.with_registers(unit, address, &words)
    }

    /// Store raw register words starting at `address`.
    pub fn with_registers(mut self, unit: u8, address: u16, words: &[u16]) -> Self {
        let entry = self.units.entry(unit).or_default();
        for (offset, word) in words.iter().enumerate() {
            entry
                .registers
                .insert(address.wrapping_add(offset as u16), *word);
        }
        self
    }

    /// Let `unit` answer `reads` more requests, then fall silent.
    pub fn fail_after(mut self, unit: u8, reads: usize) -> Self {
        self.units.entry(unit).or_default().reads_left = Some(reads);
        self
    }

    /// Every request seen so far, as `(unit, start, count)`.
    pub fn requests(&self) -> &[(u8, u16, u16)] {
        &self.requests
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl RegisterTransport for SimulatedBus {
    fn bus_name(&self) -> &str {
        &self.name
    }

    async fn read_holding_registers(
        &mut self,
        unit: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        if self.closed {
            return Err(TransportError::Io(format!("{} is closed", self.name)));
        }
        self.requests.push((unit, start, count));

        let timeout = self.response_timeout;
        let answering = match self.units.get_mut(&unit) {
            Some(sim) if sim.reads_left == Some(0) => None,
            Some(sim) => {
                if let Some(left) = sim.reads_left.as_mut() {
                    *left -= 1;
                }
                Some(sim)
            }
            None => None,
        };

        let Some(sim) = answering else {
            tokio::time::sleep(timeout).await;
            return Err(TransportError::Timeout { unit, timeout });
        };

        (0..count)
            .map(|offset| {
                sim.registers
                    .get(&start.wrapping_add(offset))
                    .copied()
                    .ok_or_else(|| TransportError::Exception {
                        unit,
                        code: "IllegalDataAddress".to_string(),
                    })
            })
            .collect()
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sensor_registers() {
        let mut bus = SimulatedBus::new("sim0").with_sensor(3, 8.0, 20.0);

        assert_eq!(
            bus.read_holding_registers(3, 0x0800, 1).await.unwrap(),
            vec![3]
        );
        assert_eq!(
            bus.read_holding_registers(3, 0x0404, 2).await.unwrap(),
            vec![0x0000, 0x4100]
        );
        assert_eq!(bus.requests(), &[(3, 0x0800, 1), (3, 0x0404, 2)]);
    }

    #[tokio::test]
    async fn test_absent_unit_times_out() {
        let mut bus = SimulatedBus::new("sim0");
        let err = bus.read_holding_registers(1, 0x0800, 1).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_unmapped_register_is_exception() {
        let mut bus = SimulatedBus::new("sim0").with_sensor(1, 20.0, 20.0);
        let err = bus.read_holding_registers(1, 0x0900, 1).await.unwrap_err();
        assert!(matches!(err, TransportError::Exception { unit: 1, .. }));
    }

    #[tokio::test]
    async fn test_fail_after() {
        let mut bus = SimulatedBus::new("sim0")
            .with_sensor(2, 20.0, 20.0)
            .fail_after(2, 1);

        assert!(bus.read_holding_registers(2, 0x0800, 1).await.is_ok());
        assert!(
            bus.read_holding_registers(2, 0x0800, 1)
                .await
                .unwrap_err()
                .is_timeout()
        );
    }

    #[tokio::test]
    async fn test_close() {
        let mut bus = SimulatedBus::new("sim0").with_sensor(1, 20.0, 20.0);
        bus.close().await.unwrap();

        assert!(bus.is_closed());
        assert!(matches!(
            bus.read_holding_registers(1, 0x0800, 1).await,
            Err(TransportError::Io(_))
        ));
    }
}
