//! Symbolic variable registry.
//!
//! Maps human-readable variable names to the holding registers that carry
//! them. The table is built once and then shared read-only by every device
//! on a bus.

use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::{CodecError, WireType};
use crate::config::VariableDef;

/// Device's own bus address, used for discovery.
pub const SLAVE_ADDRESS: &str = "SlaveAddress";
/// Temperature setpoint.
pub const TEMPERATURE_TARGET: &str = "TemperatureTarget";
/// Measured temperature.
pub const TEMPERATURE_DET: &str = "TemperatureDet";

/// Errors raised by registry construction and lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    #[error("Variable '{name}': {wire_type} spans {expected} register(s), table says {span}")]
    SpanMismatch {
        name: String,
        wire_type: WireType,
        span: u16,
        expected: u16,
    },
    #[error("Variable '{name}': {source}")]
    Codec {
        name: String,
        #[source]
        source: CodecError,
    },
}

/// Where and how a variable is stored on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableSpec {
    /// First holding register.
    pub address: u16,
    /// Wire representation.
    pub wire_type: WireType,
    /// Number of consecutive registers.
    pub span: u16,
}

impl VariableSpec {
    pub const fn new(address: u16, wire_type: WireType, span: u16) -> Self {
        Self {
            address,
            wire_type,
            span,
        }
    }
}

const BUILTIN: [(&str, VariableSpec); 3] = [
    (SLAVE_ADDRESS, VariableSpec::new(0x0800, WireType::UInt16, 1)),
    (
        TEMPERATURE_TARGET,
        VariableSpec::new(0x0400, WireType::Float32, 2),
    ),
    (TEMPERATURE_DET, VariableSpec::new(0x0404, WireType::Float32, 2)),
];

/// Immutable name to [`VariableSpec`] table.
#[derive(Debug, Clone)]
pub struct VariableRegistry {
    variables: HashMap<String, VariableSpec>,
}

impl VariableRegistry {
    /// The built-in sensor register map.
    pub fn builtin() -> Self {
        Self {
            variables: BUILTIN
                .iter()
                .map(|(name, spec)| (name.to_string(), *spec))
                .collect(),
        }
    }

    /// Build a registry from explicit entries, checking every span.
    pub fn from_specs<I, S>(specs: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (S, VariableSpec)>,
        S: Into<String>,
    {
        let mut variables = HashMap::new();
        for (name, spec) in specs {
            let name = name.into();
            check_span(&name, &spec)?;
            variables.insert(name, spec);
        }
        Ok(Self { variables })
    }

    /// Built-in map extended (or overridden) by configured definitions.
    pub fn with_overrides(defs: &HashMap<String, VariableDef>) -> Result<Self, RegistryError> {
        let mut registry = Self::builtin();
        for (name, def) in defs {
            let wire_type: WireType =
                def.wire_type
                    .parse()
                    .map_err(|source| RegistryError::Codec {
                        name: name.clone(),
                        source,
                    })?;
            let spec = VariableSpec::new(
                def.address,
                wire_type,
                def.count.unwrap_or_else(|| wire_type.register_count()),
            );
            check_span(name, &spec)?;
            registry.variables.insert(name.clone(), spec);
        }
        Ok(registry)
    }

    /// Look up a variable by name.
    pub fn get(&self, name: &str) -> Result<&VariableSpec, RegistryError> {
        self.variables
            .get(name)
            .ok_or_else(|| RegistryError::UnknownVariable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Variable names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.variables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Wrap in an `Arc` for sharing between device handles.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Default for VariableRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn check_span(name: &str, spec: &VariableSpec) -> Result<(), RegistryError> {
    let expected = spec.wire_type.register_count();
    if spec.span != expected {
        return Err(RegistryError::SpanMismatch {
            name: name.to_string(),
            wire_type: spec.wire_type,
            span: spec.span,
            expected,
        });
    }
    Ok(())
}
