//! # Datapoint Registry
//!
//! Static table of the datapoints a heating system exposes. Every datapoint is
//! addressed on the bus by its function group, function number and 16-bit id,
//! and by a unique name on the MQTT side.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::payload::{DataType, Value};

/// Inclusive bounds a decoded value must respect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub lower: f64,
    pub upper: f64,
}

impl Limits {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// A named, typed variable exposed by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub name: String,
    pub function_group: u8,
    pub function_number: u8,
    pub datapoint_id: u16,
    pub datatype: DataType,
    #[serde(default)]
    pub limits: Option<Limits>,
    #[serde(default)]
    pub periodic: bool,
    #[serde(default)]
    pub unit: Option<String>,
}

impl Datapoint {
    /// The datapoint id as sent on the wire (big-endian).
    pub fn id_bytes(&self) -> [u8; 2] {
        self.datapoint_id.to_be_bytes()
    }

    pub fn key(&self) -> DatapointKey {
        (self.function_group, self.function_number, self.datapoint_id)
    }

    /// Checks a decoded value against the declared limits.
    ///
    /// Values without a numeric view are never limited.
    pub fn check_limits(&self, value: &Value) -> Result<(), GatewayError> {
        match (self.limits, value.as_f64()) {
            (Some(limits), Some(v)) if !limits.contains(v) => Err(GatewayError::OutOfLimits {
                datapoint: self.name.clone(),
                value: v,
                lower: limits.lower,
                upper: limits.upper,
            }),
            _ => Ok(()),
        }
    }
}

/// (function group, function number, datapoint id)
pub type DatapointKey = (u8, u8, u16);

/// Lookup service over the configured datapoints.
#[derive(Debug, Default, Clone)]
pub struct DatapointRegistry {
    datapoints: Vec<Arc<Datapoint>>,
    by_id: HashMap<DatapointKey, usize>,
    by_name: HashMap<String, usize>,
}

impl DatapointRegistry {
    /// Builds the registry, rejecting duplicate keys, duplicate names and
    /// invalid declared types.
    pub fn from_definitions(definitions: Vec<Datapoint>) -> Result<Self, GatewayError> {
        let mut registry = DatapointRegistry::default();
        for datapoint in definitions {
            datapoint.datatype.validate().map_err(|e| {
                GatewayError::Settings(format!("datapoint {}: {e}", datapoint.name))
            })?;
            if let Some(limits) = datapoint.limits {
                if limits.lower > limits.upper {
                    return Err(GatewayError::Settings(format!(
                        "datapoint {}: lower limit above upper limit",
                        datapoint.name
                    )));
                }
            }

            let index = registry.datapoints.len();
            if registry.by_id.insert(datapoint.key(), index).is_some() {
                return Err(GatewayError::Settings(format!(
                    "duplicate datapoint id {:?} ({})",
                    datapoint.key(),
                    datapoint.name
                )));
            }
            if registry.by_name.insert(datapoint.name.clone(), index).is_some() {
                return Err(GatewayError::Settings(format!(
                    "duplicate datapoint name {}",
                    datapoint.name
                )));
            }
            registry.datapoints.push(Arc::new(datapoint));
        }
        Ok(registry)
    }

    pub fn lookup_by_id(
        &self,
        function_group: u8,
        function_number: u8,
        datapoint_id: u16,
    ) -> Option<Arc<Datapoint>> {
        self.by_id
            .get(&(function_group, function_number, datapoint_id))
            .map(|&i| self.datapoints[i].clone())
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<Datapoint>> {
        self.by_name.get(name).map(|&i| self.datapoints[i].clone())
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<Datapoint>> {
        self.datapoints.iter()
    }

    /// Datapoints flagged for periodic polling.
    pub fn periodic(&self) -> impl Iterator<Item = &Arc<Datapoint>> {
        self.datapoints.iter().filter(|d| d.periodic)
    }

    pub fn len(&self) -> usize {
        self.datapoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datapoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outside_temperature() -> Datapoint {
        Datapoint {
            name: "outside_temperature".into(),
            function_group: 0,
            function_number: 0,
            datapoint_id: 0,
            datatype: DataType::Signed { bits: 16, factor: 10 },
            limits: Some(Limits { lower: -40.0, upper: 60.0 }),
            periodic: true,
            unit: Some("°C".into()),
        }
    }

    fn water_setpoint() -> Datapoint {
        Datapoint {
            name: "water_setpoint".into(),
            function_group: 2,
            function_number: 0,
            datapoint_id: 5,
            datatype: DataType::Unsigned { bits: 8, factor: 1 },
            limits: None,
            periodic: false,
            unit: None,
        }
    }

    #[test]
    fn test_lookups() {
        let registry =
            DatapointRegistry::from_definitions(vec![outside_temperature(), water_setpoint()])
                .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup_by_id(2, 0, 5).unwrap().name, "water_setpoint");
        assert_eq!(registry.lookup_by_name("outside_temperature").unwrap().datapoint_id, 0);
        assert!(registry.lookup_by_id(2, 0, 6).is_none());
        assert!(registry.lookup_by_name("missing").is_none());
        assert_eq!(registry.periodic().count(), 1);
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut twin = water_setpoint();
        twin.name = "other".into();
        assert!(DatapointRegistry::from_definitions(vec![water_setpoint(), twin]).is_err());

        let mut same_name = outside_temperature();
        same_name.datapoint_id = 99;
        assert!(
            DatapointRegistry::from_definitions(vec![outside_temperature(), same_name]).is_err()
        );
    }

    #[test]
    fn test_limits_inclusive() {
        let dp = outside_temperature();
        assert!(dp.check_limits(&Value::Decimal(-40.0)).is_ok());
        assert!(dp.check_limits(&Value::Decimal(60.0)).is_ok());
        assert!(matches!(
            dp.check_limits(&Value::Decimal(60.1)),
            Err(GatewayError::OutOfLimits { .. })
        ));
        assert!(dp.check_limits(&Value::Text("n/a".into())).is_ok());
    }

    #[test]
    fn test_id_bytes_big_endian() {
        let mut dp = water_setpoint();
        dp.datapoint_id = 0x1234;
        assert_eq!(dp.id_bytes(), [0x12, 0x34]);
    }
}
