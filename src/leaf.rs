//! Leaf identity
//!
//! A leaf is one (reference table, vehicle type, brand, model, model-year)
//! combination. Its key is the unit of idempotence recorded in the checkpoint.

use crate::fetcher::normalizer::NormalizeError;
use crate::VehicleType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier for one leaf.
///
/// Format: `"{table_id}-{vehicle_type_code}-{brand_id}-{model_id}-{model_year_value}"`.
/// The model-year value is embedded verbatim, so keys stay stable across runs
/// and remain compatible with checkpoints written by earlier versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeafKey(String);

impl LeafKey {
    /// Build the key for a leaf.
    ///
    /// # Arguments
    ///
    /// * `table_id` - Reference table identifier
    /// * `vehicle_type` - Vehicle type of the leaf
    /// * `brand_id` - Opaque brand identifier
    /// * `model_id` - Opaque model identifier
    /// * `model_year_value` - Composite model-year value, exactly as listed by the API
    pub fn new(
        table_id: i64,
        vehicle_type: VehicleType,
        brand_id: &str,
        model_id: &str,
        model_year_value: &str,
    ) -> Self {
        Self(format!(
            "{}-{}-{}-{}-{}",
            table_id,
            vehicle_type.code(),
            brand_id,
            model_id,
            model_year_value
        ))
    }

    /// Key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeafKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LeafKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Model year and fuel code split out of a composite `"<year>-<fuel>"` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelYear {
    /// Model year as sent in `anoModelo`
    pub year: String,
    /// Fuel code as sent in `codigoTipoCombustivel`
    pub fuel_code: String,
}

impl ModelYear {
    /// Split a composite model-year value.
    ///
    /// The value must split on `-` into exactly two non-empty parts.
    /// Anything else is malformed and the leaf must be skipped.
    pub fn parse(composite: &str) -> Result<Self, NormalizeError> {
        let parts: Vec<&str> = composite.split('-').map(str::trim).collect();
        match parts.as_slice() {
            // "2015-" and "-1" split in two but would send an empty form field.
            [year, fuel_code] if !year.is_empty() && !fuel_code.is_empty() => Ok(Self {
                year: (*year).to_string(),
                fuel_code: (*fuel_code).to_string(),
            }),
            _ => Err(NormalizeError::MalformedModelYear(composite.to_string())),
        }
    }
}
