//! Run configuration shared by the build and join drivers.

use crate::aggregator::AggregationMode;
use crate::channel::AnodeMap;
use crate::event::{ProcessClass, N_PROCESS_CLASSES};
use crate::record::DEFAULT_TABLE_NAME;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Default number of stores kept open by the join driver.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Default number of photons emitted per simulated event.
pub const DEFAULT_PHOTONS_PER_EVENT: f64 = 1e7;

/// Configuration for building and joining visibility maps.
///
/// Every field has a default, so partial JSON documents are accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisConfig {
    /// Photons emitted per simulated event (normalization constant).
    pub photons_per_event: f64,
    /// Process class counted as direct light.
    pub direct_process: u8,
    /// Process class counted as wavelength-shifted light.
    pub wls_process: u8,
    /// Per-sensor accumulation convention.
    pub mode: AggregationMode,
    /// Anode identifier → region lookup.
    pub anodes: AnodeMap,
    /// Maximum number of stores kept open at once.
    pub cache_capacity: usize,
    /// Table expected inside every record store.
    pub table_name: String,
}

impl Default for VisConfig {
    fn default() -> Self {
        Self {
            photons_per_event: DEFAULT_PHOTONS_PER_EVENT,
            direct_process: ProcessClass::Direct as u8,
            wls_process: ProcessClass::WavelengthShifted as u8,
            mode: AggregationMode::Incremental,
            anodes: AnodeMap::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }
}

impl VisConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::ConfigError(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::ConfigError(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the string cannot be parsed or fails validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges.
    ///
    /// Called automatically when loading from JSON. For programmatically
    /// built configs, call this before processing.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if !(self.photons_per_event.is_finite() && self.photons_per_event > 0.0) {
            return Err(Error::ConfigError(format!(
                "photons_per_event must be positive, got {}",
                self.photons_per_event
            )));
        }
        for (name, class) in [
            ("direct_process", self.direct_process),
            ("wls_process", self.wls_process),
        ] {
            if usize::from(class) >= N_PROCESS_CLASSES || class == ProcessClass::Total as u8 {
                return Err(Error::ConfigError(format!(
                    "{name} must be in 1..{N_PROCESS_CLASSES}, got {class}"
                )));
            }
        }
        if self.cache_capacity == 0 {
            return Err(Error::ConfigError(
                "cache_capacity must be at least 1".to_string(),
            ));
        }
        if self.table_name.is_empty() {
            return Err(Error::ConfigError("table_name must not be empty".to_string()));
        }
        self.anodes.validate()
    }

    /// Set the normalization constant.
    #[must_use]
    pub fn with_photons_per_event(mut self, photons: f64) -> Self {
        self.photons_per_event = photons;
        self
    }

    /// Set the aggregation mode.
    #[must_use]
    pub fn with_mode(mut self, mode: AggregationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the store cache capacity.
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set the expected table name.
    #[must_use]
    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VisConfig::default();
        assert_eq!(config.photons_per_event, 1e7);
        assert_eq!(config.direct_process, 4);
        assert_eq!(config.wls_process, 3);
        assert_eq!(config.mode, AggregationMode::Incremental);
        assert_eq!(config.cache_capacity, 100);
        assert_eq!(config.table_name, "photonLib");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_partial_config() {
        let json = r#"{ "mode": "batch", "photons_per_event": 5e6 }"#;
        let config = VisConfig::from_json(json).expect("should parse partial config");
        assert_eq!(config.mode, AggregationMode::Batch);
        assert_eq!(config.photons_per_event, 5e6);
        assert_eq!(config.anodes, AnodeMap::default());
    }

    #[test]
    fn test_json_custom_anodes() {
        let json = r#"{ "anodes": { "main": 1, "edge0": 2, "edge1": 3, "ignored": [] } }"#;
        let config = VisConfig::from_json(json).unwrap();
        assert_eq!(config.anodes.main, 1);
        assert!(config.anodes.ignored.is_empty());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = VisConfig::from_json(r#"{ "cache_capacity": 0 }"#).unwrap_err();
        assert!(err.to_string().contains("cache_capacity"), "{err}");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(VisConfig::default()
            .with_photons_per_event(0.0)
            .validate()
            .is_err());
        assert!(VisConfig::from_json(r#"{ "wls_process": 6 }"#).is_err());
        assert!(VisConfig::from_json(r#"{ "direct_process": 0 }"#).is_err());
        assert!(VisConfig::from_json(r#"{ "table_name": "" }"#).is_err());
    }
}
