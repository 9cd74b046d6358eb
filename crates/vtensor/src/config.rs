//! Sizing configuration shared by every resource descriptor.
//!
//! Defaults match the common accelerator vector width of four lanes. A config
//! can be loaded from JSON or layered from `VTENSOR_*` environment variables;
//! [`StorageConfig::global`] resolves the environment once per process.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::StorageKind;

/// How ranks above the packed four-component limit are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankPolicy {
    /// Fail with [`crate::ShapeError::RankTooLarge`].
    #[default]
    Reject,
    /// Collapse the leading axes into the batch axis.
    Fold,
}

/// Parameters consumed by [`crate::ResourceDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Lane count the padded axis is aligned to. Must be a power of two.
    pub vector_width: usize,
    pub rank_policy: RankPolicy,
    /// Storage kind used when options do not name one.
    pub default_storage: StorageKind,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            vector_width: 4,
            rank_policy: RankPolicy::Reject,
            default_storage: StorageKind::Texture3D,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("vector width must be a non-zero power of two, got {0}")]
    InvalidVectorWidth(usize),
    #[error("{var}={value:?} is not a recognised value")]
    InvalidValue { var: &'static str, value: String },
}

impl StorageConfig {
    /// Parses and validates a JSON document; missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: StorageConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Layers `VTENSOR_VECTOR_WIDTH`, `VTENSOR_RANK_POLICY` and `VTENSOR_STORAGE`
    /// over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`StorageConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = StorageConfig::default();
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(value) = var("VTENSOR_VECTOR_WIDTH") {
            config.vector_width =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        var: "VTENSOR_VECTOR_WIDTH",
                        value: value.clone(),
                    })?;
        }
        if let Some(value) = var("VTENSOR_RANK_POLICY") {
            config.rank_policy = match value.trim().to_ascii_lowercase().as_str() {
                "reject" => RankPolicy::Reject,
                "fold" => RankPolicy::Fold,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "VTENSOR_RANK_POLICY",
                        value,
                    })
                }
            };
        }
        if let Some(value) = var("VTENSOR_STORAGE") {
            config.default_storage = match value.trim().to_ascii_lowercase().as_str() {
                "texture3d" | "texture_3d" => StorageKind::Texture3D,
                "texture2d" | "texture_2d" => StorageKind::Texture2D,
                "buffer" => StorageKind::Buffer,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "VTENSOR_STORAGE",
                        value,
                    })
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.vector_width.is_power_of_two() {
            return Err(ConfigError::InvalidVectorWidth(self.vector_width));
        }
        Ok(())
    }

    /// Process-wide config resolved from the environment on first use.
    pub fn global() -> &'static StorageConfig {
        crate::env::storage_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = StorageConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StorageConfig::default());
    }

    #[test]
    fn environment_overrides_each_field() {
        let config = StorageConfig::from_lookup(lookup(&[
            ("VTENSOR_VECTOR_WIDTH", "8"),
            ("VTENSOR_RANK_POLICY", "Fold"),
            ("VTENSOR_STORAGE", "buffer"),
        ]))
        .unwrap();
        assert_eq!(config.vector_width, 8);
        assert_eq!(config.rank_policy, RankPolicy::Fold);
        assert_eq!(config.default_storage, StorageKind::Buffer);
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = StorageConfig::from_lookup(lookup(&[("VTENSOR_VECTOR_WIDTH", "  ")])).unwrap();
        assert_eq!(config.vector_width, 4);
    }

    #[test]
    fn rejects_non_power_of_two_width() {
        let err = StorageConfig::from_lookup(lookup(&[("VTENSOR_VECTOR_WIDTH", "6")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVectorWidth(6)));
    }

    #[test]
    fn rejects_unknown_policy() {
        let err = StorageConfig::from_lookup(lookup(&[("VTENSOR_RANK_POLICY", "truncate")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                var: "VTENSOR_RANK_POLICY",
                ..
            }
        ));
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = StorageConfig::from_json_str(r#"{"rank_policy": "fold"}"#).unwrap();
        assert_eq!(config.rank_policy, RankPolicy::Fold);
        assert_eq!(config.vector_width, 4);
        assert_eq!(config.default_storage, StorageKind::Texture3D);
    }

    #[test]
    fn json_rejects_zero_width() {
        let err = StorageConfig::from_json_str(r#"{"vector_width": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVectorWidth(0)));
    }
}
