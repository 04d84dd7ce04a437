//! Modeler configuration
//!
//! Settings for both backends, stored as RON. Every field has a default, so
//! a configuration file only needs the values it changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// HFSS backend settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HfssConfig {
    /// Design to attach to
    pub design_name: String,
}

impl Default for HfssConfig {
    fn default() -> Self {
        Self {
            design_name: "HFSSDesign1".to_string(),
        }
    }
}

/// GDS backend settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GdsConfig {
    /// Library name written to the stream
    pub library: String,
    /// Top cell name
    pub cell: String,
    /// User unit in metres
    pub unit: f64,
    /// Database unit in metres
    pub precision: f64,
    /// Points per rounded corner
    pub fillet_points: usize,
}

impl Default for GdsConfig {
    fn default() -> Self {
        Self {
            library: "LIB".to_string(),
            cell: "TOP".to_string(),
            unit: 1e-6,
            precision: 1e-9,
            fillet_points: 8,
        }
    }
}

/// Complete modeler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelerConfig {
    /// Backend mode, `"hfss"` or `"gds"`
    pub mode: String,
    /// Directory for generated artifacts
    pub output_dir: PathBuf,
    pub hfss: HfssConfig,
    pub gds: GdsConfig,
}

impl Default for ModelerConfig {
    fn default() -> Self {
        Self {
            mode: "gds".to_string(),
            output_dir: PathBuf::from("out"),
            hfss: HfssConfig::default(),
            gds: GdsConfig::default(),
        }
    }
}

impl ModelerConfig {
    /// Load configuration from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_ron_str(&content)
    }

    /// Parse configuration from RON text
    pub fn from_ron_str(content: &str) -> Result<Self, ConfigError> {
        ron::from_str(content).map_err(|e| ConfigError::Deserialize(e.to_string()))
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_ron_string()?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Serialize configuration to RON text
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = ModelerConfig::from_ron_str("(mode: \"hfss\", gds: (cell: \"CHIP\"))").unwrap();
        assert_eq!(config.mode, "hfss");
        assert_eq!(config.gds.cell, "CHIP");
        assert_eq!(config.gds.library, "LIB");
        assert_eq!(config.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modeler.ron");

        let mut config = ModelerConfig::default();
        config.gds.fillet_points = 16;
        config.save(&path).unwrap();

        assert_eq!(ModelerConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_ron() {
        let err = ModelerConfig::from_ron_str("(mode: 3").unwrap_err();
        assert!(matches!(err, ConfigError::Deserialize(_)));
    }
}
