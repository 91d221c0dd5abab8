use std::path::Path;

use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    /// Real-run length in seconds.
    pub runtime_secs: u32,
    /// Event buffer capacity of the calibration pass.
    pub max_events: usize,
    /// Core the orchestrator pins itself to.
    pub reference_core: usize,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            runtime_secs: 70,
            max_events: 1_000_000,
            reference_core: 0,
        }
    }
}

impl MeasureConfig {
    /// Clamp fields to valid ranges.
    pub fn validate(&mut self) {
        self.runtime_secs = self.runtime_secs.clamp(1, 86_400);
        self.max_events = self.max_events.clamp(1_000, 100_000_000);
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub measure: MeasureConfig,
}

/// Load configuration from a TOML file.
///
/// - If `explicit_path` is `Some` and the file is missing, returns an error.
/// - If `explicit_path` is `None`, tries `/etc/corejitter.toml`; if missing,
///   returns defaults.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config, Error> {
    let path = match explicit_path {
        Some(p) => {
            if !p.exists() {
                return Err(Error::InvalidArgs(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            p.to_path_buf()
        }
        None => {
            let default = Path::new("/etc/corejitter.toml");
            if !default.exists() {
                return Ok(Config::default());
            }
            default.to_path_buf()
        }
    };

    let contents = std::fs::read_to_string(&path).map_err(|e| {
        Error::InvalidArgs(format!("failed to read config {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&contents).map_err(|e| {
        Error::InvalidArgs(format!("failed to parse config {}: {}", path.display(), e))
    })?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let cfg = MeasureConfig::default();
        assert_eq!(cfg.runtime_secs, 70);
        assert_eq!(cfg.max_events, 1_000_000);
        assert_eq!(cfg.reference_core, 0);
    }

    #[test]
    fn test_validate_clamps_high() {
        let mut cfg = MeasureConfig {
            runtime_secs: 1_000_000,
            max_events: 1_000_000_000,
            ..Default::default()
        };
        cfg.validate();
        assert_eq!(cfg.runtime_secs, 86_400);
        assert_eq!(cfg.max_events, 100_000_000);
    }

    #[test]
    fn test_validate_clamps_low() {
        let mut cfg = MeasureConfig {
            runtime_secs: 0,
            max_events: 0,
            ..Default::default()
        };
        cfg.validate();
        assert_eq!(cfg.runtime_secs, 1);
        assert_eq!(cfg.max_events, 1_000);
    }

    #[test]
    fn test_toml_parsing() {
        let dir = std::env::temp_dir();
        let path = dir.join("corejitter_test_config.toml");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            write!(
                f,
                r#"
[measure]
runtime_secs = 10
max_events = 50000
"#
            )
            .unwrap();
        }
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.measure.runtime_secs, 10);
        assert_eq!(config.measure.max_events, 50_000);
        // Unset fields should get defaults
        assert_eq!(config.measure.reference_core, 0);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_explicit_config_errors() {
        let path = std::path::Path::new("/tmp/corejitter_nonexistent_config.toml");
        let result = load_config(Some(path));
        assert!(result.is_err());
    }
}
