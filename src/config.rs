use crate::error::{CropError, Result};
use dialoguer::Input;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub ideal_conditions: IdealConditionsConfig,
    #[serde(default)]
    pub poller: PollerConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5001".into(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelConfig {
    pub path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("model/crop_model.json"),
        }
    }
}

/// Where the ideal-conditions table comes from. Without a file the table is
/// fetched from the sensor API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct IdealConditionsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PollerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    10
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl Config {
    /// Load from an explicit path, or from the first standard location that
    /// exists. Without any config file the defaults are used.
    pub fn load(config_override: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_override {
            Some(p) => {
                if !p.exists() {
                    return Err(CropError::Config(format!(
                        "Config file not found at {:?}",
                        p
                    )));
                }
                p
            }
            None => match Self::find_config_path() {
                Some(p) => p,
                None => {
                    tracing::debug!("no config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        tracing::debug!(path = %config_path.display(), "loading configuration");
        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| CropError::Config(format!("Failed to read config: {}", e)))?;

        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // Substitute environment variables
        let content = Self::substitute_env_vars(content)?;

        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| CropError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(CropError::Config("api.base_url must not be empty".into()));
        }
        if self.poller.interval_secs == 0 {
            return Err(CropError::Config(
                "poller.interval_secs must be at least 1".into(),
            ));
        }
        if self.api.timeout_secs == 0 {
            return Err(CropError::Config("api.timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    /// Search for config.yaml in standard locations.
    fn find_config_path() -> Option<PathBuf> {
        // Try current directory first
        let local_config = PathBuf::from("config/config.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        // Then the XDG config directory
        dirs::config_dir()
            .map(|dir| dir.join("cropadvisor").join("config.yaml"))
            .filter(|p| p.exists())
    }

    /// Default path for writing new config files (~/.config/cropadvisor/config.yaml).
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CropError::Config("Cannot determine config directory".into()))?
            .join("cropadvisor");
        Ok(config_dir.join("config.yaml"))
    }

    /// Run interactive setup prompts and write config to disk.
    /// Returns the new Config and the path it was written to.
    pub fn setup_interactive() -> Result<(Self, PathBuf)> {
        println!();
        println!("Let's set up the crop advisor!");
        println!();

        let defaults = Config::default();

        println!("Sensor API");
        let base_url: String = Input::new()
            .with_prompt("  Base URL")
            .default(defaults.api.base_url.clone())
            .interact_text()
            .map_err(|e| CropError::Config(format!("Input error: {}", e)))?;

        println!();
        println!("Classifier");
        let model_path: String = Input::new()
            .with_prompt("  Model file")
            .default(defaults.model.path.display().to_string())
            .interact_text()
            .map_err(|e| CropError::Config(format!("Input error: {}", e)))?;

        println!();
        println!("Ideal conditions (leave blank to fetch from the sensor API)");
        let ideal_file: String = Input::new()
            .with_prompt("  File")
            .default(String::new())
            .allow_empty(true)
            .interact_text()
            .map_err(|e| CropError::Config(format!("Input error: {}", e)))?;

        println!();
        println!("Live polling");
        let interval_secs: u64 = Input::new()
            .with_prompt("  Interval (seconds)")
            .default(defaults.poller.interval_secs)
            .interact_text()
            .map_err(|e| CropError::Config(format!("Input error: {}", e)))?;

        println!();

        let config = Config {
            api: ApiConfig {
                base_url,
                timeout_secs: defaults.api.timeout_secs,
            },
            model: ModelConfig {
                path: PathBuf::from(model_path),
            },
            ideal_conditions: IdealConditionsConfig {
                file: if ideal_file.trim().is_empty() {
                    None
                } else {
                    Some(PathBuf::from(ideal_file.trim()))
                },
            },
            poller: PollerConfig { interval_secs },
        };
        config.validate()?;

        let config_path = Self::default_config_path()?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml::to_string(&config)
            .map_err(|e| CropError::Config(format!("Failed to serialize config: {}", e)))?;

        // Write with a header comment
        let content = format!(
            "# Crop Advisor Configuration\n# Generated by `cropadvisor init`\n# Environment variable substitution (${{VAR}}) is supported.\n\n{}",
            yaml
        );
        std::fs::write(&config_path, content)?;

        println!("Configuration saved to {}", config_path.display());
        println!();

        Ok((config, config_path))
    }

    fn substitute_env_vars(content: &str) -> Result<String> {
        let mut result = content.to_string();

        // Find all ${VAR_NAME} patterns and substitute
        let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| CropError::Config(format!("Invalid substitution pattern: {}", e)))?;

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let placeholder = &cap[0];
            if let Ok(value) = std::env::var(var_name) {
                result = result.replace(placeholder, &value);
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_gateway_deployment() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://127.0.0.1:5001");
        assert_eq!(config.poller.interval_secs, 10);
        assert!(config.ideal_conditions.file.is_none());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config = Config::from_yaml("api:\n  base_url: http://sensors.local:5001\n").unwrap();
        assert_eq!(config.api.base_url, "http://sensors.local:5001");
        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.poller, PollerConfig::default());
        assert_eq!(config.model, ModelConfig::default());
    }

    #[test]
    fn env_vars_are_substituted() {
        std::env::set_var("CROPADVISOR_TEST_API_URL", "http://10.0.0.7:5001");
        let config = Config::from_yaml(
            "api:\n  base_url: ${CROPADVISOR_TEST_API_URL}\nideal_conditions:\n  file: data/ideal.json\n",
        )
        .unwrap();
        assert_eq!(config.api.base_url, "http://10.0.0.7:5001");
        assert_eq!(
            config.ideal_conditions.file,
            Some(PathBuf::from("data/ideal.json"))
        );
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = Config::from_yaml("poller:\n  interval_secs: 0\n").unwrap_err();
        assert!(matches!(err, CropError::Config(_)));
    }

    #[test]
    fn explicit_missing_path_is_error() {
        let err = Config::load(Some(PathBuf::from("/nonexistent/config.yaml"))).unwrap_err();
        assert!(matches!(err, CropError::Config(_)));
    }
}
