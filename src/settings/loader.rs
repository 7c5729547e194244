//! Layered configuration loading.

use super::{Validate, WatchConfig};
use crate::error::{Result, WatchError};
use config::{Environment, File};
use std::path::{Path, PathBuf};

/// Loads a [`WatchConfig`] from layered sources.
///
/// Precedence, lowest first: built-in defaults, config files in the order
/// they were added, environment variables, explicit overrides.
///
/// # Examples
///
/// ```rust,no_run
/// use regwatch::settings::ConfigLoader;
///
/// # fn example() -> regwatch::error::Result<()> {
/// // REGWATCH_POLL_INTERVAL_MS=250 -> poll_interval_ms = 250
/// let config = ConfigLoader::new()
///     .with_file("regwatch.yaml")
///     .with_env_overrides("REGWATCH", "__")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    files: Vec<PathBuf>,
    env: Option<(String, String)>,
    overrides: Vec<(String, config::Value)>,
}

impl ConfigLoader {
    /// Create a loader that yields the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a YAML, TOML or JSON file. Later files override earlier ones.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Read `<PREFIX>_<KEY>` environment variables, using `separator` for nested keys.
    pub fn with_env_overrides(mut self, prefix: &str, separator: &str) -> Self {
        self.env = Some((prefix.to_string(), separator.to_string()));
        self
    }

    /// Force a key to a value, above every other layer.
    pub fn with_override(mut self, key: &str, value: impl Into<config::Value>) -> Self {
        self.overrides.push((key.to_string(), value.into()));
        self
    }

    /// Names of the configured layers, lowest precedence first.
    pub fn layer_names(&self) -> Vec<String> {
        let mut names = vec!["defaults".to_string()];
        names.extend(self.files.iter().map(|p| format!("file:{}", p.display())));
        if let Some((prefix, _)) = &self.env {
            names.push(format!("env:{}_*", prefix));
        }
        if !self.overrides.is_empty() {
            names.push("overrides".to_string());
        }
        names
    }

    /// Merge all layers, deserialize and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A file is missing or has an unsupported extension
    /// - A layer cannot be parsed or deserialized
    /// - The merged configuration fails validation
    pub fn load(&self) -> Result<WatchConfig> {
        let mut builder = config::Config::builder();

        for path in &self.files {
            validate_extension(path)?;
            if !path.exists() {
                return Err(WatchError::ConfigError(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path.clone()).required(true));
        }

        if let Some((prefix, separator)) = &self.env {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator(separator)
                    .try_parsing(true),
            );
        }

        for (key, value) in &self.overrides {
            builder = builder.set_override(key, value.clone())?;
        }

        let config: WatchConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        tracing::debug!(
            layers = ?self.layer_names(),
            target_key = %config.target,
            "configuration loaded"
        );
        Ok(config)
    }
}

fn validate_extension(path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| {
            WatchError::ConfigError(format!(
                "Unable to determine file format for: {}",
                path.display()
            ))
        })?;

    match extension {
        "yaml" | "yml" | "toml" | "json" => Ok(()),
        _ => Err(WatchError::ConfigError(format!(
            "Unsupported file extension: {}. Supported: .yaml, .yml, .toml, .json",
            extension
        ))),
    }
}
