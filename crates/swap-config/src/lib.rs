//! Configuration loading for the swap pipeline service.
//!
//! TOML files with `${VAR}` environment substitution, a small set of
//! environment overrides, and cross-section validation before anything is
//! constructed from the file.

use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::map::Map::new())
}

fn default_http_port() -> u16 {
	8080
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_confirmations() -> u64 {
	1
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
	pub name: String,
	#[serde(default = "default_http_port")]
	pub http_port: u16,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

/// Named implementation plus its free-form TOML section, handed to the
/// matching factory at build time.
#[derive(Debug, Clone, Deserialize)]
pub struct ImplementationConfig {
	pub implementation: String,
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
	#[serde(default = "default_confirmations")]
	pub confirmations: u64,
	/// Chain client configuration keyed by decimal chain id.
	#[serde(default)]
	pub chains: HashMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: ServiceConfig,
	pub quoter: ImplementationConfig,
	pub gas: ImplementationConfig,
	pub account: ImplementationConfig,
	pub delivery: DeliveryConfig,
}

/// Configuration loader with environment variable substitution.
#[derive(Default)]
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "SWAP_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let mut config = if let Some(file_path) = &self.file_path {
			self.load_from_file(file_path).await?
		} else {
			return Err(ConfigError::FileNotFound(
				"No configuration file specified".to_string(),
			));
		};

		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		Ok(config)
	}

	async fn load_from_file(&self, file_path: &str) -> Result<Config, ConfigError> {
		let content = tokio::fs::read_to_string(file_path).await?;
		let substituted = substitute_env_vars(&content)?;

		let config: Config =
			toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))?;

		Ok(config)
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			config.service.log_level = log_level;
		}

		if let Ok(http_port) = env::var(format!("{}HTTP_PORT", self.env_prefix)) {
			config.service.http_port = http_port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid HTTP port: {}", e)))?;
		}

		Ok(())
	}
}

/// Replaces `${VAR_NAME}` references with the environment's values. A
/// missing variable is an error, not an empty string.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let mut result = content.to_string();

	let re = regex::Regex::new(r"\$\{([^}]+)\}")
		.map_err(|e| ConfigError::ParseError(e.to_string()))?;

	for cap in re.captures_iter(content) {
		let full_match = &cap[0];
		let var_name = &cap[1];

		let env_value =
			env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

		result = result.replace(full_match, &env_value);
	}

	Ok(result)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
	if config.delivery.chains.is_empty() {
		return Err(ConfigError::ValidationError(
			"At least one chain must be configured under [delivery.chains]".to_string(),
		));
	}

	for key in config.delivery.chains.keys() {
		if key.parse::<u64>().is_err() {
			return Err(ConfigError::ValidationError(format!(
				"Chain key '{}' is not a numeric chain id",
				key
			)));
		}
	}

	if config.service.http_port == 0 {
		return Err(ConfigError::ValidationError(
			"service.http_port must be non-zero".to_string(),
		));
	}

	Ok(())
}
