//! Resolver configuration
//!
//! Settings can be built in code, read from a TOML document, or overlaid
//! from environment variables. Unknown TOML keys are rejected; missing ones
//! fall back to the defaults.

use crate::trace::MAX_RESOLUTION_DEPTH;
use reinhardt_design::DiError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Prefix used by [`ResolverConfig::from_env`].
pub const DEFAULT_ENV_PREFIX: &str = "REINHARDT_INJECT_";

/// Error type for configuration loading
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("TOML error: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("invalid value {value:?} for {var}: expected {expected}")]
	InvalidValue {
		var: String,
		value: String,
		expected: &'static str,
	},
}

impl From<ConfigError> for DiError {
	fn from(err: ConfigError) -> Self {
		DiError::Config(err.to_string())
	}
}

/// Settings that control how a resolver walks the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
	/// Longest dependency path allowed before resolution is aborted
	pub max_depth: usize,
	/// Run the static missing-dependency and cycle check before every
	/// top-level resolution
	pub validate_before_resolve: bool,
	/// Log each construction at `info` instead of `debug`
	pub log_resolution: bool,
}

impl Default for ResolverConfig {
	fn default() -> Self {
		Self {
			max_depth: MAX_RESOLUTION_DEPTH,
			validate_before_resolve: true,
			log_resolution: false,
		}
	}
}

impl ResolverConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the longest dependency path allowed.
	pub fn with_max_depth(mut self, max_depth: usize) -> Self {
		self.max_depth = max_depth;
		self
	}

	/// Turns the static check before each top-level resolution on or off.
	pub fn with_validation(mut self, enabled: bool) -> Self {
		self.validate_before_resolve = enabled;
		self
	}

	pub fn with_log_resolution(mut self, enabled: bool) -> Self {
		self.log_resolution = enabled;
		self
	}

	/// Parses a TOML document.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_resolver::ResolverConfig;
	///
	/// let config = ResolverConfig::from_toml_str("max_depth = 16").unwrap();
	/// assert_eq!(config.max_depth, 16);
	/// assert!(config.validate_before_resolve);
	/// ```
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(source)?)
	}

	/// Reads and parses a TOML file.
	pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = fs::read_to_string(path)?;
		Self::from_toml_str(&content)
	}

	/// Defaults overlaid with the process environment under `prefix`.
	pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
		Self::default().with_env_overrides(prefix)
	}

	/// Overlays the process environment under `prefix` onto `self`.
	pub fn with_env_overrides(self, prefix: &str) -> Result<Self, ConfigError> {
		self.with_vars(prefix, std::env::vars())
	}

	/// Overlays `vars` whose names start with `prefix`.
	///
	/// Recognized names (after the prefix, case-insensitive): `MAX_DEPTH`,
	/// `VALIDATE_BEFORE_RESOLVE`, `LOG_RESOLUTION`. Others are ignored.
	pub fn with_vars<I, K, V>(mut self, prefix: &str, vars: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: AsRef<str>,
	{
		for (name, value) in vars {
			let name = name.as_ref();
			let Some(field) = name.strip_prefix(prefix) else {
				continue;
			};
			let value = value.as_ref();
			match field.to_lowercase().as_str() {
				"max_depth" => {
					self.max_depth = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
						var: name.to_string(),
						value: value.to_string(),
						expected: "a non-negative integer",
					})?;
				}
				"validate_before_resolve" => {
					self.validate_before_resolve = parse_flag(name, value)?;
				}
				"log_resolution" => self.log_resolution = parse_flag(name, value)?,
				_ => {}
			}
		}
		Ok(self)
	}
}

fn parse_flag(var: &str, value: &str) -> Result<bool, ConfigError> {
	match value.trim().to_lowercase().as_str() {
		"true" | "1" | "yes" | "on" => Ok(true),
		"false" | "0" | "no" | "off" => Ok(false),
		_ => Err(ConfigError::InvalidValue {
			var: var.to_string(),
			value: value.to_string(),
			expected: "a boolean",
		}),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_defaults() {
		let config = ResolverConfig::default();
		assert_eq!(config.max_depth, 100);
		assert!(config.validate_before_resolve);
		assert!(!config.log_resolution);
	}

	#[rstest]
	fn test_toml_overrides_only_given_fields() {
		// Arrange
		let source = r#"
			validate_before_resolve = false
			log_resolution = true
		"#;

		// Act
		let config = ResolverConfig::from_toml_str(source).unwrap();

		// Assert
		assert_eq!(config.max_depth, MAX_RESOLUTION_DEPTH);
		assert!(!config.validate_before_resolve);
		assert!(config.log_resolution);
	}

	#[rstest]
	fn test_toml_rejects_unknown_fields() {
		let err = ResolverConfig::from_toml_str("max_dept = 3").unwrap_err();
		assert!(matches!(err, ConfigError::Toml(_)));
	}

	#[rstest]
	#[case("1", true)]
	#[case("yes", true)]
	#[case("ON", true)]
	#[case("0", false)]
	#[case("off", false)]
	#[case(" False ", false)]
	fn test_flag_spellings(#[case] raw: &str, #[case] expected: bool) {
		let config = ResolverConfig::default()
			.with_vars("DI_", [("DI_LOG_RESOLUTION", raw)])
			.unwrap();
		assert_eq!(config.log_resolution, expected);
	}

	#[rstest]
	fn test_vars_outside_prefix_are_ignored() {
		// Arrange
		let vars = [
			("DI_MAX_DEPTH", "8"),
			("OTHER_MAX_DEPTH", "3"),
			("DI_UNRELATED", "x"),
		];

		// Act
		let config = ResolverConfig::default().with_vars("DI_", vars).unwrap();

		// Assert
		assert_eq!(config.max_depth, 8);
	}

	#[rstest]
	fn test_invalid_value_names_the_variable() {
		let err = ResolverConfig::default()
			.with_vars("DI_", [("DI_MAX_DEPTH", "deep")])
			.unwrap_err();

		assert!(err.to_string().contains("DI_MAX_DEPTH"));
		assert!(matches!(DiError::from(err), DiError::Config(_)));
	}
}
