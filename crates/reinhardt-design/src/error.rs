//! Error types shared by the registry, the graph analyzer and the resolver

use crate::key::{Key, format_path};
use crate::value::ExpressionError;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Error type raised by user code (providers, transforms, functions).
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result alias used throughout the injection crates.
pub type DiResult<T> = Result<T, DiError>;

/// Why a key showed up in a missing-dependency report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCause {
	/// No binding exists for the key anywhere in the registry
	Unbound,
	/// The key is already on the traversal path
	Cycle,
}

/// One broken path found while walking the dependency graph.
///
/// `trace` runs from the requested root down to (and including) `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyResolutionFailure {
	pub key: Key,
	pub trace: Vec<Key>,
	pub cause: FailureCause,
}

impl DependencyResolutionFailure {
	/// `key` has no binding; `trace` is the path that asked for it.
	pub fn unbound(key: Key, trace: Vec<Key>) -> Self {
		Self {
			key,
			trace,
			cause: FailureCause::Unbound,
		}
	}

	/// `key` was reached again along `trace`.
	pub fn cycle(key: Key, trace: Vec<Key>) -> Self {
		Self {
			key,
			trace,
			cause: FailureCause::Cycle,
		}
	}
}

impl fmt::Display for DependencyResolutionFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.cause {
			FailureCause::Unbound => write!(
				f,
				"'{}' is not bound (trace: {})",
				self.key,
				format_path(&self.trace)
			),
			FailureCause::Cycle => write!(
				f,
				"'{}' depends on itself (trace: {})",
				self.key,
				format_path(&self.trace)
			),
		}
	}
}

/// Every missing path discovered in one validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependencies {
	failures: Vec<DependencyResolutionFailure>,
}

impl MissingDependencies {
	pub fn new(failures: Vec<DependencyResolutionFailure>) -> Self {
		Self { failures }
	}

	pub fn failures(&self) -> &[DependencyResolutionFailure] {
		&self.failures
	}

	/// Keys reported as missing, in discovery order and without repeats.
	pub fn missing_keys(&self) -> Vec<Key> {
		let mut keys: Vec<Key> = Vec::new();
		for failure in &self.failures {
			if !keys.contains(&failure.key) {
				keys.push(failure.key.clone());
			}
		}
		keys
	}
}

impl fmt::Display for MissingDependencies {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} missing dependencies:", self.failures.len())?;
		for failure in &self.failures {
			write!(f, "\n  - {}", failure)?;
		}
		Ok(())
	}
}

impl StdError for MissingDependencies {}

/// Error raised by a provider, kept shareable so failed resolutions can be
/// handed to every waiter of an in-flight key.
#[derive(Clone)]
pub struct ProviderFailure(Arc<dyn StdError + Send + Sync + 'static>);

impl ProviderFailure {
	pub fn new(error: BoxError) -> Self {
		Self(Arc::from(error))
	}

	pub fn get_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
		&*self.0
	}

	/// The original error, if it is an `E`.
	pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
		self.0.downcast_ref::<E>()
	}
}

impl fmt::Debug for ProviderFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&*self.0, f)
	}
}

impl fmt::Display for ProviderFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&*self.0, f)
	}
}

impl StdError for ProviderFailure {
	fn source(&self) -> Option<&(dyn StdError + 'static)> {
		self.0.source()
	}
}

/// Error raised while registering, analyzing or resolving bindings.
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum DiError {
	/// One or more keys are unbound; every broken path is listed
	#[error("{0}")]
	MissingDependencies(MissingDependencies),

	/// A provider's own logic failed
	#[error("provider for '{key}' failed (path: {}): {source}", format_path(.path))]
	ProviderExecution {
		key: Key,
		path: Vec<Key>,
		source: ProviderFailure,
	},

	/// A key could not be attributed to any binding source
	#[error("cannot classify '{key}': {reason}")]
	Classification { key: Key, reason: String },

	#[error("circular dependency detected: {}", format_path(.path))]
	CircularDependency { path: Vec<Key> },

	#[error("maximum resolution depth {depth} exceeded (path: {})", format_path(.path))]
	MaxDepthExceeded { depth: usize, path: Vec<Key> },

	/// Attribute, index or call failure while evaluating an expression
	#[error(transparent)]
	Expression(#[from] ExpressionError),

	#[error("value for '{key}' is not a {expected}")]
	TypeMismatch { key: Key, expected: &'static str },

	#[error("dependency '{0}' was not supplied to the provider")]
	MissingInput(Key),

	#[error("cannot serialize '{key}': {reason}")]
	Serialization { key: Key, reason: String },

	#[error("teardown of '{key}' failed: {source}")]
	Teardown { key: Key, source: ProviderFailure },

	#[error("configuration error: {0}")]
	Config(String),

	#[error("runtime error: {0}")]
	Runtime(String),
}

impl DiError {
	/// Wraps an error raised by user code for the given key.
	pub fn provider_failed(key: impl Into<Key>, error: BoxError) -> Self {
		Self::ProviderExecution {
			key: key.into(),
			path: Vec::new(),
			source: ProviderFailure::new(error),
		}
	}

	/// Attaches the binding key and dependency path to a provider failure that
	/// does not carry one yet. Errors that already know their path pass
	/// through unchanged.
	pub fn at(self, key: &Key, path: &[Key]) -> Self {
		match self {
			Self::ProviderExecution {
				path: existing,
				source,
				key: provider_key,
			} => {
				if existing.is_empty() {
					Self::ProviderExecution {
						key: key.clone(),
						path: path.to_vec(),
						source,
					}
				} else {
					Self::ProviderExecution {
						key: provider_key,
						path: existing,
						source,
					}
				}
			}
			other => other,
		}
	}

	/// The error raised by user code, if this is a provider failure.
	pub fn provider_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
		match self {
			Self::ProviderExecution { source, .. } | Self::Teardown { source, .. } => {
				Some(source.get_ref())
			}
			_ => None,
		}
	}

	/// The dependency path recorded on this error, if any.
	pub fn path(&self) -> Option<&[Key]> {
		match self {
			Self::ProviderExecution { path, .. }
			| Self::CircularDependency { path }
			| Self::MaxDepthExceeded { path, .. } => Some(path),
			_ => None,
		}
	}

	pub fn is_missing(&self) -> bool {
		matches!(self, Self::MissingDependencies(_))
	}
}

impl From<MissingDependencies> for DiError {
	fn from(missing: MissingDependencies) -> Self {
		Self::MissingDependencies(missing)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[derive(Debug, thiserror::Error)]
	#[error("boom")]
	struct Boom;

	#[rstest]
	fn test_missing_dependencies_lists_every_path() {
		// Arrange
		let missing = MissingDependencies::new(vec![
			DependencyResolutionFailure::unbound(
				Key::from("x"),
				vec![Key::from("r"), Key::from("x")],
			),
			DependencyResolutionFailure::unbound(
				Key::from("y"),
				vec![Key::from("r"), Key::from("a"), Key::from("y")],
			),
		]);

		// Act
		let message = DiError::from(missing).to_string();

		// Assert
		assert!(message.contains("2 missing dependencies"));
		assert!(message.contains("'x' is not bound (trace: r -> x)"));
		assert!(message.contains("'y' is not bound (trace: r -> a -> y)"));
	}

	#[rstest]
	fn test_provider_failure_keeps_original_error() {
		// Arrange
		let err = DiError::provider_failed("db", Box::new(Boom));

		// Act
		let err = err.at(&Key::from("db"), &[Key::from("app"), Key::from("db")]);

		// Assert
		assert!(err.provider_error().unwrap().downcast_ref::<Boom>().is_some());
		assert_eq!(err.path().unwrap().len(), 2);
		assert!(err.to_string().contains("app -> db"));
	}

	#[rstest]
	fn test_at_does_not_overwrite_existing_path() {
		// Arrange
		let inner = DiError::provider_failed("leaf", Box::new(Boom))
			.at(&Key::from("leaf"), &[Key::from("mid"), Key::from("leaf")]);

		// Act
		let outer = inner.at(&Key::from("mid"), &[Key::from("mid")]);

		// Assert
		match outer {
			DiError::ProviderExecution { key, path, .. } => {
				assert_eq!(key, Key::from("leaf"));
				assert_eq!(path, vec![Key::from("mid"), Key::from("leaf")]);
			}
			other => panic!("unexpected error: {:?}", other),
		}
	}

	#[rstest]
	fn test_missing_keys_deduplicates() {
		let missing = MissingDependencies::new(vec![
			DependencyResolutionFailure::unbound(Key::from("x"), vec![Key::from("x")]),
			DependencyResolutionFailure::unbound(
				Key::from("x"),
				vec![Key::from("a"), Key::from("x")],
			),
		]);
		assert_eq!(missing.missing_keys(), vec![Key::from("x")]);
	}
}
