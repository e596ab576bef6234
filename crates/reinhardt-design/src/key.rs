//! Binding keys

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Name under which a binding is registered and looked up.
///
/// Keys are cheap to clone (the name is shared) and order lexicographically,
/// so sets of keys print deterministically in diagnostics.
///
/// # Examples
///
/// ```
/// use reinhardt_design::Key;
///
/// let key = Key::from("database");
/// assert_eq!(key.as_str(), "database");
/// assert_eq!(key, Key::new("database"));
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(Arc<str>);

impl Key {
	/// Key of the built registry itself.
	pub const DESIGN: &'static str = "__design__";
	/// Key of the resolver that is currently resolving.
	pub const RESOLVER: &'static str = "__resolver__";

	/// Creates a key from its name.
	pub fn new(name: impl AsRef<str>) -> Self {
		Self(Arc::from(name.as_ref()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Returns `true` for keys the engine answers without a binding.
	pub fn is_intrinsic(&self) -> bool {
		matches!(self.as_str(), Self::DESIGN | Self::RESOLVER)
	}
}

impl fmt::Debug for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Key({:?})", &*self.0)
	}
}

impl fmt::Display for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for Key {
	fn from(name: &str) -> Self {
		Self::new(name)
	}
}

impl From<String> for Key {
	fn from(name: String) -> Self {
		Self(Arc::from(name))
	}
}

impl From<&String> for Key {
	fn from(name: &String) -> Self {
		Self::new(name)
	}
}

impl From<&Key> for Key {
	fn from(key: &Key) -> Self {
		key.clone()
	}
}

impl Borrow<str> for Key {
	fn borrow(&self) -> &str {
		&self.0
	}
}

impl AsRef<str> for Key {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

/// Formats a traversal path as `a -> b -> c`.
pub fn format_path(path: &[Key]) -> String {
	path.iter()
		.map(Key::as_str)
		.collect::<Vec<_>>()
		.join(" -> ")
}
