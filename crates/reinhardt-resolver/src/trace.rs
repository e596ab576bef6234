//! Resolution path tracking
//!
//! Each construction carries the chain of keys that led to it. Entering a key
//! that is already on the chain is a circular dependency; a chain longer than
//! the configured limit is rejected before it can exhaust the stack.

use reinhardt_design::{DiError, DiResult, Key};
use std::sync::Arc;

/// Default limit on the length of a resolution path.
pub const MAX_RESOLUTION_DEPTH: usize = 100;

/// Immutable chain of keys from the requested root to the key being built.
///
/// Cloning is cheap; [`ResolutionTrace::enter`] returns a new trace and
/// leaves the receiver untouched, so concurrent siblings never see each
/// other's keys.
#[derive(Debug, Clone)]
pub struct ResolutionTrace {
	path: Arc<[Key]>,
	max_depth: usize,
}

impl ResolutionTrace {
	/// An empty trace that rejects paths longer than `max_depth`.
	pub fn new(max_depth: usize) -> Self {
		Self {
			path: Arc::from(Vec::new()),
			max_depth,
		}
	}

	/// Extends the trace with `key`.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_resolver::ResolutionTrace;
	///
	/// let trace = ResolutionTrace::default().enter("a").unwrap().enter("b").unwrap();
	/// assert!(trace.enter("a").is_err());
	/// ```
	pub fn enter(&self, key: impl Into<Key>) -> DiResult<Self> {
		let key = key.into();
		if self.path.contains(&key) {
			let mut cycle = self.path.to_vec();
			cycle.push(key);
			return Err(DiError::CircularDependency { path: cycle });
		}
		if self.path.len() >= self.max_depth {
			let mut path = self.path.to_vec();
			path.push(key);
			return Err(DiError::MaxDepthExceeded {
				depth: self.max_depth,
				path,
			});
		}
		let mut path = Vec::with_capacity(self.path.len() + 1);
		path.extend(self.path.iter().cloned());
		path.push(key);
		Ok(Self {
			path: Arc::from(path),
			max_depth: self.max_depth,
		})
	}

	/// Keys from the root request to the current one.
	pub fn path(&self) -> &[Key] {
		&self.path
	}

	pub fn depth(&self) -> usize {
		self.path.len()
	}

	pub fn max_depth(&self) -> usize {
		self.max_depth
	}

	pub fn contains(&self, key: &Key) -> bool {
		self.path.contains(key)
	}
}

impl Default for ResolutionTrace {
	fn default() -> Self {
		Self::new(MAX_RESOLUTION_DEPTH)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_enter_builds_path() {
		// Arrange
		let root = ResolutionTrace::default();

		// Act
		let trace = root.enter("a").unwrap().enter("b").unwrap();

		// Assert
		assert_eq!(trace.path(), &[Key::from("a"), Key::from("b")]);
		assert_eq!(root.depth(), 0);
	}

	#[rstest]
	fn test_reentering_a_key_is_a_cycle() {
		let trace = ResolutionTrace::default()
			.enter("a")
			.unwrap()
			.enter("b")
			.unwrap();

		let err = trace.enter("a").unwrap_err();

		match err {
			DiError::CircularDependency { path } => {
				assert_eq!(path, vec![Key::from("a"), Key::from("b"), Key::from("a")]);
			}
			other => panic!("unexpected error {:?}", other),
		}
	}

	#[rstest]
	#[case(1)]
	#[case(3)]
	fn test_depth_limit(#[case] max_depth: usize) {
		// Arrange
		let mut trace = ResolutionTrace::new(max_depth);
		for i in 0..max_depth {
			trace = trace.enter(format!("k{}", i)).unwrap();
		}

		// Act
		let err = trace.enter("overflow").unwrap_err();

		// Assert
		assert!(matches!(err, DiError::MaxDepthExceeded { depth, .. } if depth == max_depth));
	}

	#[rstest]
	fn test_siblings_do_not_share_entries() {
		let parent = ResolutionTrace::default().enter("p").unwrap();
		let left = parent.enter("x").unwrap();
		let right = parent.enter("x");
		assert!(right.is_ok());
		assert!(left.contains(&Key::from("x")));
		assert!(!parent.contains(&Key::from("x")));
	}
}
