//! Dependency graph analysis
//!
//! [`DIGraph`] answers "what does this key need?" for a built design and
//! walks the graph to report every missing dependency in one pass, without
//! running any provider.

use crate::design::BuiltDesign;
use crate::error::{DependencyResolutionFailure, DiError, DiResult};
use crate::key::Key;
use std::collections::{BTreeSet, HashSet};

/// Static view of a built design's dependency graph.
#[derive(Clone, Debug)]
pub struct DIGraph {
	built: BuiltDesign,
}

impl DIGraph {
	pub fn new(built: BuiltDesign) -> Self {
		Self { built }
	}

	pub fn built(&self) -> &BuiltDesign {
		&self.built
	}

	/// Returns `true` if `key` has a binding or is intrinsic.
	pub fn is_bound(&self, key: &str) -> bool {
		self.built.contains(key) || Key::from(key).is_intrinsic()
	}

	/// Immediate dependencies of `key`.
	///
	/// Fails with [`DiError::Classification`] when no binding source can
	/// account for the key at all.
	pub fn dependencies_of(&self, key: &Key) -> DiResult<BTreeSet<Key>> {
		if key.is_intrinsic() {
			return Ok(BTreeSet::new());
		}
		self.built
			.get(key.as_str())
			.map(|binding| binding.dependencies())
			.ok_or_else(|| DiError::Classification {
				key: key.clone(),
				reason: "no binding, multi-binding or intrinsic provides this key".to_string(),
			})
	}

	/// Walks the graph depth-first from every root and reports each broken
	/// edge: edges into unbound keys and edges that close a cycle.
	///
	/// Never fails; an empty result means every root is resolvable.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_design::{DIGraph, Design, Key, provider};
	///
	/// let design = Design::new().bind_provider("r", provider!(|x: i64, y: i64| x + y));
	/// let graph = DIGraph::new(design.build());
	///
	/// let failures = graph.find_missing_dependencies(["r"]);
	/// let missing: Vec<&str> = failures.iter().map(|f| f.key.as_str()).collect();
	/// assert_eq!(missing, vec!["x", "y"]);
	/// ```
	pub fn find_missing_dependencies<K: Into<Key>>(
		&self,
		roots: impl IntoIterator<Item = K>,
	) -> Vec<DependencyResolutionFailure> {
		let mut expanded = HashSet::new();
		let mut failures = Vec::new();
		for root in roots {
			let mut trace = Vec::new();
			self.visit(root.into(), &mut trace, &mut expanded, &mut failures);
		}
		failures
	}

	fn visit(
		&self,
		key: Key,
		trace: &mut Vec<Key>,
		expanded: &mut HashSet<Key>,
		failures: &mut Vec<DependencyResolutionFailure>,
	) {
		let on_trace = trace.contains(&key);
		trace.push(key.clone());

		if !self.is_bound(key.as_str()) {
			failures.push(DependencyResolutionFailure::unbound(key, trace.clone()));
		} else if on_trace {
			failures.push(DependencyResolutionFailure::cycle(key, trace.clone()));
		} else if expanded.insert(key.clone()) {
			// bound keys always classify
			if let Ok(dependencies) = self.dependencies_of(&key) {
				for dependency in dependencies {
					self.visit(dependency, trace, expanded, failures);
				}
			}
		}

		trace.pop();
	}

	/// Every cycle reachable from any bound key, each as the path from the
	/// first repeated key back to the key that closes it.
	pub fn detect_cycles(&self) -> Vec<Vec<Key>> {
		let mut cycles = Vec::new();
		let mut visited = HashSet::new();
		let mut on_stack = HashSet::new();
		for key in self.built.keys() {
			if !visited.contains(key) {
				let mut path = Vec::new();
				self.dfs_detect_cycles(key, &mut visited, &mut on_stack, &mut path, &mut cycles);
			}
		}
		cycles
	}

	fn dfs_detect_cycles(
		&self,
		key: &Key,
		visited: &mut HashSet<Key>,
		on_stack: &mut HashSet<Key>,
		path: &mut Vec<Key>,
		cycles: &mut Vec<Vec<Key>>,
	) {
		visited.insert(key.clone());
		on_stack.insert(key.clone());
		path.push(key.clone());

		let dependencies = self.dependencies_of(key).unwrap_or_default();
		for dependency in &dependencies {
			if !self.built.contains(dependency.as_str()) {
				continue;
			}
			if !visited.contains(dependency) {
				self.dfs_detect_cycles(dependency, visited, on_stack, path, cycles);
			} else if on_stack.contains(dependency) {
				if let Some(start) = path.iter().position(|k| k == dependency) {
					let mut cycle = path[start..].to_vec();
					cycle.push(dependency.clone());
					cycles.push(cycle);
				}
			}
		}

		path.pop();
		on_stack.remove(key);
	}

	/// Every key reachable from `key`, excluding `key` itself unless it sits
	/// on a cycle.
	pub fn transitive_dependencies(&self, key: &Key) -> DiResult<BTreeSet<Key>> {
		let mut seen = BTreeSet::new();
		let mut stack: Vec<Key> = self.dependencies_of(key)?.into_iter().collect();
		while let Some(next) = stack.pop() {
			if !seen.insert(next.clone()) {
				continue;
			}
			if let Ok(dependencies) = self.dependencies_of(&next) {
				stack.extend(dependencies.into_iter().filter(|d| !seen.contains(d)));
			}
		}
		Ok(seen)
	}

	/// Counts describing the graph.
	pub fn statistics(&self) -> GraphStatistics {
		let mut stats = GraphStatistics {
			node_count: self.built.len(),
			..GraphStatistics::default()
		};
		let mut referenced = HashSet::new();
		for (_, binding) in self.built.iter() {
			match binding.kind() {
				"instance" => stats.instance_count += 1,
				"provider" => stats.provider_count += 1,
				"class" => stats.class_count += 1,
				_ => stats.multi_count += 1,
			}
			for dependency in binding.dependencies() {
				stats.edge_count += 1;
				if !self.is_bound(dependency.as_str()) {
					stats.unbound_count += 1;
				}
				referenced.insert(dependency);
			}
		}
		stats.root_count = self
			.built
			.keys()
			.filter(|key| !referenced.contains(*key))
			.count();
		stats.cycle_count = self.detect_cycles().len();
		stats
	}
}

/// Statistics about a dependency graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStatistics {
	/// Bound keys, multi-bound keys included
	pub node_count: usize,
	/// Declared dependency edges
	pub edge_count: usize,
	pub instance_count: usize,
	pub provider_count: usize,
	pub class_count: usize,
	pub multi_count: usize,
	/// Edges pointing at keys nothing binds
	pub unbound_count: usize,
	/// Bound keys no other binding depends on
	pub root_count: usize,
	pub cycle_count: usize,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::design::Design;
	use crate::error::FailureCause;
	use crate::provider;
	use rstest::{fixture, rstest};

	#[fixture]
	fn broken_design() -> Design {
		Design::new()
			.bind_provider("r", provider!(|a: i64, x: i64| a + x))
			.bind_provider("a", provider!(|y: i64, b: i64| y + b))
			.bind_instance("b", 1i64)
	}

	#[rstest]
	fn test_reports_every_missing_key(broken_design: Design) {
		// Arrange
		let graph = DIGraph::new(broken_design.build());

		// Act
		let failures = graph.find_missing_dependencies(["r"]);

		// Assert
		let reported: Vec<(String, Vec<String>)> = failures
			.iter()
			.map(|f| {
				(
					f.key.to_string(),
					f.trace.iter().map(ToString::to_string).collect(),
				)
			})
			.collect();
		assert_eq!(
			reported,
			vec![
				("y".to_string(), vec!["r".into(), "a".into(), "y".into()]),
				("x".to_string(), vec!["r".into(), "x".into()]),
			]
		);
		assert!(failures.iter().all(|f| f.cause == FailureCause::Unbound));
	}

	#[rstest]
	fn test_unbound_root_is_reported(broken_design: Design) {
		let graph = DIGraph::new(broken_design.build());
		let failures = graph.find_missing_dependencies(["nope"]);
		assert_eq!(failures.len(), 1);
		assert_eq!(failures[0].trace, vec![Key::from("nope")]);
	}

	#[rstest]
	fn test_intrinsic_keys_need_no_binding() {
		let design = Design::new().bind_provider(
			"inspect",
			provider!(|__design__: crate::BuiltDesign| __design__.len()),
		);
		let graph = DIGraph::new(design.build());
		assert!(graph.find_missing_dependencies(["inspect"]).is_empty());
	}

	#[rstest]
	fn test_dependencies_of_distinguishes_classification(broken_design: Design) {
		// Arrange
		let graph = DIGraph::new(broken_design.build());

		// Act
		let known = graph.dependencies_of(&Key::from("a")).unwrap();
		let unknown = graph.dependencies_of(&Key::from("zzz"));

		// Assert
		assert_eq!(known.len(), 2);
		assert!(matches!(unknown, Err(DiError::Classification { .. })));
	}

	#[rstest]
	fn test_cycles_are_reported_not_followed() {
		// Arrange
		let design = Design::new()
			.bind_provider("a", provider!(|b: i64| b))
			.bind_provider("b", provider!(|c: i64| c))
			.bind_provider("c", provider!(|a: i64| a));
		let graph = DIGraph::new(design.build());

		// Act
		let failures = graph.find_missing_dependencies(["a"]);
		let cycles = graph.detect_cycles();

		// Assert
		assert_eq!(failures.len(), 1);
		assert_eq!(failures[0].cause, FailureCause::Cycle);
		assert_eq!(failures[0].trace.len(), 4);
		assert_eq!(cycles.len(), 1);
		assert_eq!(cycles[0].first(), cycles[0].last());
	}

	#[rstest]
	fn test_transitive_dependencies(broken_design: Design) {
		let graph = DIGraph::new(broken_design.build());
		let deps = graph.transitive_dependencies(&Key::from("r")).unwrap();
		let names: Vec<&str> = deps.iter().map(Key::as_str).collect();
		assert_eq!(names, vec!["a", "b", "x", "y"]);
	}

	#[rstest]
	fn test_statistics(broken_design: Design) {
		let graph = DIGraph::new(broken_design.build());

		let stats = graph.statistics();

		assert_eq!(stats.node_count, 3);
		assert_eq!(stats.edge_count, 4);
		assert_eq!(stats.provider_count, 2);
		assert_eq!(stats.instance_count, 1);
		assert_eq!(stats.unbound_count, 2);
		assert_eq!(stats.root_count, 1);
		assert_eq!(stats.cycle_count, 0);
	}
}
