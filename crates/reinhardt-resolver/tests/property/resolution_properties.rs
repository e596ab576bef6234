//! Property-based tests for resolution
//!
//! Uses proptest to verify, over random acyclic graphs:
//! 1. Resolved values match a direct evaluation of the graph
//! 2. Every reachable provider runs exactly once per resolver
//! 3. A child resolver without overrides builds nothing of its own

use proptest::prelude::*;
use reinhardt_resolver::{AsyncResolver, Dependencies, Design, Key, Provider, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// For each node, the earlier nodes it depends on.
fn dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
	(1usize..8).prop_flat_map(|n| {
		(0..n)
			.map(|i| {
				prop::collection::vec(any::<bool>(), i).prop_map(|mask| {
					mask.iter()
						.enumerate()
						.filter(|(_, on)| **on)
						.map(|(d, _)| d)
						.collect::<Vec<_>>()
				})
			})
			.collect::<Vec<_>>()
	})
}

fn node(i: usize) -> String {
	format!("n{i}")
}

fn build(graph: &[Vec<usize>], counters: &[Arc<AtomicUsize>]) -> Design {
	graph.iter().enumerate().fold(Design::new(), |design, (i, deps)| {
		let params: Vec<Key> = deps.iter().map(|d| Key::from(node(*d))).collect();
		let counter = Arc::clone(&counters[i]);
		let inputs = params.clone();
		let provider = Provider::sync(node(i), params, move |values: &Dependencies| {
			counter.fetch_add(1, Ordering::SeqCst);
			let mut total = 1i64;
			for key in &inputs {
				total += values.cloned::<i64>(key.as_str())?;
			}
			Ok(Value::new(total))
		});
		design.bind_provider(node(i), provider)
	})
}

fn expected(graph: &[Vec<usize>]) -> Vec<i64> {
	let mut values: Vec<i64> = Vec::with_capacity(graph.len());
	for deps in graph {
		let total = 1 + deps.iter().map(|d| values[*d]).sum::<i64>();
		values.push(total);
	}
	values
}

fn runtime() -> tokio::runtime::Runtime {
	tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.unwrap()
}

proptest! {
	// Properties 1 and 2: values are correct and nothing is built twice
	#[test]
	fn prop_resolution_matches_direct_evaluation(graph in dag()) {
		let counters: Vec<_> = graph.iter().map(|_| Arc::new(AtomicUsize::new(0))).collect();
		let resolver = AsyncResolver::new(build(&graph, &counters));
		let last = graph.len() - 1;

		let (first, second) = runtime().block_on(async {
			let first = resolver.provide_as::<i64>(node(last)).await.unwrap();
			let second = resolver.provide_as::<i64>(node(last)).await.unwrap();
			(first, second)
		});

		prop_assert_eq!(*first, expected(&graph)[last]);
		prop_assert!(Arc::ptr_eq(&first, &second));
		prop_assert!(counters.iter().all(|c| c.load(Ordering::SeqCst) <= 1));
		prop_assert_eq!(counters[last].load(Ordering::SeqCst), 1);
	}

	// Property 3: a plain child delegates every key to its parent
	#[test]
	fn prop_plain_child_builds_nothing(graph in dag()) {
		let counters: Vec<_> = graph.iter().map(|_| Arc::new(AtomicUsize::new(0))).collect();
		let parent = AsyncResolver::new(build(&graph, &counters));
		let child = parent.child(Design::new());
		let last = graph.len() - 1;

		let value = runtime().block_on(child.provide_as::<i64>(node(last))).unwrap();

		prop_assert_eq!(*value, expected(&graph)[last]);
		prop_assert_eq!(child.scope().cache_len(), 0);
		prop_assert!(parent.scope().cached(&node(last)).is_some());
	}
}
