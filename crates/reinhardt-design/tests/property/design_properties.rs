//! Property-based tests for designs and the graph analyzer
//!
//! Uses proptest to verify:
//! 1. Right-biased merge - the right operand's binding wins on shared keys
//! 2. Multi-binding concatenation - contributions keep left-then-right order
//! 3. Missing-dependency completeness - every unbound reachable key is reported
//! 4. Provider dependencies - a provider's dependencies are its parameters

use proptest::prelude::*;
use reinhardt_design::{Binding, DIGraph, Design, Injected, Key, Provider, ResolvedBinding, Value};
use std::collections::BTreeSet;

fn key_names() -> impl Strategy<Value = Vec<String>> {
	prop::collection::btree_set("[a-h]", 1..6).prop_map(|set| set.into_iter().collect())
}

fn instance_value(binding: Option<&Binding>) -> Option<i64> {
	match binding {
		Some(Binding::Instance(value)) => value.downcast_ref::<i64>().copied(),
		_ => None,
	}
}

proptest! {
	// Property 1: every key bound on the right resolves to the right-hand value
	#[test]
	fn prop_merge_is_right_biased(left in key_names(), right in key_names()) {
		let d1 = left.iter().fold(Design::new(), |d, k| d.bind_instance(k.as_str(), 1i64));
		let d2 = right.iter().fold(Design::new(), |d, k| d.bind_instance(k.as_str(), 2i64));

		let merged = d1.merge(&d2);

		for key in &right {
			prop_assert_eq!(instance_value(merged.get(key)), Some(2));
		}
		for key in left.iter().filter(|k| !right.contains(k)) {
			prop_assert_eq!(instance_value(merged.get(key)), Some(1));
		}
	}

	// Property 2: multi-binding contributions concatenate in order
	#[test]
	fn prop_multi_binding_concatenates(left in 0usize..5, right in 0usize..5) {
		let d1 = (0..left).fold(Design::new(), |d, i| d.multi_bind_instance("m", i as i64));
		let d2 = (0..right)
			.fold(Design::new(), |d, i| d.multi_bind_instance("m", (left + i) as i64));

		let built = d1.merge(&d2).multi_bind_empty("other").build();

		let expected: Vec<i64> = (0..(left + right) as i64).collect();
		match built.get("m") {
			Some(ResolvedBinding::Multi(items)) => {
				let values: Vec<i64> =
					items.iter().filter_map(|b| instance_value(Some(b))).collect();
				prop_assert_eq!(values, expected);
			}
			None => prop_assert_eq!(left + right, 0),
			Some(other) => prop_assert!(false, "unexpected binding {:?}", other),
		}
	}

	// Property 3: every unbound parameter of a root provider is reported
	#[test]
	fn prop_missing_dependencies_are_complete(bound in key_names(), params in key_names()) {
		let design = bound
			.iter()
			.fold(Design::new(), |d, k| d.bind_instance(k.as_str(), 0i64))
			.bind_provider("root", Provider::sync("root", params.clone(), |_| Ok(Value::unit())));

		let failures = DIGraph::new(design.build()).find_missing_dependencies(["root"]);

		let reported: BTreeSet<String> = failures.iter().map(|f| f.key.to_string()).collect();
		let expected: BTreeSet<String> = params
			.iter()
			.filter(|p| !bound.contains(p))
			.cloned()
			.collect();
		prop_assert_eq!(reported, expected);
	}

	// Property 4: dependencies of a function expression are its parameters
	#[test]
	fn prop_from_function_dependencies(params in key_names()) {
		let provider = Provider::sync("f", params.clone(), |_| Ok(Value::unit()));
		let injected = Injected::from_function(provider);
		let expected: BTreeSet<Key> = params.iter().map(Key::from).collect();
		prop_assert_eq!(injected.dependencies(), expected);
	}
}
