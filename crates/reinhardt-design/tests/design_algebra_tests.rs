//! Design merge and multi-binding behaviour, seen through the public API
//!
//! These tests verify that:
//! 1. Merging is right-biased per key and never mutates its operands
//! 2. Multi-bindings concatenate left then right, honouring reset markers
//! 3. Built multi-bindings produce the ordered sequence of contributions

use reinhardt_design::{
	Binding, Dependencies, Design, Injected, Key, ResolvedBinding, Value, instances, provider,
};
use rstest::{fixture, rstest};

#[fixture]
fn base() -> Design {
	instances([("x", Value::new(1i64)), ("y", Value::new(10i64))])
		.multi_bind_instance("plugins", "auth".to_string())
		.multi_bind_instance("plugins", "cache".to_string())
}

fn instance(binding: Option<&Binding>) -> Option<i64> {
	match binding {
		Some(Binding::Instance(value)) => value.downcast_ref::<i64>().copied(),
		_ => None,
	}
}

async fn provide_multi(design: &Design, key: &str) -> Vec<String> {
	let built = design.build();
	let binding = built.get(key).expect("multi binding");
	let value = binding
		.to_injected()
		.provide(&Dependencies::new())
		.await
		.unwrap();
	value
		.downcast_ref::<Vec<Value>>()
		.unwrap()
		.iter()
		.map(|v| v.downcast_ref::<String>().unwrap().clone())
		.collect()
}

#[rstest]
fn test_merge_does_not_mutate_operands(base: Design) {
	// Arrange
	let overrides = Design::new().bind_instance("x", 2i64);

	// Act
	let merged = base.clone() + overrides.clone();

	// Assert
	assert_eq!(instance(base.get("x")), Some(1));
	assert_eq!(instance(merged.get("x")), Some(2));
	assert_eq!(overrides.len(), 1);
}

#[rstest]
#[tokio::test]
async fn test_multi_binding_order_after_merge(base: Design) {
	// Arrange
	let extra = Design::new().multi_bind_instance("plugins", "metrics".to_string());

	// Act
	let merged = base.merge(&extra);

	// Assert
	assert_eq!(
		provide_multi(&merged, "plugins").await,
		vec!["auth", "cache", "metrics"]
	);
}

#[rstest]
#[tokio::test]
async fn test_reset_on_the_right_replaces_left_contributions(base: Design) {
	let replacement = Design::new()
		.multi_bind_empty("plugins")
		.multi_bind_instance("plugins", "only".to_string());

	let merged = base + replacement;

	assert_eq!(provide_multi(&merged, "plugins").await, vec!["only"]);
}

#[rstest]
#[tokio::test]
async fn test_multi_binding_with_provider_contributions() {
	// Arrange
	let design = Design::new()
		.multi_bind_provider("greetings", provider!(|name: String| format!("hi {}", name)))
		.multi_bind_provider("greetings", Injected::by_name("name"));
	let built = design.build();
	let binding = built.get("greetings").unwrap();

	// Act
	let deps = Dependencies::new().with("name", Value::new("ada".to_string()));
	let value = binding.to_injected().provide(&deps).await.unwrap();

	// Assert
	assert_eq!(
		binding.dependencies().into_iter().collect::<Vec<_>>(),
		vec![Key::from("name")]
	);
	let items: Vec<&String> = value
		.downcast_ref::<Vec<Value>>()
		.unwrap()
		.iter()
		.map(|v| v.downcast_ref::<String>().unwrap())
		.collect();
	assert_eq!(items, vec!["hi ada", "ada"]);
}

#[rstest]
fn test_build_keeps_registration_order(base: Design) {
	let built = (base + Design::new().bind_provider("z", provider!(|x: i64| x))).build();
	let keys: Vec<&str> = built.keys().map(Key::as_str).collect();
	assert_eq!(keys, vec!["x", "y", "z", "plugins"]);
	assert!(matches!(
		built.get("plugins"),
		Some(ResolvedBinding::Multi(items)) if items.len() == 2
	));
}
