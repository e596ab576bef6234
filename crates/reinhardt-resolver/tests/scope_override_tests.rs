//! Child scopes and overrides
//!
//! These tests verify that:
//! 1. Overridden keys are built in the child and never leak to the parent
//! 2. Keys the parent can build are taken from the parent, not cached twice
//! 3. Bindings that depend on an override only see it when they are built in
//!    the child
//! 4. `Designed` values resolve under their own overrides

use reinhardt_resolver::{AsyncResolver, Design, Designed, Injected, Key, provider};
use rstest::{fixture, rstest};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[fixture]
fn parent_design() -> Design {
	Design::new()
		.bind_instance("x", 1i64)
		.bind_provider("y", provider!(|x: i64| x + 100))
}

#[rstest]
#[tokio::test]
async fn test_override_is_local_to_child(parent_design: Design) {
	// Arrange
	let parent = AsyncResolver::new(parent_design);
	let child = parent.child(Design::new().bind_instance("x", 2i64));

	// Act
	let in_child = child.provide_as::<i64>("x").await.unwrap();
	let in_parent = parent.provide_as::<i64>("x").await.unwrap();

	// Assert
	assert_eq!(*in_child, 2);
	assert_eq!(*in_parent, 1);
	assert!(child.scope().cached("x").is_some());
}

#[rstest]
#[tokio::test]
async fn test_child_reuses_parent_cache(parent_design: Design) {
	// Arrange
	let parent = AsyncResolver::new(parent_design);
	let from_parent = parent.provide("y").await.unwrap();
	let child = parent.child(Design::new());

	// Act
	let from_child = child.provide("y").await.unwrap();

	// Assert
	assert!(from_parent.ptr_eq(&from_child));
	assert!(child.scope().cached("y").is_none());
	assert_eq!(child.scope().cache_len(), 0);
}

#[rstest]
#[tokio::test]
async fn test_non_overridden_binding_sees_parent_dependencies(parent_design: Design) {
	// Arrange
	let parent = AsyncResolver::new(parent_design);
	let child = parent.child(Design::new().bind_instance("x", 2i64));

	// Act
	let y = child.provide_as::<i64>("y").await.unwrap();

	// Assert
	assert_eq!(*y, 101);
	assert!(parent.scope().cached("y").is_some());
}

#[rstest]
#[tokio::test]
async fn test_binding_added_by_child_sees_override(parent_design: Design) {
	// Arrange
	let parent = AsyncResolver::new(parent_design);
	let child = parent.child(
		Design::new()
			.bind_instance("x", 2i64)
			.bind_provider("z", provider!(|x: i64, y: i64| x * 1000 + y)),
	);

	// Act
	let z = child.provide_as::<i64>("z").await.unwrap();

	// Assert
	assert_eq!(*z, 2101);
	assert!(child.scope().cached("z").is_some());
	assert!(parent.scope().cached("z").is_none());
}

#[rstest]
#[tokio::test]
async fn test_key_only_child_can_build_stays_in_child() {
	// Arrange
	let calls = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&calls);
	let parent = AsyncResolver::new(Design::new());
	let child = parent.child(Design::new().bind_provider(
		"session",
		provider!(|| {
			counter.fetch_add(1, Ordering::SeqCst);
			"session".to_string()
		}),
	));

	// Act
	child.provide("session").await.unwrap();
	child.provide("session").await.unwrap();

	// Assert
	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(parent.scope().cache_len(), 0);
}

#[rstest]
#[tokio::test]
async fn test_designed_resolves_under_its_overrides(parent_design: Design) {
	// Arrange
	let resolver = AsyncResolver::new(parent_design);
	let designed = Designed::new(
		Design::new().bind_instance("x", 5i64),
		Injected::by_name("x").map_ref(|x: &i64| x * 3),
	);

	// Act
	let value = resolver.resolve_designed(designed).await.unwrap();
	let untouched = resolver.provide_as::<i64>("x").await.unwrap();

	// Assert
	assert_eq!(value.downcast_ref::<i64>(), Some(&15));
	assert_eq!(*untouched, 1);
}

#[rstest]
#[tokio::test]
async fn test_design_intrinsic_reflects_child_bindings(parent_design: Design) {
	// Arrange
	let parent = AsyncResolver::new(parent_design);
	let child = parent.child(Design::new().bind_instance("extra", true));

	// Act
	let built = child
		.provide_as::<reinhardt_resolver::BuiltDesign>(Key::DESIGN)
		.await
		.unwrap();

	// Assert
	assert!(built.contains("extra"));
	assert!(built.contains("y"));
}
