//! Expressions that carry their own binding overrides

use crate::design::Design;
use crate::expr::{self, Applicative, Expr};
use crate::injected::{Injected, Transform};
use crate::value::Value;

/// An [`Injected`] paired with the bindings it should be resolved under.
///
/// Resolving a `Designed` resolves `injected` in a child scope whose
/// overrides are `design`.
#[derive(Clone, Debug)]
pub struct Designed {
	pub design: Design,
	pub injected: Injected,
}

impl Designed {
	/// Pairs `injected` with the overrides it must be resolved under.
	pub fn new(design: Design, injected: impl Into<Injected>) -> Self {
		Self {
			design,
			injected: injected.into(),
		}
	}

	/// Wraps an expression with no overrides.
	pub fn bare(injected: impl Into<Injected>) -> Self {
		Self::new(Design::new(), injected)
	}

	/// Adds bindings on top of the ones this value already carries.
	pub fn with_design(self, design: &Design) -> Self {
		Self {
			design: self.design.merge(design),
			injected: self.injected,
		}
	}

	/// Compiles an expression tree whose leaves may carry overrides.
	pub fn eval(expr: &Expr) -> Self {
		expr::eval(expr, &DesignedApplicative)
	}

	pub fn proxy(self) -> Expr {
		Expr::object(Value::new(self))
	}
}

impl From<Injected> for Designed {
	fn from(injected: Injected) -> Self {
		Self::bare(injected)
	}
}

/// Interprets expression trees as [`Designed`] values. Zipping merges the
/// operands' designs left to right.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesignedApplicative;

impl Applicative for DesignedApplicative {
	type Target = Designed;

	fn pure(&self, value: Value) -> Designed {
		Designed::bare(Injected::Pure(value))
	}

	fn lift(&self, value: &Value) -> Option<Designed> {
		if let Some(designed) = value.downcast_ref::<Designed>() {
			return Some(designed.clone());
		}
		value.downcast_ref::<Injected>().cloned().map(Designed::bare)
	}

	fn map(&self, target: Designed, transform: Transform) -> Designed {
		Designed {
			design: target.design,
			injected: target.injected.map_with(transform),
		}
	}

	fn zip(&self, targets: Vec<Designed>) -> Designed {
		let mut design = Design::new();
		let mut injected = Vec::with_capacity(targets.len());
		for target in targets {
			design = design.merge(&target.design);
			injected.push(target.injected);
		}
		Designed {
			design,
			injected: Injected::combine(injected),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::design::Binding;
	use crate::key::Key;
	use rstest::rstest;

	#[rstest]
	fn test_zip_merges_designs_left_to_right() {
		// Arrange
		let left = Designed::new(
			Design::new().bind_instance("x", 1i64),
			Injected::by_name("x"),
		)
		.proxy();
		let right = Designed::new(
			Design::new().bind_instance("x", 2i64).bind_instance("y", 3i64),
			Injected::by_name("y"),
		)
		.proxy();
		let pair = Expr::object(Value::new(Injected::by_name("f"))).call([left, right]);

		// Act
		let designed = Designed::eval(&pair);

		// Assert
		match designed.design.get("x") {
			Some(Binding::Instance(value)) => assert_eq!(*value.downcast_ref::<i64>().unwrap(), 2),
			other => panic!("unexpected binding {:?}", other),
		}
		let deps: Vec<Key> = designed.injected.dependencies().into_iter().collect();
		assert_eq!(deps, vec![Key::from("f"), Key::from("x"), Key::from("y")]);
	}

	#[rstest]
	fn test_plain_injected_lifts_with_empty_design() {
		let designed = Designed::eval(&Injected::by_name("a").proxy().attr("b"));
		assert!(designed.design.is_empty());
		assert_eq!(designed.injected.dependencies().len(), 1);
	}

	#[rstest]
	fn test_with_design_layers_overrides() {
		let designed = Designed::bare(Injected::by_name("a"))
			.with_design(&Design::new().bind_instance("a", 1i64));
		assert!(designed.design.contains("a"));
	}
}
