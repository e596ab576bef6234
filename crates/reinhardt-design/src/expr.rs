//! Expression trees and the applicative evaluator
//!
//! An [`Expr`] records calls, attribute reads and indexing against a value
//! that may not exist yet. [`eval`] later interprets the tree against an
//! [`Applicative`], which decides what "a value" means: a dependency
//! expression ([`InjectedApplicative`]) or a designed value
//! ([`crate::DesignedApplicative`]).
//!
//! # Examples
//!
//! ```
//! use reinhardt_design::{Expr, Function, Injected, Key, Value};
//!
//! let connect = Value::function(Function::new(|args, _| {
//!     let url = args[0].downcast_ref::<String>().cloned().unwrap_or_default();
//!     Ok(Value::new(format!("connected to {}", url)))
//! }));
//!
//! let expr = Expr::object(connect).call([Injected::by_name("config").proxy().attr("url")]);
//! let injected = Injected::eval(expr);
//! assert_eq!(injected.dependencies().into_iter().collect::<Vec<_>>(), vec![Key::from("config")]);
//! ```

use crate::error::BoxError;
use crate::injected::{Injected, Transform};
use crate::value::{ExpressionError, Value};
use indexmap::IndexMap;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::sync::Arc;

/// Node of an expression tree.
pub enum ExprNode {
	Object(Value),
	Call {
		func: Expr,
		args: Vec<Expr>,
		kwargs: IndexMap<String, Expr>,
	},
	Attribute {
		node: Expr,
		name: String,
	},
	Index {
		node: Expr,
		key: Expr,
	},
}

/// Immutable, cheaply clonable expression tree.
///
/// Equality and hashing are structural; wrapped objects compare by identity.
#[derive(Clone)]
pub struct Expr(Arc<ExprNode>);

impl Expr {
	pub fn new(node: ExprNode) -> Self {
		Self(Arc::new(node))
	}

	pub fn object(value: Value) -> Self {
		Self::new(ExprNode::Object(value))
	}

	pub fn value<T: Any + Send + Sync>(value: T) -> Self {
		Self::object(Value::new(value))
	}

	pub fn node(&self) -> &ExprNode {
		&self.0
	}

	/// Records a call with positional arguments.
	pub fn call<A: Into<Expr>>(&self, args: impl IntoIterator<Item = A>) -> Self {
		self.call_with(args, Vec::<(String, Expr)>::new())
	}

	pub fn call_with<A, N, K>(
		&self,
		args: impl IntoIterator<Item = A>,
		kwargs: impl IntoIterator<Item = (N, K)>,
	) -> Self
	where
		A: Into<Expr>,
		N: Into<String>,
		K: Into<Expr>,
	{
		Self::new(ExprNode::Call {
			func: self.clone(),
			args: args.into_iter().map(Into::into).collect(),
			kwargs: kwargs
				.into_iter()
				.map(|(name, arg)| (name.into(), arg.into()))
				.collect(),
		})
	}

	/// Records an attribute read.
	pub fn attr(&self, name: impl Into<String>) -> Self {
		Self::new(ExprNode::Attribute {
			node: self.clone(),
			name: name.into(),
		})
	}

	/// Records an index or key lookup. Negative integers count from the end.
	pub fn index(&self, key: impl Into<Expr>) -> Self {
		Self::new(ExprNode::Index {
			node: self.clone(),
			key: key.into(),
		})
	}
}

impl From<Value> for Expr {
	fn from(value: Value) -> Self {
		Self::object(value)
	}
}

impl From<Injected> for Expr {
	fn from(injected: Injected) -> Self {
		Self::object(Value::new(injected))
	}
}

impl From<&Expr> for Expr {
	fn from(expr: &Expr) -> Self {
		expr.clone()
	}
}

impl PartialEq for Expr {
	fn eq(&self, other: &Self) -> bool {
		if Arc::ptr_eq(&self.0, &other.0) {
			return true;
		}
		match (self.node(), other.node()) {
			(ExprNode::Object(a), ExprNode::Object(b)) => a.ptr_eq(b),
			(
				ExprNode::Call {
					func: f1,
					args: a1,
					kwargs: k1,
				},
				ExprNode::Call {
					func: f2,
					args: a2,
					kwargs: k2,
				},
			) => f1 == f2 && a1 == a2 && k1.len() == k2.len() && k1.iter().eq(k2.iter()),
			(
				ExprNode::Attribute { node: n1, name: m1 },
				ExprNode::Attribute { node: n2, name: m2 },
			) => m1 == m2 && n1 == n2,
			(ExprNode::Index { node: n1, key: k1 }, ExprNode::Index { node: n2, key: k2 }) => {
				n1 == n2 && k1 == k2
			}
			_ => false,
		}
	}
}

impl Eq for Expr {}

impl Hash for Expr {
	fn hash<H: Hasher>(&self, state: &mut H) {
		let node = self.node();
		mem::discriminant(node).hash(state);
		match node {
			ExprNode::Object(value) => value.addr().hash(state),
			ExprNode::Call { func, args, kwargs } => {
				func.hash(state);
				args.hash(state);
				for (name, arg) in kwargs {
					name.hash(state);
					arg.hash(state);
				}
			}
			ExprNode::Attribute { node, name } => {
				node.hash(state);
				name.hash(state);
			}
			ExprNode::Index { node, key } => {
				node.hash(state);
				key.hash(state);
			}
		}
	}
}

impl fmt::Debug for Expr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

impl fmt::Display for Expr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.node() {
			ExprNode::Object(value) => match value.downcast_ref::<Injected>() {
				Some(Injected::ByName(key)) => write!(f, "<{}>", key),
				Some(injected) => write!(f, "<{}>", injected.kind()),
				None => write!(f, "{}", value.type_name()),
			},
			ExprNode::Call { func, args, kwargs } => {
				write!(f, "{}(", func)?;
				let mut first = true;
				for arg in args {
					if !first {
						f.write_str(", ")?;
					}
					first = false;
					write!(f, "{}", arg)?;
				}
				for (name, arg) in kwargs {
					if !first {
						f.write_str(", ")?;
					}
					first = false;
					write!(f, "{}={}", name, arg)?;
				}
				f.write_str(")")
			}
			ExprNode::Attribute { node, name } => write!(f, "{}.{}", node, name),
			ExprNode::Index { node, key } => write!(f, "{}[{}]", node, key),
		}
	}
}

/// Target abstraction an expression tree is interpreted into.
///
/// `zip` must produce a target whose value is the `Vec<Value>` of the zipped
/// targets' values, in order.
pub trait Applicative {
	type Target: Clone;

	fn pure(&self, value: Value) -> Self::Target;

	/// Returns the value unchanged if it already is a `Target`.
	fn lift(&self, value: &Value) -> Option<Self::Target>;

	fn map(&self, target: Self::Target, transform: Transform) -> Self::Target;

	fn zip(&self, targets: Vec<Self::Target>) -> Self::Target;
}

/// Interprets `expr` against `applicative`.
pub fn eval<A: Applicative + ?Sized>(expr: &Expr, applicative: &A) -> A::Target {
	match expr.node() {
		ExprNode::Object(value) => applicative
			.lift(value)
			.unwrap_or_else(|| applicative.pure(value.clone())),
		ExprNode::Attribute { node, name } => {
			let target = eval(node, applicative);
			let name = name.clone();
			applicative.map(
				target,
				Transform::new(move |value| value.attr(&name).map_err(BoxError::from)),
			)
		}
		ExprNode::Index { node, key } => {
			let zipped = applicative.zip(vec![eval(node, applicative), eval(key, applicative)]);
			applicative.map(
				zipped,
				Transform::new(|value| {
					let parts = unpack(&value, 2)?;
					parts[0].index(&parts[1]).map_err(BoxError::from)
				}),
			)
		}
		ExprNode::Call { func, args, kwargs } => {
			let mut targets = Vec::with_capacity(1 + args.len() + kwargs.len());
			targets.push(eval(func, applicative));
			targets.extend(args.iter().map(|arg| eval(arg, applicative)));
			targets.extend(kwargs.values().map(|arg| eval(arg, applicative)));
			let positional = args.len();
			let names: Vec<String> = kwargs.keys().cloned().collect();
			applicative.map(
				applicative.zip(targets),
				Transform::new(move |value| {
					let parts = unpack(&value, 1 + positional + names.len())?;
					let (func, rest) = parts.split_at(1);
					let (args, named) = rest.split_at(positional);
					let kwargs: IndexMap<String, Value> =
						names.iter().cloned().zip(named.iter().cloned()).collect();
					func[0].call(args, &kwargs)
				}),
			)
		}
	}
}

fn unpack(value: &Value, len: usize) -> Result<&[Value], BoxError> {
	match value.downcast_ref::<Vec<Value>>() {
		Some(parts) if parts.len() == len => Ok(parts),
		_ => Err(Box::new(ExpressionError::Shape {
			expected: "zipped operands",
			found: value.type_name(),
		})),
	}
}

/// Interprets expression trees as [`Injected`] values.
#[derive(Debug, Clone, Copy, Default)]
pub struct InjectedApplicative;

impl Applicative for InjectedApplicative {
	type Target = Injected;

	fn pure(&self, value: Value) -> Injected {
		Injected::Pure(value)
	}

	fn lift(&self, value: &Value) -> Option<Injected> {
		value.downcast_ref::<Injected>().cloned()
	}

	fn map(&self, target: Injected, transform: Transform) -> Injected {
		target.map_with(transform)
	}

	fn zip(&self, targets: Vec<Injected>) -> Injected {
		Injected::combine(targets)
	}
}
