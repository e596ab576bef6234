//! Type-erased values flowing through the resolver
//!
//! A [`Value`] is a cheaply clonable handle to any `Send + Sync` value.
//! Values that implement [`Object`] additionally support attribute reads,
//! indexing and calls, which is what the expression evaluator
//! ([`crate::expr`]) relies on.

use crate::error::BoxError;
use downcast_rs::{Downcast, DowncastSync, impl_downcast};
use indexmap::IndexMap;
use serde::Serialize;
use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Failure while reading an attribute, indexing or calling a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
	#[error("'{type_name}' has no attribute '{name}'")]
	NoAttribute {
		type_name: &'static str,
		name: String,
	},
	#[error("'{type_name}' cannot be indexed by {key}")]
	NotIndexable {
		type_name: &'static str,
		key: String,
	},
	#[error("'{0}' is not callable")]
	NotCallable(&'static str),
	#[error("expected {expected}, found '{found}'")]
	Shape {
		expected: &'static str,
		found: &'static str,
	},
}

/// Behaviour a value exposes to the expression evaluator.
///
/// Every method has a default that reports the operation as unsupported, so
/// implementors only override what their type actually offers.
///
/// # Examples
///
/// ```
/// use reinhardt_design::{Object, Value};
///
/// struct Settings {
///     url: String,
/// }
///
/// impl Object for Settings {
///     fn attr(&self, name: &str) -> Option<Value> {
///         match name {
///             "url" => Some(Value::new(self.url.clone())),
///             _ => None,
///         }
///     }
/// }
///
/// let settings = Value::object(Settings { url: "sqlite::memory:".into() });
/// let url = settings.attr("url").unwrap();
/// assert_eq!(url.downcast_ref::<String>().unwrap(), "sqlite::memory:");
/// ```
pub trait Object: DowncastSync {
	fn type_name(&self) -> &'static str {
		type_name::<Self>()
	}

	fn attr(&self, _name: &str) -> Option<Value> {
		None
	}

	fn index(&self, _key: &Value) -> Option<Value> {
		None
	}

	fn call(&self, _args: &[Value], _kwargs: &IndexMap<String, Value>) -> Result<Value, BoxError> {
		Err(Box::new(ExpressionError::NotCallable(Object::type_name(self))))
	}
}
impl_downcast!(sync Object);

/// JSON form of a value created through [`Value::serializable`].
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
	pub type_tag: String,
	pub json: serde_json::Value,
}

#[derive(Clone)]
enum Repr {
	Plain(Arc<dyn Any + Send + Sync>),
	Object(Arc<dyn Object>),
}

/// Shared, type-erased value.
#[derive(Clone)]
pub struct Value {
	repr: Repr,
	type_name: &'static str,
	snapshot: Option<Arc<Snapshot>>,
}

impl Value {
	/// Wraps any `Send + Sync` value.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_design::Value;
	///
	/// let value = Value::new(42i64);
	/// assert_eq!(*value.downcast_ref::<i64>().unwrap(), 42);
	/// assert!(value.downcast_ref::<i32>().is_none());
	/// ```
	pub fn new<T: Any + Send + Sync>(value: T) -> Self {
		Self::from_arc(Arc::new(value))
	}

	pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
		Self {
			repr: Repr::Plain(value),
			type_name: type_name::<T>(),
			snapshot: None,
		}
	}

	/// Wraps a value that supports attribute, index or call operations.
	pub fn object<T: Object>(value: T) -> Self {
		Self {
			repr: Repr::Object(Arc::new(value)),
			type_name: type_name::<T>(),
			snapshot: None,
		}
	}

	/// Wraps a callable.
	pub fn function(function: Function) -> Self {
		Self::object(function)
	}

	/// Wraps a value and records its JSON form so it can be written into a
	/// manifest.
	pub fn serializable<T: Serialize + Any + Send + Sync>(
		value: T,
	) -> Result<Self, serde_json::Error> {
		let json = serde_json::to_value(&value)?;
		let mut wrapped = Self::new(value);
		wrapped.snapshot = Some(Arc::new(Snapshot {
			type_tag: type_name::<T>().to_string(),
			json,
		}));
		Ok(wrapped)
	}

	pub(crate) fn with_snapshot(mut self, snapshot: Snapshot) -> Self {
		self.snapshot = Some(Arc::new(snapshot));
		self
	}

	/// The `()` value.
	pub fn unit() -> Self {
		Self::new(())
	}

	pub fn type_name(&self) -> &'static str {
		self.type_name
	}

	pub fn snapshot(&self) -> Option<&Snapshot> {
		self.snapshot.as_deref()
	}

	pub fn is<T: Any>(&self) -> bool {
		self.downcast_ref::<T>().is_some()
	}

	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		match &self.repr {
			Repr::Plain(inner) => inner.downcast_ref::<T>(),
			Repr::Object(inner) => Downcast::as_any(&**inner).downcast_ref::<T>(),
		}
	}

	/// Shared handle to the inner `T`, without copying it.
	pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
		match &self.repr {
			Repr::Plain(inner) => inner.clone().downcast::<T>().ok(),
			Repr::Object(inner) => DowncastSync::into_any_arc(inner.clone())
				.downcast::<T>()
				.ok(),
		}
	}

	/// Returns `true` when both handles point at the same allocation.
	pub fn ptr_eq(&self, other: &Value) -> bool {
		self.addr() == other.addr()
	}

	pub(crate) fn addr(&self) -> usize {
		match &self.repr {
			Repr::Plain(inner) => Arc::as_ptr(inner) as *const () as usize,
			Repr::Object(inner) => Arc::as_ptr(inner) as *const () as usize,
		}
	}

	/// Reads a named attribute.
	///
	/// Objects answer through [`Object::attr`]; string-keyed maps of values
	/// expose their entries as attributes.
	pub fn attr(&self, name: &str) -> Result<Value, ExpressionError> {
		let found = match &self.repr {
			Repr::Object(inner) => inner.attr(name),
			Repr::Plain(_) => self.map_entry(name),
		};
		found.ok_or_else(|| ExpressionError::NoAttribute {
			type_name: self.type_name,
			name: name.to_string(),
		})
	}

	/// Indexes into the value.
	///
	/// Sequences of values accept integer keys (negative keys count from the
	/// end); string-keyed maps of values accept string keys.
	pub fn index(&self, key: &Value) -> Result<Value, ExpressionError> {
		let found = match &self.repr {
			Repr::Object(inner) => inner.index(key),
			Repr::Plain(_) => self.sequence_item(key).or_else(|| {
				key.as_str_key()
					.and_then(|name| self.map_entry(&name))
			}),
		};
		found.ok_or_else(|| ExpressionError::NotIndexable {
			type_name: self.type_name,
			key: key.describe(),
		})
	}

	/// Calls the value with positional and named arguments.
	pub fn call(
		&self,
		args: &[Value],
		kwargs: &IndexMap<String, Value>,
	) -> Result<Value, BoxError> {
		match &self.repr {
			Repr::Object(inner) => inner.call(args, kwargs),
			Repr::Plain(_) => Err(Box::new(ExpressionError::NotCallable(self.type_name))),
		}
	}

	fn map_entry(&self, name: &str) -> Option<Value> {
		if let Some(map) = self.downcast_ref::<IndexMap<String, Value>>() {
			return map.get(name).cloned();
		}
		self.downcast_ref::<HashMap<String, Value>>()
			.and_then(|map| map.get(name).cloned())
	}

	fn sequence_item(&self, key: &Value) -> Option<Value> {
		let items = self.downcast_ref::<Vec<Value>>()?;
		let position = key.as_index()?;
		let len = items.len() as i64;
		let position = if position < 0 { len + position } else { position };
		if (0..len).contains(&position) {
			items.get(position as usize).cloned()
		} else {
			None
		}
	}

	fn as_index(&self) -> Option<i64> {
		if let Some(v) = self.downcast_ref::<i64>() {
			return Some(*v);
		}
		if let Some(v) = self.downcast_ref::<i32>() {
			return Some(i64::from(*v));
		}
		if let Some(v) = self.downcast_ref::<u32>() {
			return Some(i64::from(*v));
		}
		self.downcast_ref::<usize>()
			.and_then(|v| i64::try_from(*v).ok())
	}

	fn as_str_key(&self) -> Option<String> {
		if let Some(s) = self.downcast_ref::<String>() {
			return Some(s.clone());
		}
		self.downcast_ref::<&'static str>().map(|s| s.to_string())
	}

	fn describe(&self) -> String {
		if let Some(i) = self.as_index() {
			return i.to_string();
		}
		match self.as_str_key() {
			Some(s) => format!("{:?}", s),
			None => format!("<{}>", self.type_name),
		}
	}
}

impl fmt::Debug for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Value<{}>", self.type_name)
	}
}

impl From<Function> for Value {
	fn from(function: Function) -> Self {
		Self::function(function)
	}
}

type CallFn = dyn Fn(&[Value], &IndexMap<String, Value>) -> Result<Value, BoxError> + Send + Sync;

/// Callable value usable in `Call` expression nodes.
///
/// A function registered under a symbol can be written into a manifest and
/// looked up again in a [`crate::ProviderCatalog`].
#[derive(Clone)]
pub struct Function {
	symbol: Option<Arc<str>>,
	func: Arc<CallFn>,
}

impl Function {
	pub fn new<F>(func: F) -> Self
	where
		F: Fn(&[Value], &IndexMap<String, Value>) -> Result<Value, BoxError>
			+ Send
			+ Sync
			+ 'static,
	{
		Self {
			symbol: None,
			func: Arc::new(func),
		}
	}

	pub fn named<F>(symbol: impl AsRef<str>, func: F) -> Self
	where
		F: Fn(&[Value], &IndexMap<String, Value>) -> Result<Value, BoxError>
			+ Send
			+ Sync
			+ 'static,
	{
		Self {
			symbol: Some(Arc::from(symbol.as_ref())),
			func: Arc::new(func),
		}
	}

	pub fn symbol(&self) -> Option<&str> {
		self.symbol.as_deref()
	}

	pub fn invoke(
		&self,
		args: &[Value],
		kwargs: &IndexMap<String, Value>,
	) -> Result<Value, BoxError> {
		(self.func)(args, kwargs)
	}
}

impl fmt::Debug for Function {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Function")
			.field("symbol", &self.symbol)
			.finish()
	}
}

impl Object for Function {
	fn type_name(&self) -> &'static str {
		"Function"
	}

	fn call(&self, args: &[Value], kwargs: &IndexMap<String, Value>) -> Result<Value, BoxError> {
		self.invoke(args, kwargs)
	}
}
