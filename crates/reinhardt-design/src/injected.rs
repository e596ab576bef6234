//! Dependency expressions
//!
//! An [`Injected`] describes a value that needs named inputs. It can report
//! those inputs through [`Injected::dependencies`] without running anything,
//! and produce the value from already resolved inputs through
//! [`Injected::provide`].
//!
//! # Examples
//!
//! ```
//! use reinhardt_design::{Dependencies, Injected, Key, Value, provider};
//!
//! # tokio_test_block(async {
//! let greeting = Injected::from_function(provider!(|name: String| format!("hello {}", name)))
//!     .map(|value| {
//!         let text = value.downcast_ref::<String>().cloned().unwrap_or_default();
//!         Value::new(text.to_uppercase())
//!     });
//!
//! assert_eq!(greeting.dependencies().into_iter().collect::<Vec<_>>(), vec![Key::from("name")]);
//!
//! let deps = Dependencies::new().with("name", Value::new("ada".to_string()));
//! let value = greeting.provide(&deps).await.unwrap();
//! assert_eq!(value.downcast_ref::<String>().unwrap(), "HELLO ADA");
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use crate::error::{BoxError, DiError, DiResult};
use crate::expr::{self, Expr, InjectedApplicative};
use crate::key::Key;
use crate::provider::{Dependencies, Provider, ResourceRegistry, Teardown};
use crate::value::Value;
use futures::future::{self, BoxFuture, TryFutureExt};
use futures::FutureExt;
use indexmap::IndexMap;
use std::any::{Any, type_name};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

type TransformFn = dyn Fn(Value) -> Result<Value, BoxError> + Send + Sync;

/// Function applied to the output of another expression.
#[derive(Clone)]
pub struct Transform {
	symbol: Option<Arc<str>>,
	func: Arc<TransformFn>,
}

impl Transform {
	pub fn new<F>(func: F) -> Self
	where
		F: Fn(Value) -> Result<Value, BoxError> + Send + Sync + 'static,
	{
		Self {
			symbol: None,
			func: Arc::new(func),
		}
	}

	/// Creates a transform that can be written into a manifest under `symbol`.
	pub fn named<F>(symbol: impl AsRef<str>, func: F) -> Self
	where
		F: Fn(Value) -> Result<Value, BoxError> + Send + Sync + 'static,
	{
		Self {
			symbol: Some(Arc::from(symbol.as_ref())),
			func: Arc::new(func),
		}
	}

	pub fn symbol(&self) -> Option<&str> {
		self.symbol.as_deref()
	}

	pub fn apply(&self, value: Value) -> Result<Value, BoxError> {
		(self.func)(value)
	}

	fn label(&self) -> &str {
		self.symbol().unwrap_or("map")
	}
}

impl fmt::Debug for Transform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Transform")
			.field("symbol", &self.symbol)
			.finish()
	}
}

/// A value requiring named inputs.
#[derive(Clone)]
pub enum Injected {
	/// A constant; needs nothing
	Pure(Value),
	/// The value bound to another key
	ByName(Key),
	/// A provider call. Parameters missing from `mapping` are looked up by
	/// their own name.
	FromFunction {
		provider: Provider,
		mapping: Arc<IndexMap<Key, Injected>>,
	},
	Mapped {
		source: Arc<Injected>,
		transform: Transform,
	},
	/// Every source's value, in order, as a `Vec<Value>`
	Combined(Arc<[Injected]>),
	/// An expression tree compiled into a dependency expression
	Evaluated { expr: Expr, compiled: Arc<Injected> },
}

impl Injected {
	/// A constant that needs no inputs.
	pub fn pure(value: Value) -> Self {
		Self::Pure(value)
	}

	/// Shorthand for `Injected::pure(Value::new(value))`.
	pub fn value<T: Any + Send + Sync>(value: T) -> Self {
		Self::Pure(Value::new(value))
	}

	/// The value bound to `key`.
	pub fn by_name(key: impl Into<Key>) -> Self {
		Self::ByName(key.into())
	}

	/// Calls `provider` with each parameter looked up by its own name.
	pub fn from_function(provider: Provider) -> Self {
		Self::FromFunction {
			provider,
			mapping: Arc::new(IndexMap::new()),
		}
	}

	/// Calls `provider`, feeding the listed parameters from other expressions.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_design::{Injected, Key, provider};
	///
	/// let url = Injected::from_function_with(
	///     provider!(|host: String, port: u16| format!("{}:{}", host, port)),
	///     [("host", Injected::by_name("primary_host"))],
	/// );
	/// let deps: Vec<Key> = url.dependencies().into_iter().collect();
	/// assert_eq!(deps, vec![Key::from("port"), Key::from("primary_host")]);
	/// ```
	pub fn from_function_with<K: Into<Key>>(
		provider: Provider,
		mapping: impl IntoIterator<Item = (K, Injected)>,
	) -> Self {
		Self::FromFunction {
			provider,
			mapping: Arc::new(mapping.into_iter().map(|(k, v)| (k.into(), v)).collect()),
		}
	}

	/// Applies `func` to the value of this expression.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_design::{Injected, Value};
	///
	/// let doubled = Injected::by_name("n").map(|v| {
	///     Value::new(v.downcast_ref::<i64>().copied().unwrap_or_default() * 2)
	/// });
	/// assert_eq!(doubled.kind(), "mapped");
	/// ```
	pub fn map<F>(self, func: F) -> Self
	where
		F: Fn(Value) -> Value + Send + Sync + 'static,
	{
		self.map_with(Transform::new(move |value| Ok(func(value))))
	}

	/// Like [`Injected::map`] for a fallible function; an error fails the resolution.
	pub fn try_map<F>(self, func: F) -> Self
	where
		F: Fn(Value) -> Result<Value, BoxError> + Send + Sync + 'static,
	{
		self.map_with(Transform::new(func))
	}

	/// Maps the typed value behind this expression.
	///
	/// Resolving fails with [`DiError::TypeMismatch`] (wrapped as a provider
	/// failure) if the value is not a `T`.
	pub fn map_ref<T, U, F>(self, func: F) -> Self
	where
		T: Any + Send + Sync,
		U: Any + Send + Sync,
		F: Fn(&T) -> U + Send + Sync + 'static,
	{
		self.try_map(move |value| match value.downcast_ref::<T>() {
			Some(inner) => Ok(Value::new(func(inner))),
			None => Err(Box::new(DiError::TypeMismatch {
				key: Key::from(value.type_name()),
				expected: type_name::<T>(),
			}) as BoxError),
		})
	}

	pub fn map_with(self, transform: Transform) -> Self {
		Self::Mapped {
			source: Arc::new(self),
			transform,
		}
	}

	/// Combines expressions into one whose value is the `Vec<Value>` of
	/// their values.
	pub fn combine(sources: impl IntoIterator<Item = Injected>) -> Self {
		Self::Combined(sources.into_iter().collect())
	}

	/// Pair of this value and `other`'s, as a two-element `Vec<Value>`.
	pub fn zip(self, other: Injected) -> Self {
		Self::combine([self, other])
	}

	/// Compiles an expression tree into a dependency expression.
	pub fn eval(expr: Expr) -> Self {
		let compiled = expr::eval(&expr, &InjectedApplicative);
		Self::Evaluated {
			expr,
			compiled: Arc::new(compiled),
		}
	}

	/// Starts an expression tree rooted at this expression.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_design::{Injected, Key};
	///
	/// let port = Injected::eval(Injected::by_name("settings").proxy().attr("port"));
	/// assert!(port.dependencies().contains(&Key::from("settings")));
	/// ```
	pub fn proxy(self) -> Expr {
		Expr::from(self)
	}

	/// Keys this expression needs.
	pub fn dependencies(&self) -> BTreeSet<Key> {
		let mut keys = BTreeSet::new();
		self.collect_dependencies(&mut keys);
		keys
	}

	fn collect_dependencies(&self, keys: &mut BTreeSet<Key>) {
		match self {
			Self::Pure(_) => {}
			Self::ByName(key) => {
				keys.insert(key.clone());
			}
			Self::FromFunction { provider, mapping } => {
				for param in provider.params() {
					match mapping.get(param) {
						Some(injected) => injected.collect_dependencies(keys),
						None => {
							keys.insert(param.clone());
						}
					}
				}
			}
			Self::Mapped { source, .. } => source.collect_dependencies(keys),
			Self::Combined(sources) => {
				for source in sources.iter() {
					source.collect_dependencies(keys);
				}
			}
			Self::Evaluated { compiled, .. } => compiled.collect_dependencies(keys),
		}
	}

	/// Produces the value from resolved dependencies.
	///
	/// `deps` must hold a value for every key in [`Injected::dependencies`].
	/// Values built by resource providers are not tracked; use
	/// [`Injected::provide_registering`] when they must be released.
	pub fn provide(&self, deps: &Dependencies) -> BoxFuture<'static, DiResult<Value>> {
		self.provide_in(deps, None)
	}

	/// Like [`Injected::provide`], but hands every value built by a resource
	/// provider to `registry`, wherever that provider sits in the expression.
	///
	/// A resource is registered as soon as its provider returns, so it is
	/// tracked even if a later step of the expression fails.
	pub fn provide_registering(
		&self,
		deps: &Dependencies,
		registry: Arc<dyn ResourceRegistry>,
	) -> BoxFuture<'static, DiResult<Value>> {
		self.provide_in(deps, Some(&registry))
	}

	fn provide_in(
		&self,
		deps: &Dependencies,
		registry: Option<&Arc<dyn ResourceRegistry>>,
	) -> BoxFuture<'static, DiResult<Value>> {
		match self {
			Self::Pure(value) => future::ready(Ok(value.clone())).boxed(),
			Self::ByName(key) => future::ready(deps.value(key.as_str())).boxed(),
			Self::FromFunction { provider, mapping } => {
				let inputs: Vec<BoxFuture<'static, DiResult<(Key, Value)>>> = provider
					.params()
					.iter()
					.map(|param| {
						let name = param.clone();
						match mapping.get(param) {
							Some(injected) => injected
								.provide_in(deps, registry)
								.map_ok(move |value| (name, value))
								.boxed(),
							None => future::ready(deps.value(param.as_str()).map(|v| (name, v)))
								.boxed(),
						}
					})
					.collect();
				let provider = provider.clone();
				let registry = registry.cloned();
				async move {
					let arguments: Dependencies =
						future::try_join_all(inputs).await?.into_iter().collect();
					let value = provider
						.invoke(arguments)
						.await
						.map_err(|e| DiError::provider_failed(provider.name(), e))?;
					if let Some(release) = provider.release_fn()
						&& let Some(registry) = &registry
					{
						registry.register(provider.name(), value.clone(), Teardown::new(release));
					}
					Ok(value)
				}
				.boxed()
			}
			Self::Mapped { source, transform } => {
				let input = source.provide_in(deps, registry);
				let transform = transform.clone();
				async move {
					let value = input.await?;
					transform
						.apply(value)
						.map_err(|e| DiError::provider_failed(transform.label(), e))
				}
				.boxed()
			}
			Self::Combined(sources) => {
				let inputs: Vec<_> = sources
					.iter()
					.map(|source| source.provide_in(deps, registry))
					.collect();
				future::try_join_all(inputs)
					.map_ok(Value::new)
					.boxed()
			}
			Self::Evaluated { compiled, .. } => compiled.provide_in(deps, registry),
		}
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Self::Pure(_) => "pure",
			Self::ByName(_) => "by_name",
			Self::FromFunction { .. } => "from_function",
			Self::Mapped { .. } => "mapped",
			Self::Combined(_) => "combined",
			Self::Evaluated { .. } => "evaluated",
		}
	}
}

impl From<Provider> for Injected {
	fn from(provider: Provider) -> Self {
		Self::from_function(provider)
	}
}

impl fmt::Debug for Injected {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Pure(value) => f.debug_tuple("Pure").field(value).finish(),
			Self::ByName(key) => f.debug_tuple("ByName").field(key).finish(),
			Self::FromFunction { provider, mapping } => f
				.debug_struct("FromFunction")
				.field("provider", &provider.name())
				.field("mapping", mapping)
				.finish(),
			Self::Mapped { source, transform } => f
				.debug_struct("Mapped")
				.field("source", source)
				.field("transform", transform)
				.finish(),
			Self::Combined(sources) => f.debug_tuple("Combined").field(sources).finish(),
			Self::Evaluated { expr, .. } => f.debug_tuple("Evaluated").field(expr).finish(),
		}
	}
}
