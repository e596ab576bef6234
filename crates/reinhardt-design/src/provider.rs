//! Providers, resolved dependency maps and the `Injectable` trait

use crate::error::{BoxError, DiError, DiResult};
use crate::key::Key;
use crate::value::Value;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Resolved values handed to a provider, keyed by dependency name.
#[derive(Clone, Default)]
pub struct Dependencies {
	values: Arc<HashMap<Key, Value>>,
}

impl Dependencies {
	/// Creates an empty map.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the value for `key`, replacing any previous one.
	pub fn insert(&mut self, key: impl Into<Key>, value: Value) {
		Arc::make_mut(&mut self.values).insert(key.into(), value);
	}

	/// Builder form of [`Dependencies::insert`].
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_design::{Dependencies, Value};
	///
	/// let deps = Dependencies::new()
	///     .with("host", Value::new("localhost".to_string()))
	///     .with("port", Value::new(5432u16));
	/// assert_eq!(deps.len(), 2);
	/// assert!(deps.contains("host"));
	/// ```
	pub fn with(mut self, key: impl Into<Key>, value: Value) -> Self {
		self.insert(key, value);
		self
	}

	/// The erased value for `key`, if one was supplied.
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.values.get(key)
	}

	pub fn contains(&self, key: &str) -> bool {
		self.values.contains_key(key)
	}

	/// Returns the value for `key`, failing if the provider was not given it.
	pub fn value(&self, key: &str) -> DiResult<Value> {
		self.get(key)
			.cloned()
			.ok_or_else(|| DiError::MissingInput(Key::from(key)))
	}

	/// Returns the value for `key` as a shared `T`.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_design::{Dependencies, Value};
	///
	/// let deps = Dependencies::new().with("port", Value::new(8080u16));
	/// assert_eq!(*deps.get_as::<u16>("port").unwrap(), 8080);
	/// assert!(deps.get_as::<String>("port").is_err());
	/// ```
	pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> DiResult<Arc<T>> {
		self.value(key)?
			.downcast::<T>()
			.ok_or_else(|| DiError::TypeMismatch {
				key: Key::from(key),
				expected: type_name::<T>(),
			})
	}

	/// Returns an owned copy of the value for `key`.
	pub fn cloned<T: Any + Send + Sync + Clone>(&self, key: &str) -> DiResult<T> {
		let value = self.value(key)?;
		value
			.downcast_ref::<T>()
			.cloned()
			.ok_or_else(|| DiError::TypeMismatch {
				key: Key::from(key),
				expected: type_name::<T>(),
			})
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	pub fn keys(&self) -> impl Iterator<Item = &Key> {
		self.values.keys()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
		self.values.iter()
	}
}

impl FromIterator<(Key, Value)> for Dependencies {
	fn from_iter<I: IntoIterator<Item = (Key, Value)>>(iter: I) -> Self {
		Self {
			values: Arc::new(iter.into_iter().collect()),
		}
	}
}

impl fmt::Debug for Dependencies {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut keys: Vec<&Key> = self.values.keys().collect();
		keys.sort();
		f.debug_struct("Dependencies").field("keys", &keys).finish()
	}
}

type InvokeFn = dyn Fn(Dependencies) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync;
pub(crate) type ReleaseFn = dyn Fn(Value) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync;

/// Function producing a value from its named dependencies.
///
/// The parameter list is declared explicitly and is exactly the set of keys
/// the provider needs. [`crate::provider!`] and [`crate::async_provider!`]
/// derive it from a closure's parameter names.
#[derive(Clone)]
pub struct Provider {
	name: Arc<str>,
	params: Arc<[Key]>,
	invoke: Arc<InvokeFn>,
	release: Option<Arc<ReleaseFn>>,
	symbol: Option<Arc<str>>,
}

impl Provider {
	/// Creates a provider from an asynchronous function.
	pub fn new<F, Fut, K>(
		name: impl AsRef<str>,
		params: impl IntoIterator<Item = K>,
		func: F,
	) -> Self
	where
		F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
		K: Into<Key>,
	{
		Self {
			name: Arc::from(name.as_ref()),
			params: params.into_iter().map(Into::into).collect(),
			invoke: Arc::new(move |deps| func(deps).boxed()),
			release: None,
			symbol: None,
		}
	}

	/// Creates a provider from a synchronous function.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_design::{Provider, Value};
	///
	/// let sum = Provider::sync("sum", ["a", "b"], |deps| {
	///     let a = deps.cloned::<i64>("a")?;
	///     let b = deps.cloned::<i64>("b")?;
	///     Ok(Value::new(a + b))
	/// });
	/// assert_eq!(sum.params().len(), 2);
	/// ```
	pub fn sync<F, K>(name: impl AsRef<str>, params: impl IntoIterator<Item = K>, func: F) -> Self
	where
		F: Fn(&Dependencies) -> Result<Value, BoxError> + Send + Sync + 'static,
		K: Into<Key>,
	{
		Self::new(name, params, move |deps: Dependencies| {
			futures::future::ready(func(&deps))
		})
	}

	/// Creates a provider whose work runs on the blocking thread pool.
	pub fn blocking<F, K>(
		name: impl AsRef<str>,
		params: impl IntoIterator<Item = K>,
		func: F,
	) -> Self
	where
		F: Fn(Dependencies) -> Result<Value, BoxError> + Send + Sync + 'static,
		K: Into<Key>,
	{
		let func = Arc::new(func);
		Self::new(name, params, move |deps: Dependencies| {
			let func = Arc::clone(&func);
			async move {
				tokio::task::spawn_blocking(move || func(deps))
					.await
					.map_err(|e| Box::new(e) as BoxError)?
			}
		})
	}

	/// Creates a provider for a resource that must be released when the
	/// scope that constructed it is closed.
	pub fn resource<F, Fut, R, RFut, K>(
		name: impl AsRef<str>,
		params: impl IntoIterator<Item = K>,
		acquire: F,
		release: R,
	) -> Self
	where
		F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
		R: Fn(Value) -> RFut + Send + Sync + 'static,
		RFut: Future<Output = Result<(), BoxError>> + Send + 'static,
		K: Into<Key>,
	{
		Self::new(name, params, acquire).with_release(release)
	}

	/// Adds a release step run on each value this provider builds when the
	/// scope that built it closes.
	pub fn with_release<R, RFut>(mut self, release: R) -> Self
	where
		R: Fn(Value) -> RFut + Send + Sync + 'static,
		RFut: Future<Output = Result<(), BoxError>> + Send + 'static,
	{
		self.release = Some(Arc::new(move |value| release(value).boxed()));
		self
	}

	/// Names the provider for manifests; the same symbol must be registered
	/// in the [`crate::ProviderCatalog`] on the receiving side.
	pub fn with_symbol(mut self, symbol: impl AsRef<str>) -> Self {
		self.symbol = Some(Arc::from(symbol.as_ref()));
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Dependency keys, in declaration order.
	pub fn params(&self) -> &[Key] {
		&self.params
	}

	pub fn symbol(&self) -> Option<&str> {
		self.symbol.as_deref()
	}

	/// Returns `true` for resource providers.
	pub fn has_release(&self) -> bool {
		self.release.is_some()
	}

	pub(crate) fn release_fn(&self) -> Option<Arc<ReleaseFn>> {
		self.release.clone()
	}

	/// Runs the provider. `deps` must hold every key in [`Provider::params`].
	pub fn invoke(&self, deps: Dependencies) -> BoxFuture<'static, Result<Value, BoxError>> {
		(self.invoke)(deps)
	}
}

impl fmt::Debug for Provider {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Provider")
			.field("name", &self.name)
			.field("params", &self.params)
			.field("symbol", &self.symbol)
			.finish()
	}
}

/// Release step registered for a constructed resource.
#[derive(Clone)]
pub struct Teardown {
	release: Arc<ReleaseFn>,
}

impl Teardown {
	pub(crate) fn new(release: Arc<ReleaseFn>) -> Self {
		Self { release }
	}

	/// Creates a teardown from an asynchronous release function.
	pub fn from_fn<R, RFut>(release: R) -> Self
	where
		R: Fn(Value) -> RFut + Send + Sync + 'static,
		RFut: Future<Output = Result<(), BoxError>> + Send + 'static,
	{
		Self::new(Arc::new(move |value| release(value).boxed()))
	}

	/// Releases `value`.
	pub fn run(&self, value: Value) -> BoxFuture<'static, Result<(), BoxError>> {
		(self.release)(value)
	}
}

impl fmt::Debug for Teardown {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Teardown")
	}
}

/// Receives every value built by a resource provider together with its
/// release step.
///
/// Passed to [`Injected::provide_registering`](crate::Injected::provide_registering);
/// `provider` is the name of the provider that built `value`.
pub trait ResourceRegistry: Send + Sync {
	fn register(&self, provider: &str, value: Value, teardown: Teardown);
}

/// Injectable trait for class bindings.
///
/// `dependencies` lists the constructor's parameters (never the receiver);
/// `inject` builds the value from their resolved values.
///
/// # Example
///
/// ```rust,no_run
/// use reinhardt_design::{BoxError, Dependencies, Injectable, Key};
/// use async_trait::async_trait;
///
/// struct UserService {
///     db_url: String,
/// }
///
/// #[async_trait]
/// impl Injectable for UserService {
///     fn dependencies() -> Vec<Key> {
///         vec![Key::from("db_url")]
///     }
///
///     async fn inject(deps: &Dependencies) -> Result<Self, BoxError> {
///         Ok(UserService {
///             db_url: deps.cloned::<String>("db_url")?,
///         })
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Injectable: Sized + Send + Sync + 'static {
	fn dependencies() -> Vec<Key>;

	async fn inject(deps: &Dependencies) -> Result<Self, BoxError>;
}

/// Constructor binding derived from an [`Injectable`] type.
#[derive(Clone, Debug)]
pub struct ClassBinding {
	type_name: &'static str,
	provider: Provider,
}

impl ClassBinding {
	/// Class binding built from `T`'s [`Injectable`] implementation.
	pub fn of<T: Injectable>() -> Self {
		let type_name = type_name::<T>();
		let provider = Provider::new(type_name, T::dependencies(), |deps: Dependencies| async move {
			T::inject(&deps).await.map(Value::new)
		})
		.with_symbol(type_name);
		Self {
			type_name,
			provider,
		}
	}

	pub fn type_name(&self) -> &'static str {
		self.type_name
	}

	pub fn dependencies(&self) -> &[Key] {
		self.provider.params()
	}

	pub fn provider(&self) -> &Provider {
		&self.provider
	}
}

/// Builds a synchronous [`Provider`] from a closure, taking the dependency
/// keys from the closure's parameter names.
///
/// # Examples
///
/// ```
/// use reinhardt_design::{Injected, Key, provider};
///
/// let sum = provider!("sum", |a: i64, b: i64| a + b);
/// let deps = Injected::from_function(sum).dependencies();
/// assert!(deps.contains(&Key::from("a")));
/// assert!(deps.contains(&Key::from("b")));
/// ```
#[macro_export]
macro_rules! provider {
	(|$($arg:ident : $ty:ty),* $(,)?| $body:expr) => {
		$crate::provider!("anonymous", |$($arg: $ty),*| $body)
	};
	(|| $body:expr) => {
		$crate::provider!("anonymous", || $body)
	};
	($name:expr, |$($arg:ident : $ty:ty),* $(,)?| $body:expr) => {{
		let params: ::std::vec::Vec<$crate::Key> =
			::std::vec![$($crate::Key::from(stringify!($arg))),*];
		$crate::Provider::sync($name, params, move |__deps: &$crate::Dependencies| {
			$(let $arg: $ty = __deps.cloned::<$ty>(stringify!($arg))?;)*
			::std::result::Result::Ok($crate::Value::new($body))
		})
	}};
	($name:expr, || $body:expr) => {
		$crate::provider!($name, | | $body)
	};
}

/// Builds an asynchronous [`Provider`] from a closure-like block.
///
/// The block may `.await` and use `?`; its value becomes the provided value.
/// Captured variables must be `Copy` or cloned into the block.
///
/// # Examples
///
/// ```
/// use reinhardt_design::async_provider;
///
/// let doubled = async_provider!("doubled", |base: i64| {
///     tokio::task::yield_now().await;
///     base * 2
/// });
/// assert_eq!(doubled.name(), "doubled");
/// ```
#[macro_export]
macro_rules! async_provider {
	(|$($arg:ident : $ty:ty),* $(,)?| $body:block) => {
		$crate::async_provider!("anonymous", |$($arg: $ty),*| $body)
	};
	(|| $body:block) => {
		$crate::async_provider!("anonymous", | | $body)
	};
	($name:expr, |$($arg:ident : $ty:ty),* $(,)?| $body:block) => {{
		let params: ::std::vec::Vec<$crate::Key> =
			::std::vec![$($crate::Key::from(stringify!($arg))),*];
		$crate::Provider::new($name, params, move |__deps: $crate::Dependencies| async move {
			$(let $arg: $ty = __deps.cloned::<$ty>(stringify!($arg))?;)*
			let __value = $body;
			::std::result::Result::Ok::<_, $crate::BoxError>($crate::Value::new(__value))
		})
	}};
	($name:expr, || $body:block) => {
		$crate::async_provider!($name, | | $body)
	};
}
