//! Asynchronous resolver
//!
//! [`AsyncResolver`] turns a [`Design`] into values. Every key is built at
//! most once per scope; independent dependencies of a binding are resolved
//! concurrently, and the first failure among them cancels the rest.

use crate::config::ResolverConfig;
use crate::scope::{BindingSource, Scope};
use crate::trace::ResolutionTrace;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use reinhardt_design::{
	BuiltDesign, DIGraph, DependencyResolutionFailure, Dependencies, Design, Designed, DiError,
	DiResult, FailureCause, Injected, Key, MissingDependencies, Provider, ResourceRegistry,
	Teardown, Value,
};
use std::any::{Any, type_name};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Label used in errors for expressions resolved without a key.
const ANONYMOUS_TARGET: &str = "<target>";

/// What to resolve: a bound key or an ad-hoc expression.
#[derive(Clone, Debug)]
pub enum Target {
	Key(Key),
	Injected(Injected),
}

impl From<Key> for Target {
	fn from(key: Key) -> Self {
		Self::Key(key)
	}
}

impl From<&str> for Target {
	fn from(key: &str) -> Self {
		Self::Key(Key::from(key))
	}
}

impl From<String> for Target {
	fn from(key: String) -> Self {
		Self::Key(Key::from(key))
	}
}

impl From<Injected> for Target {
	fn from(injected: Injected) -> Self {
		Self::Injected(injected)
	}
}

impl From<Provider> for Target {
	fn from(provider: Provider) -> Self {
		Self::Injected(Injected::from(provider))
	}
}

/// Binding source backed by one design.
pub(crate) struct Engine {
	design: Design,
	built: BuiltDesign,
	graph: DIGraph,
	config: ResolverConfig,
}

impl Engine {
	fn new(design: Design, config: ResolverConfig) -> Self {
		let built = design.build();
		Self {
			graph: DIGraph::new(built.clone()),
			built,
			design,
			config,
		}
	}

	/// Static check of everything reachable from `roots`.
	///
	/// Unbound keys win over cycles: all of them are reported together.
	fn validate(&self, roots: impl IntoIterator<Item = Key>) -> DiResult<()> {
		let failures = self.graph.find_missing_dependencies(roots);
		let (unbound, cycles): (Vec<_>, Vec<_>) = failures
			.into_iter()
			.partition(|failure| failure.cause == FailureCause::Unbound);
		if !unbound.is_empty() {
			return Err(MissingDependencies::new(unbound).into());
		}
		match cycles.into_iter().next() {
			Some(cycle) => Err(DiError::CircularDependency { path: cycle.trace }),
			None => Ok(()),
		}
	}

	/// Resolves the dependencies of `injected` in `scope`, then runs it.
	///
	/// The result is not cached here; resources are registered on `scope`.
	fn evaluate(
		injected: Injected,
		key: Key,
		scope: Scope,
		trace: ResolutionTrace,
	) -> BoxFuture<'static, DiResult<Value>> {
		async move {
			let keys: Vec<Key> = injected.dependencies().into_iter().collect();
			let requests = keys
				.iter()
				.map(|dependency| scope.provide(dependency.clone(), trace.clone()));
			let values = future::try_join_all(requests).await?;
			let deps: Dependencies = keys.into_iter().zip(values).collect();

			let resources = Arc::new(BindingResources {
				key: key.clone(),
				scope,
			});
			injected
				.provide_registering(&deps, resources)
				.await
				.map_err(|e| e.at(&key, trace.path()))
		}
		.boxed()
	}
}

/// Registers resources acquired while building one binding on its scope.
struct BindingResources {
	key: Key,
	scope: Scope,
}

impl ResourceRegistry for BindingResources {
	fn register(&self, provider: &str, value: Value, teardown: Teardown) {
		debug!(key = %self.key, provider, "resource acquired");
		self.scope.register_resource(self.key.clone(), value, teardown);
	}
}

impl BindingSource for Engine {
	fn can_construct(&self, key: &Key) -> bool {
		self.built.contains(key.as_str())
	}

	fn intrinsic(
		self: Arc<Self>,
		key: &Key,
		scope: &Scope,
		trace: &ResolutionTrace,
	) -> Option<Value> {
		match key.as_str() {
			Key::DESIGN => Some(Value::new(self.built.clone())),
			Key::RESOLVER => Some(Value::new(AsyncResolver {
				engine: self,
				scope: scope.clone(),
				trace: trace.clone(),
			})),
			_ => None,
		}
	}

	fn construct(
		self: Arc<Self>,
		key: Key,
		scope: Scope,
		trace: ResolutionTrace,
	) -> BoxFuture<'static, DiResult<Value>> {
		async move {
			let Some(binding) = self.built.get(key.as_str()) else {
				let failure = DependencyResolutionFailure::unbound(key, trace.path().to_vec());
				return Err(MissingDependencies::new(vec![failure]).into());
			};
			let (kind, depth) = (binding.kind(), trace.depth());
			if self.config.log_resolution {
				info!(key = %key, kind, depth, "constructing binding");
			} else {
				debug!(key = %key, kind, depth, "constructing binding");
			}
			let injected = binding.to_injected();
			Engine::evaluate(injected, key.clone(), scope, trace)
				.await
				.map_err(|e| {
					debug!(key = %key, error = %e, "dependency injection resolution failed");
					e
				})
		}
		.boxed()
	}
}

/// Resolves keys and expressions against a design.
///
/// Cloning is cheap and shares the cache. Use [`AsyncResolver::child`] for a
/// scope with overrides and [`AsyncResolver::close`] to release resources.
///
/// A provider can ask for the resolver itself under `__resolver__`. That
/// handle carries the path that led to the provider, so looking up a key
/// already on that path fails with [`DiError::CircularDependency`] instead of
/// waiting on itself.
///
/// # Examples
///
/// ```
/// use reinhardt_resolver::{AsyncResolver, Design, provider};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let design = Design::new()
///     .bind_instance("a", 1i64)
///     .bind_instance("b", 2i64)
///     .bind_provider("f", provider!(|a: i64, b: i64| a + b));
///
/// let resolver = AsyncResolver::new(design);
/// let f = resolver.provide_as::<i64>("f").await.unwrap();
/// assert_eq!(*f, 3);
/// # }
/// ```
#[derive(Clone)]
pub struct AsyncResolver {
	engine: Arc<Engine>,
	scope: Scope,
	trace: ResolutionTrace,
}

impl AsyncResolver {
	/// Creates a root resolver with the default configuration.
	pub fn new(design: Design) -> Self {
		Self::with_config(design, ResolverConfig::default())
	}

	/// Creates a root resolver.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_resolver::{AsyncResolver, Design, ResolverConfig};
	///
	/// let config = ResolverConfig::default().with_max_depth(8);
	/// let resolver = AsyncResolver::with_config(Design::new(), config);
	/// assert_eq!(resolver.config().max_depth, 8);
	/// ```
	pub fn with_config(design: Design, config: ResolverConfig) -> Self {
		let trace = ResolutionTrace::new(config.max_depth);
		let engine = Arc::new(Engine::new(design, config));
		let scope = Scope::root(engine.clone());
		Self {
			engine,
			scope,
			trace,
		}
	}

	/// The design this resolver builds from, overrides included.
	pub fn design(&self) -> &Design {
		&self.engine.design
	}

	pub fn built(&self) -> &BuiltDesign {
		&self.engine.built
	}

	pub fn graph(&self) -> &DIGraph {
		&self.engine.graph
	}

	pub fn config(&self) -> &ResolverConfig {
		&self.engine.config
	}

	/// This resolver's own cache layer.
	pub fn scope(&self) -> &Scope {
		&self.scope
	}

	/// Path of keys this resolver was injected into; empty for a resolver
	/// created directly.
	pub fn trace(&self) -> &ResolutionTrace {
		&self.trace
	}

	/// Checks that everything reachable from `roots` is bound and acyclic,
	/// without running any provider.
	pub fn validate<K: Into<Key>>(&self, roots: impl IntoIterator<Item = K>) -> DiResult<()> {
		self.engine.validate(roots.into_iter().map(Into::into))
	}

	/// Resolves a bound key.
	pub async fn provide(&self, key: impl Into<Key>) -> DiResult<Value> {
		self.resolve(Target::Key(key.into())).await
	}

	/// Resolves a bound key and downcasts the result.
	pub async fn provide_as<T: Any + Send + Sync>(&self, key: impl Into<Key>) -> DiResult<Arc<T>> {
		let key = key.into();
		let value = self.provide(key.clone()).await?;
		downcast_value(value, key)
	}

	/// Resolves a key or an expression.
	///
	/// Expressions are evaluated fresh on every call; the keys they depend on
	/// go through the scope cache like any other request.
	pub async fn resolve(&self, target: impl Into<Target>) -> DiResult<Value> {
		match target.into() {
			Target::Key(key) => {
				if self.engine.config.validate_before_resolve && !key.is_intrinsic() {
					self.engine.validate([key.clone()])?;
				}
				self.scope.provide(key, self.trace.clone()).await
			}
			Target::Injected(injected) => {
				if self.engine.config.validate_before_resolve {
					self.engine.validate(injected.dependencies())?;
				}
				Engine::evaluate(
					injected,
					Key::from(ANONYMOUS_TARGET),
					self.scope.clone(),
					self.trace.clone(),
				)
				.await
			}
		}
	}

	/// Resolves a key or an expression and downcasts the result.
	pub async fn resolve_as<T: Any + Send + Sync>(
		&self,
		target: impl Into<Target>,
	) -> DiResult<Arc<T>> {
		let value = self.resolve(target).await?;
		downcast_value(value, Key::from(ANONYMOUS_TARGET))
	}

	/// Resolves a [`Designed`] in a temporary child scope that carries its
	/// overrides. The child is closed before returning.
	pub async fn resolve_designed(&self, designed: Designed) -> DiResult<Value> {
		let child = self.child(designed.design);
		let result = child.resolve(designed.injected).await;
		let closed = child.close().await;
		result.and_then(|value| closed.map(|()| value))
	}

	/// Creates a child resolver whose design is this one's with `overrides`
	/// merged on top.
	///
	/// Overridden keys are always built in the child. Other keys are taken
	/// from this resolver when it holds or can build them, which means they
	/// see this resolver's bindings, not the overrides.
	///
	/// The child keeps this resolver's trace.
	pub fn child(&self, overrides: Design) -> AsyncResolver {
		let overridden: HashSet<Key> = overrides.keys().cloned().collect();
		let merged = self.engine.design.merge(&overrides);
		let engine = Arc::new(Engine::new(merged, self.engine.config.clone()));
		let scope = self.scope.child(engine.clone(), overridden);
		Self {
			engine,
			scope,
			trace: self.trace.clone(),
		}
	}

	/// Releases every resource built in this resolver's own scope, newest
	/// first.
	pub async fn close(&self) -> DiResult<()> {
		self.scope.close().await
	}
}

impl fmt::Debug for AsyncResolver {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AsyncResolver")
			.field("bindings", &self.engine.built.len())
			.field("scope", &self.scope)
			.finish()
	}
}

fn downcast_value<T: Any + Send + Sync>(value: Value, key: Key) -> DiResult<Arc<T>> {
	value.downcast::<T>().ok_or_else(|| DiError::TypeMismatch {
		key,
		expected: type_name::<T>(),
	})
}

/// Resolves `target` once against `design` in a fresh resolver, releasing
/// every resource it acquired before returning.
pub async fn a_resolve(design: &Design, target: impl Into<Target>) -> DiResult<Value> {
	let resolver = AsyncResolver::new(design.clone());
	let result = resolver.resolve(target).await;
	let closed = resolver.close().await;
	result.and_then(|value| closed.map(|()| value))
}

/// Blocking form of [`a_resolve`].
///
/// Runs on a private current-thread runtime, so it must not be called from
/// inside an async context.
pub fn resolve(design: &Design, target: impl Into<Target>) -> DiResult<Value> {
	if tokio::runtime::Handle::try_current().is_ok() {
		return Err(DiError::Runtime(
			"blocking resolve called inside an async runtime; use a_resolve instead".to_string(),
		));
	}
	let runtime = tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.map_err(|e| DiError::Runtime(e.to_string()))?;
	runtime.block_on(a_resolve(design, target))
}
