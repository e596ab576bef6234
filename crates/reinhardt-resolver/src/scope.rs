//! Resolution scopes
//!
//! A [`Scope`] caches constructed values by key. Scopes form a tree: a child
//! hands keys it does not override to its parent whenever the parent already
//! holds or can build them, and keeps everything else to itself.
//!
//! Each key is constructed at most once per scope. Concurrent requests for a
//! key that is still being built share the same pending construction. The
//! cache only holds a weak handle to a pending construction: once every
//! request for it is dropped, the construction is dropped with them and the
//! next request starts over.

use crate::trace::ResolutionTrace;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{self, BoxFuture, Shared, WeakShared};
use parking_lot::Mutex;
use reinhardt_design::{DiError, DiResult, Key, ProviderFailure, Teardown, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

type SharedConstruction = Shared<BoxFuture<'static, DiResult<Value>>>;

/// Where the bindings of a scope come from.
///
/// Implementations must return lazy futures from `construct`: it is called
/// before the scope decides whether the construction is needed.
pub trait BindingSource: Send + Sync + 'static {
	/// Returns `true` if the source has a binding for `key`.
	fn can_construct(&self, key: &Key) -> bool;

	/// Values answered without a binding or a cache entry.
	///
	/// `trace` is the path of the request, not including `key`.
	fn intrinsic(
		self: Arc<Self>,
		key: &Key,
		scope: &Scope,
		trace: &ResolutionTrace,
	) -> Option<Value>;

	/// Builds the value for `key` on behalf of `scope`.
	///
	/// `trace` already ends with `key`.
	fn construct(
		self: Arc<Self>,
		key: Key,
		scope: Scope,
		trace: ResolutionTrace,
	) -> BoxFuture<'static, DiResult<Value>>;
}

enum Slot {
	Ready(Value),
	Pending(WeakShared<BoxFuture<'static, DiResult<Value>>>),
}

impl Slot {
	/// Slot for `construction`, or `None` if it already finished.
	fn pending(construction: &SharedConstruction) -> Option<Self> {
		construction.downgrade().map(Slot::Pending)
	}
}

struct Resource {
	key: Key,
	value: Value,
	teardown: Teardown,
}

struct ScopeInner {
	parent: Option<Scope>,
	overrides: HashSet<Key>,
	cache: DashMap<Key, Slot>,
	resources: Mutex<Vec<Resource>>,
	source: Arc<dyn BindingSource>,
}

/// Cache layer of the scope tree.
#[derive(Clone)]
pub struct Scope {
	inner: Arc<ScopeInner>,
}

impl Scope {
	/// Creates a scope with no parent.
	pub fn root(source: Arc<dyn BindingSource>) -> Self {
		Self::with_parent(None, source, HashSet::new())
	}

	/// Creates a child scope that constructs `overrides` locally and builds
	/// everything else through this scope when it can.
	pub fn child(&self, source: Arc<dyn BindingSource>, overrides: HashSet<Key>) -> Self {
		Self::with_parent(Some(self.clone()), source, overrides)
	}

	fn with_parent(
		parent: Option<Scope>,
		source: Arc<dyn BindingSource>,
		overrides: HashSet<Key>,
	) -> Self {
		Self {
			inner: Arc::new(ScopeInner {
				parent,
				overrides,
				cache: DashMap::new(),
				resources: Mutex::new(Vec::new()),
				source,
			}),
		}
	}

	/// The scope this one delegates to, if any.
	pub fn parent(&self) -> Option<&Scope> {
		self.inner.parent.as_ref()
	}

	/// Keys this scope always builds itself.
	pub fn overrides(&self) -> &HashSet<Key> {
		&self.inner.overrides
	}

	/// Bindings this scope constructs from.
	pub fn source(&self) -> &Arc<dyn BindingSource> {
		&self.inner.source
	}

	/// Returns the value cached in this scope itself, ignoring pending
	/// constructions and ancestors.
	pub fn cached(&self, key: &str) -> Option<Value> {
		self.inner.cache.get(key).and_then(|slot| match slot.value() {
			Slot::Ready(value) => Some(value.clone()),
			Slot::Pending(_) => None,
		})
	}

	/// Keys with a finished value in this scope's own cache.
	pub fn cached_keys(&self) -> Vec<Key> {
		self.inner
			.cache
			.iter()
			.filter(|entry| matches!(entry.value(), Slot::Ready(_)))
			.map(|entry| entry.key().clone())
			.collect()
	}

	/// Number of entries in this scope's own cache, pending ones included.
	pub fn cache_len(&self) -> usize {
		self.inner.cache.len()
	}

	/// Returns `true` if this scope or an ancestor holds `key` or can build
	/// it.
	pub fn can_provide(&self, key: &Key) -> bool {
		self.inner.cache.contains_key(key)
			|| self.inner.source.can_construct(key)
			|| self
				.inner
				.parent
				.as_ref()
				.is_some_and(|parent| parent.can_provide(key))
	}

	/// Provides `key`, building it with this scope's source when needed.
	pub fn provide(&self, key: Key, trace: ResolutionTrace) -> BoxFuture<'static, DiResult<Value>> {
		let source = Arc::clone(&self.inner.source);
		let scope = self.clone();
		let target = key.clone();
		self.provide_with(key, trace, move |entered| source.construct(target, scope, entered))
	}

	/// Provides `key`, building it with `default_provider` when neither this
	/// scope's cache nor an ancestor can answer.
	///
	/// In order:
	/// 1. a value cached here (or being built here) is returned;
	/// 2. an overridden key is built here;
	/// 3. a key the parent holds or can build is delegated to the parent and
	///    not cached here;
	/// 4. anything else is built here and cached only here.
	///
	/// `default_provider` receives `trace` extended with `key`.
	pub fn provide_with<F>(
		&self,
		key: Key,
		trace: ResolutionTrace,
		default_provider: F,
	) -> BoxFuture<'static, DiResult<Value>>
	where
		F: FnOnce(ResolutionTrace) -> BoxFuture<'static, DiResult<Value>> + Send + 'static,
	{
		if let Some(value) = Arc::clone(&self.inner.source).intrinsic(&key, self, &trace) {
			return future::ready(Ok(value)).boxed();
		}

		let entered = match trace.enter(key.clone()) {
			Ok(entered) => entered,
			Err(e) => return future::ready(Err(e)).boxed(),
		};

		if let Some(pending) = self.lookup(&key) {
			return pending;
		}

		if !self.inner.overrides.contains(&key)
			&& let Some(parent) = &self.inner.parent
			&& parent.can_provide(&key)
		{
			debug!(key = %key, "delegating to parent scope");
			return parent.provide(key, trace);
		}

		let construction = self.settled(key.clone(), default_provider(entered));
		match self.inner.cache.entry(key) {
			Entry::Occupied(mut occupied) => {
				let live = match occupied.get() {
					Slot::Ready(value) => return future::ready(Ok(value.clone())).boxed(),
					Slot::Pending(weak) => weak.upgrade(),
				};
				match live {
					Some(shared) => shared.boxed(),
					None => {
						if let Some(slot) = Slot::pending(&construction) {
							occupied.insert(slot);
						}
						construction.boxed()
					}
				}
			}
			Entry::Vacant(vacant) => {
				if let Some(slot) = Slot::pending(&construction) {
					vacant.insert(slot);
				}
				construction.boxed()
			}
		}
	}

	fn lookup(&self, key: &Key) -> Option<BoxFuture<'static, DiResult<Value>>> {
		let slot = self.inner.cache.get(key)?;
		match slot.value() {
			Slot::Ready(value) => {
				trace!(key = %key, "scope cache hit");
				Some(future::ready(Ok(value.clone())).boxed())
			}
			Slot::Pending(weak) => {
				let shared = weak.upgrade()?;
				trace!(key = %key, "joining in-flight construction");
				Some(shared.boxed())
			}
		}
	}

	/// Wraps a construction so its outcome lands in the cache: a value
	/// replaces the pending slot, a failure clears it.
	fn settled(
		&self,
		key: Key,
		construction: BoxFuture<'static, DiResult<Value>>,
	) -> SharedConstruction {
		let scope = Arc::downgrade(&self.inner);
		async move {
			let result = construction.await;
			let Some(inner) = scope.upgrade() else {
				return result;
			};
			match &result {
				Ok(value) => {
					if let Some(mut slot) = inner.cache.get_mut(&key)
						&& matches!(*slot, Slot::Pending(_))
					{
						*slot = Slot::Ready(value.clone());
					}
				}
				Err(_) => {
					inner
						.cache
						.remove_if(&key, |_, slot| matches!(slot, Slot::Pending(_)));
				}
			}
			result
		}
		.boxed()
		.shared()
	}

	/// Records a value whose teardown must run when this scope closes.
	pub fn register_resource(&self, key: Key, value: Value, teardown: Teardown) {
		debug!(key = %key, "registered resource for teardown");
		self.inner.resources.lock().push(Resource {
			key,
			value,
			teardown,
		});
	}

	/// Resources waiting for [`Scope::close`].
	pub fn resource_count(&self) -> usize {
		self.inner.resources.lock().len()
	}

	/// Releases every resource acquired in this scope, newest first, and
	/// clears the cache.
	///
	/// Every teardown runs even if an earlier one fails; the first failure
	/// is returned.
	pub async fn close(&self) -> DiResult<()> {
		let resources: Vec<Resource> = std::mem::take(&mut *self.inner.resources.lock());
		self.inner.cache.clear();
		let mut first_error = None;
		for resource in resources.into_iter().rev() {
			debug!(key = %resource.key, "releasing resource");
			if let Err(e) = resource.teardown.run(resource.value).await {
				warn!(key = %resource.key, error = %e, "resource teardown failed");
				first_error.get_or_insert(DiError::Teardown {
					key: resource.key,
					source: ProviderFailure::new(e),
				});
			}
		}
		match first_error {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}
}

impl fmt::Debug for Scope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Scope")
			.field("cached", &self.inner.cache.len())
			.field("overrides", &self.inner.overrides)
			.field("has_parent", &self.inner.parent.is_some())
			.finish()
	}
}
