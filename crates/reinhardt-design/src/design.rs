//! Binding registry
//!
//! A [`Design`] maps keys to bindings. Designs are values: builder methods
//! consume and return them, and [`Design::merge`] produces a new design in
//! which the right-hand side wins per key.
//!
//! # Examples
//!
//! ```
//! use reinhardt_design::{Design, Key, provider};
//!
//! let base = Design::new()
//!     .bind_instance("a", 1i64)
//!     .bind_instance("b", 2i64)
//!     .bind_provider("sum", provider!(|a: i64, b: i64| a + b));
//! let overrides = Design::new().bind_instance("b", 40i64);
//!
//! let merged = base + overrides;
//! assert_eq!(merged.len(), 3);
//! assert!(merged.contains("sum"));
//! ```

use crate::injected::Injected;
use crate::key::Key;
use crate::provider::{ClassBinding, Injectable};
use crate::value::Value;
use indexmap::IndexMap;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Add;
use std::sync::Arc;
use tracing::warn;

/// Recipe for the value behind one key.
#[derive(Clone)]
pub enum Binding {
	Instance(Value),
	Provider(Injected),
	Class(ClassBinding),
}

impl Binding {
	/// Keys this binding needs before it can produce a value.
	pub fn dependencies(&self) -> BTreeSet<Key> {
		match self {
			Self::Instance(_) => BTreeSet::new(),
			Self::Provider(injected) => injected.dependencies(),
			Self::Class(class) => class.dependencies().iter().cloned().collect(),
		}
	}

	/// Expression producing this binding's value.
	pub fn to_injected(&self) -> Injected {
		match self {
			Self::Instance(value) => Injected::Pure(value.clone()),
			Self::Provider(injected) => injected.clone(),
			Self::Class(class) => Injected::from_function(class.provider().clone()),
		}
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Self::Instance(_) => "instance",
			Self::Provider(_) => "provider",
			Self::Class(_) => "class",
		}
	}
}

impl fmt::Debug for Binding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Instance(value) => f.debug_tuple("Instance").field(value).finish(),
			Self::Provider(injected) => f.debug_tuple("Provider").field(injected).finish(),
			Self::Class(class) => f.debug_tuple("Class").field(&class.type_name()).finish(),
		}
	}
}

/// Entry of a multi-binding.
#[derive(Clone, Debug)]
pub enum MultiEntry {
	Contribution(Binding),
	/// Drops every contribution recorded before it
	Reset,
}

/// Ordered contributions to a key whose value is a sequence.
#[derive(Clone, Debug, Default)]
pub struct MultiBinding {
	entries: Vec<MultiEntry>,
}

impl MultiBinding {
	/// Recorded entries in order, reset markers included.
	pub fn entries(&self) -> &[MultiEntry] {
		&self.entries
	}

	/// Contributions that survive the last reset marker, in order.
	pub fn contributions(&self) -> Vec<Binding> {
		let start = self
			.entries
			.iter()
			.rposition(|entry| matches!(entry, MultiEntry::Reset))
			.map_or(0, |reset| reset + 1);
		self.entries[start..]
			.iter()
			.filter_map(|entry| match entry {
				MultiEntry::Contribution(binding) => Some(binding.clone()),
				MultiEntry::Reset => None,
			})
			.collect()
	}

	fn push(&mut self, entry: MultiEntry) {
		self.entries.push(entry);
	}
}

/// Immutable registry of bindings.
#[derive(Clone, Default)]
pub struct Design {
	bindings: Arc<IndexMap<Key, Binding>>,
	multi: Arc<IndexMap<Key, MultiBinding>>,
}

impl Design {
	/// Creates an empty design.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_design::Design;
	///
	/// let design = Design::new();
	/// assert!(design.is_empty());
	/// ```
	pub fn new() -> Self {
		Self::default()
	}

	/// Binds `key` to a fixed value.
	///
	/// Use [`Design::bind_value`] when the value is already a [`Value`].
	pub fn bind_instance<T: Any + Send + Sync>(self, key: impl Into<Key>, value: T) -> Self {
		self.bind_value(key, Value::new(value))
	}

	/// Binds `key` to an already erased value.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_design::{Binding, Design, Value};
	///
	/// let design = Design::new().bind_value("port", Value::new(8080u16));
	/// assert!(matches!(design.get("port"), Some(Binding::Instance(_))));
	/// ```
	pub fn bind_value(self, key: impl Into<Key>, value: Value) -> Self {
		self.bind(key, Binding::Instance(value))
	}

	/// Binds `key` to a provider or any other dependency expression.
	pub fn bind_provider(self, key: impl Into<Key>, injected: impl Into<Injected>) -> Self {
		self.bind(key, Binding::Provider(injected.into()))
	}

	/// Binds `key` to `T`'s constructor; its dependencies are
	/// [`Injectable::dependencies`].
	pub fn bind_class<T: Injectable>(self, key: impl Into<Key>) -> Self {
		self.bind(key, Binding::Class(ClassBinding::of::<T>()))
	}

	/// Binds `key`, replacing any binding it already has in this design.
	pub fn bind(mut self, key: impl Into<Key>, binding: Binding) -> Self {
		Arc::make_mut(&mut self.bindings).insert(key.into(), binding);
		self
	}

	/// Appends a provider to the multi-binding of `key`.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_design::{Design, ResolvedBinding, provider};
	///
	/// let design = Design::new()
	///     .multi_bind_instance("middleware", "auth".to_string())
	///     .multi_bind_provider("middleware", provider!(|| "cors".to_string()));
	///
	/// let built = design.build();
	/// let Some(ResolvedBinding::Multi(items)) = built.get("middleware") else {
	///     panic!("expected a multi-binding");
	/// };
	/// assert_eq!(items.len(), 2);
	/// ```
	pub fn multi_bind_provider(self, key: impl Into<Key>, injected: impl Into<Injected>) -> Self {
		self.multi_push(key, MultiEntry::Contribution(Binding::Provider(injected.into())))
	}

	/// Appends a contribution to the multi-binding of `key`.
	pub fn multi_bind(self, key: impl Into<Key>, binding: Binding) -> Self {
		self.multi_push(key, MultiEntry::Contribution(binding))
	}

	/// Appends a fixed value to the multi-binding of `key`.
	pub fn multi_bind_instance<T: Any + Send + Sync>(self, key: impl Into<Key>, value: T) -> Self {
		self.multi_push(key, MultiEntry::Contribution(Binding::Instance(Value::new(value))))
	}

	/// Marks a reset point: contributions recorded so far, including those
	/// merged in from designs on the left, are dropped at build time.
	pub fn multi_bind_empty(self, key: impl Into<Key>) -> Self {
		self.multi_push(key, MultiEntry::Reset)
	}

	fn multi_push(mut self, key: impl Into<Key>, entry: MultiEntry) -> Self {
		Arc::make_mut(&mut self.multi)
			.entry(key.into())
			.or_default()
			.push(entry);
		self
	}

	/// Returns a new design where `other`'s bindings replace this design's
	/// on shared keys and multi-binding entries are appended after this
	/// design's.
	pub fn merge(&self, other: &Design) -> Design {
		let mut merged = self.clone();
		if !other.bindings.is_empty() {
			let bindings = Arc::make_mut(&mut merged.bindings);
			for (key, binding) in other.bindings.iter() {
				bindings.insert(key.clone(), binding.clone());
			}
		}
		if !other.multi.is_empty() {
			let multi = Arc::make_mut(&mut merged.multi);
			for (key, incoming) in other.multi.iter() {
				let target = multi.entry(key.clone()).or_default();
				target.entries.extend(incoming.entries.iter().cloned());
			}
		}
		merged
	}

	/// Plain binding of `key`; multi-bindings are under [`Design::multi_binding`].
	pub fn get(&self, key: &str) -> Option<&Binding> {
		self.bindings.get(key)
	}

	pub fn multi_binding(&self, key: &str) -> Option<&MultiBinding> {
		self.multi.get(key)
	}

	/// Returns `true` if `key` has a plain binding or a multi-binding.
	pub fn contains(&self, key: &str) -> bool {
		self.bindings.contains_key(key) || self.multi.contains_key(key)
	}

	/// Bound keys: plain bindings first, then multi-bound keys, each in
	/// registration order.
	pub fn keys(&self) -> impl Iterator<Item = &Key> {
		self.bindings.keys().chain(
			self.multi
				.keys()
				.filter(|key| !self.bindings.contains_key(key.as_str())),
		)
	}

	pub fn bindings(&self) -> impl Iterator<Item = (&Key, &Binding)> {
		self.bindings.iter()
	}

	pub fn multi_bindings(&self) -> impl Iterator<Item = (&Key, &MultiBinding)> {
		self.multi.iter()
	}

	pub fn len(&self) -> usize {
		self.keys().count()
	}

	pub fn is_empty(&self) -> bool {
		self.bindings.is_empty() && self.multi.is_empty()
	}

	/// Flattens the design into its resolvable form.
	pub fn build(&self) -> BuiltDesign {
		let mut resolved: IndexMap<Key, ResolvedBinding> = self
			.bindings
			.iter()
			.map(|(key, binding)| (key.clone(), ResolvedBinding::from(binding.clone())))
			.collect();
		for (key, multi) in self.multi.iter() {
			if resolved.contains_key(key.as_str()) {
				warn!(
					key = %key,
					"multi-binding is shadowed by a plain binding on the same key"
				);
				continue;
			}
			resolved.insert(key.clone(), ResolvedBinding::Multi(multi.contributions()));
		}
		BuiltDesign {
			bindings: Arc::new(resolved),
			source: self.clone(),
		}
	}
}

impl Add for Design {
	type Output = Design;

	fn add(self, rhs: Design) -> Design {
		self.merge(&rhs)
	}
}

impl Add<&Design> for Design {
	type Output = Design;

	fn add(self, rhs: &Design) -> Design {
		self.merge(rhs)
	}
}

impl fmt::Debug for Design {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Design")
			.field("bindings", &self.bindings)
			.field("multi", &self.multi)
			.finish()
	}
}

/// Design binding every pair to a fixed value.
pub fn instances<K: Into<Key>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Design {
	pairs
		.into_iter()
		.fold(Design::new(), |design, (key, value)| design.bind_value(key, value))
}

/// Design binding every pair to a provider.
pub fn providers<K, I>(pairs: impl IntoIterator<Item = (K, I)>) -> Design
where
	K: Into<Key>,
	I: Into<Injected>,
{
	pairs
		.into_iter()
		.fold(Design::new(), |design, (key, injected)| design.bind_provider(key, injected))
}

/// Design binding every pair to a constructor.
pub fn classes<K: Into<Key>>(pairs: impl IntoIterator<Item = (K, ClassBinding)>) -> Design {
	pairs.into_iter().fold(Design::new(), |design, (key, class)| {
		design.bind(key, Binding::Class(class))
	})
}

/// Binding after multi-bindings have been expanded.
#[derive(Clone)]
pub enum ResolvedBinding {
	Instance(Value),
	Provider(Injected),
	Class(ClassBinding),
	/// Contributions after the last reset, in order
	Multi(Vec<Binding>),
}

impl ResolvedBinding {
	pub fn dependencies(&self) -> BTreeSet<Key> {
		match self {
			Self::Instance(_) => BTreeSet::new(),
			Self::Provider(injected) => injected.dependencies(),
			Self::Class(class) => class.dependencies().iter().cloned().collect(),
			Self::Multi(contributions) => contributions
				.iter()
				.flat_map(Binding::dependencies)
				.collect(),
		}
	}

	/// Expression producing this binding's value. A multi-binding produces
	/// the `Vec<Value>` of its contributions' values.
	pub fn to_injected(&self) -> Injected {
		match self {
			Self::Instance(value) => Injected::Pure(value.clone()),
			Self::Provider(injected) => injected.clone(),
			Self::Class(class) => Injected::from_function(class.provider().clone()),
			Self::Multi(contributions) => {
				Injected::combine(contributions.iter().map(Binding::to_injected))
			}
		}
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Self::Instance(_) => "instance",
			Self::Provider(_) => "provider",
			Self::Class(_) => "class",
			Self::Multi(_) => "multi",
		}
	}
}

impl From<Binding> for ResolvedBinding {
	fn from(binding: Binding) -> Self {
		match binding {
			Binding::Instance(value) => Self::Instance(value),
			Binding::Provider(injected) => Self::Provider(injected),
			Binding::Class(class) => Self::Class(class),
		}
	}
}

impl fmt::Debug for ResolvedBinding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Multi(contributions) => f.debug_tuple("Multi").field(contributions).finish(),
			Self::Instance(value) => f.debug_tuple("Instance").field(value).finish(),
			Self::Provider(injected) => f.debug_tuple("Provider").field(injected).finish(),
			Self::Class(class) => f.debug_tuple("Class").field(&class.type_name()).finish(),
		}
	}
}

/// Flattened, resolvable form of a [`Design`].
#[derive(Clone)]
pub struct BuiltDesign {
	bindings: Arc<IndexMap<Key, ResolvedBinding>>,
	source: Design,
}

impl BuiltDesign {
	/// Binding that resolution uses for `key`.
	pub fn get(&self, key: &str) -> Option<&ResolvedBinding> {
		self.bindings.get(key)
	}

	pub fn contains(&self, key: &str) -> bool {
		self.bindings.contains_key(key)
	}

	/// Keys in binding order.
	pub fn keys(&self) -> impl Iterator<Item = &Key> {
		self.bindings.keys()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&Key, &ResolvedBinding)> {
		self.bindings.iter()
	}

	pub fn len(&self) -> usize {
		self.bindings.len()
	}

	pub fn is_empty(&self) -> bool {
		self.bindings.is_empty()
	}

	/// The design this was built from.
	pub fn design(&self) -> &Design {
		&self.source
	}
}

impl fmt::Debug for BuiltDesign {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.bindings.iter()).finish()
	}
}
