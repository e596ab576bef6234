//! Serializable manifests of designs and expressions
//!
//! Closures cannot cross a process boundary, so a manifest refers to them by
//! symbol. The receiving side rebuilds the design from a [`ProviderCatalog`]
//! holding the same symbols. Instance values must have been created with
//! [`Value::serializable`] and their types registered in the catalog.
//!
//! # Examples
//!
//! ```
//! use reinhardt_design::{Design, DesignManifest, ProviderCatalog, Value, provider};
//!
//! let sum = provider!("sum", |a: i64, b: i64| a + b).with_symbol("math::sum");
//! let design = Design::new()
//!     .bind_value("a", Value::serializable(1i64).unwrap())
//!     .bind_value("b", Value::serializable(2i64).unwrap())
//!     .bind_provider("total", sum.clone());
//!
//! let json = design.to_manifest().unwrap().to_json().unwrap();
//!
//! let mut catalog = ProviderCatalog::new();
//! catalog.register_provider(sum).register_type::<i64>();
//! let rebuilt = DesignManifest::from_json(&json).unwrap().into_design(&catalog).unwrap();
//! assert_eq!(rebuilt.len(), 3);
//! ```

use crate::design::{Binding, Design, MultiEntry};
use crate::designed::Designed;
use crate::error::{DiError, DiResult};
use crate::expr::{Expr, ExprNode};
use crate::injected::{Injected, Transform};
use crate::key::Key;
use crate::provider::{ClassBinding, Injectable, Provider};
use crate::value::{Function, Snapshot, Value};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Key used in errors raised while serializing a bare expression.
const EXPRESSION: &str = "<expression>";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignManifest {
	#[serde(default)]
	pub bindings: IndexMap<Key, BindingManifest>,
	#[serde(default)]
	pub multi: IndexMap<Key, Vec<MultiEntryManifest>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BindingManifest {
	Instance { value: ValueManifest },
	Provider { injected: InjectedManifest },
	Class { symbol: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MultiEntryManifest {
	Contribution { binding: BindingManifest },
	Reset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InjectedManifest {
	Pure {
		value: ValueManifest,
	},
	ByName {
		key: Key,
	},
	FromFunction {
		symbol: String,
		params: Vec<Key>,
		#[serde(default)]
		mapping: IndexMap<Key, InjectedManifest>,
	},
	Mapped {
		source: Box<InjectedManifest>,
		transform: String,
	},
	Combined {
		sources: Vec<InjectedManifest>,
	},
	Evaluated {
		expr: ExprManifest,
	},
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueManifest {
	Json {
		type_tag: String,
		json: serde_json::Value,
	},
	Injected {
		injected: Box<InjectedManifest>,
	},
	Designed {
		design: Box<DesignManifest>,
		injected: Box<InjectedManifest>,
	},
	Function {
		symbol: String,
	},
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprManifest {
	Object {
		value: ValueManifest,
	},
	Call {
		func: Box<ExprManifest>,
		#[serde(default)]
		args: Vec<ExprManifest>,
		#[serde(default)]
		kwargs: IndexMap<String, ExprManifest>,
	},
	Attribute {
		node: Box<ExprManifest>,
		name: String,
	},
	Index {
		node: Box<ExprManifest>,
		key: Box<ExprManifest>,
	},
}

fn unserializable(key: &Key, reason: impl Into<String>) -> DiError {
	DiError::Serialization {
		key: key.clone(),
		reason: reason.into(),
	}
}

fn not_in_catalog(key: &Key, kind: &str, symbol: &str) -> DiError {
	unserializable(key, format!("{kind} '{symbol}' is not in the catalog"))
}

impl Design {
	/// Describes this design as a serializable manifest.
	///
	/// Fails with [`DiError::Serialization`] naming the first binding that
	/// closes over state a manifest cannot carry.
	pub fn to_manifest(&self) -> DiResult<DesignManifest> {
		let mut bindings = IndexMap::new();
		for (key, binding) in self.bindings() {
			bindings.insert(key.clone(), binding_manifest(key, binding)?);
		}
		let mut multi = IndexMap::new();
		for (key, multi_binding) in self.multi_bindings() {
			let entries = multi_binding
				.entries()
				.iter()
				.map(|entry| -> DiResult<MultiEntryManifest> {
					match entry {
						MultiEntry::Reset => Ok(MultiEntryManifest::Reset),
						MultiEntry::Contribution(binding) => Ok(MultiEntryManifest::Contribution {
							binding: binding_manifest(key, binding)?,
						}),
					}
				})
				.collect::<DiResult<Vec<_>>>()?;
			multi.insert(key.clone(), entries);
		}
		Ok(DesignManifest { bindings, multi })
	}
}

impl Injected {
	pub fn to_manifest(&self) -> DiResult<InjectedManifest> {
		injected_manifest(&Key::from(EXPRESSION), self)
	}
}

fn binding_manifest(key: &Key, binding: &Binding) -> DiResult<BindingManifest> {
	Ok(match binding {
		Binding::Instance(value) => BindingManifest::Instance {
			value: value_manifest(key, value)?,
		},
		Binding::Provider(injected) => BindingManifest::Provider {
			injected: injected_manifest(key, injected)?,
		},
		Binding::Class(class) => BindingManifest::Class {
			symbol: class.type_name().to_string(),
		},
	})
}

fn injected_manifest(key: &Key, injected: &Injected) -> DiResult<InjectedManifest> {
	Ok(match injected {
		Injected::Pure(value) => InjectedManifest::Pure {
			value: value_manifest(key, value)?,
		},
		Injected::ByName(name) => InjectedManifest::ByName { key: name.clone() },
		Injected::FromFunction { provider, mapping } => {
			let symbol = provider.symbol().ok_or_else(|| {
				unserializable(
					key,
					format!(
						"provider '{}' has no symbol; name it with Provider::with_symbol",
						provider.name()
					),
				)
			})?;
			let mut mapped = IndexMap::new();
			for (param, source) in mapping.iter() {
				mapped.insert(param.clone(), injected_manifest(key, source)?);
			}
			InjectedManifest::FromFunction {
				symbol: symbol.to_string(),
				params: provider.params().to_vec(),
				mapping: mapped,
			}
		}
		Injected::Mapped { source, transform } => {
			let symbol = transform.symbol().ok_or_else(|| {
				unserializable(key, "transform has no symbol; create it with Transform::named")
			})?;
			InjectedManifest::Mapped {
				source: Box::new(injected_manifest(key, source)?),
				transform: symbol.to_string(),
			}
		}
		Injected::Combined(sources) => InjectedManifest::Combined {
			sources: sources
				.iter()
				.map(|source| injected_manifest(key, source))
				.collect::<DiResult<_>>()?,
		},
		Injected::Evaluated { expr, .. } => InjectedManifest::Evaluated {
			expr: expr_manifest(key, expr)?,
		},
	})
}

fn expr_manifest(key: &Key, expr: &Expr) -> DiResult<ExprManifest> {
	Ok(match expr.node() {
		ExprNode::Object(value) => ExprManifest::Object {
			value: value_manifest(key, value)?,
		},
		ExprNode::Call { func, args, kwargs } => ExprManifest::Call {
			func: Box::new(expr_manifest(key, func)?),
			args: args
				.iter()
				.map(|arg| expr_manifest(key, arg))
				.collect::<DiResult<_>>()?,
			kwargs: kwargs
				.iter()
				.map(|(name, arg)| -> DiResult<(String, ExprManifest)> {
					Ok((name.clone(), expr_manifest(key, arg)?))
				})
				.collect::<DiResult<_>>()?,
		},
		ExprNode::Attribute { node, name } => ExprManifest::Attribute {
			node: Box::new(expr_manifest(key, node)?),
			name: name.clone(),
		},
		ExprNode::Index { node, key: index } => ExprManifest::Index {
			node: Box::new(expr_manifest(key, node)?),
			key: Box::new(expr_manifest(key, index)?),
		},
	})
}

fn value_manifest(key: &Key, value: &Value) -> DiResult<ValueManifest> {
	if let Some(snapshot) = value.snapshot() {
		return Ok(ValueManifest::Json {
			type_tag: snapshot.type_tag.clone(),
			json: snapshot.json.clone(),
		});
	}
	if let Some(injected) = value.downcast_ref::<Injected>() {
		return Ok(ValueManifest::Injected {
			injected: Box::new(injected_manifest(key, injected)?),
		});
	}
	if let Some(designed) = value.downcast_ref::<Designed>() {
		return Ok(ValueManifest::Designed {
			design: Box::new(designed.design.to_manifest()?),
			injected: Box::new(injected_manifest(key, &designed.injected)?),
		});
	}
	if let Some(function) = value.downcast_ref::<Function>() {
		return function
			.symbol()
			.map(|symbol| ValueManifest::Function {
				symbol: symbol.to_string(),
			})
			.ok_or_else(|| {
				unserializable(key, "function has no symbol; create it with Function::named")
			});
	}
	Err(unserializable(
		key,
		format!(
			"value of type {} holds live state; create it with Value::serializable",
			value.type_name()
		),
	))
}

type DecodeFn = dyn Fn(serde_json::Value) -> Result<Value, serde_json::Error> + Send + Sync;

/// Named providers, transforms, functions, constructors and value types a
/// manifest can be rebuilt from.
#[derive(Clone, Default)]
pub struct ProviderCatalog {
	providers: HashMap<String, Provider>,
	transforms: HashMap<String, Transform>,
	functions: HashMap<String, Function>,
	classes: HashMap<String, ClassBinding>,
	types: HashMap<String, Arc<DecodeFn>>,
}

impl ProviderCatalog {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a provider under its symbol, or its name if it has none.
	pub fn register_provider(&mut self, provider: Provider) -> &mut Self {
		let symbol = provider.symbol().unwrap_or(provider.name()).to_string();
		self.providers.insert(symbol, provider);
		self
	}

	pub fn register_transform(&mut self, transform: Transform) -> &mut Self {
		match transform.symbol() {
			Some(symbol) => {
				self.transforms.insert(symbol.to_string(), transform);
			}
			None => warn!("ignoring unnamed transform; create it with Transform::named"),
		}
		self
	}

	pub fn register_function(&mut self, function: Function) -> &mut Self {
		match function.symbol() {
			Some(symbol) => {
				self.functions.insert(symbol.to_string(), function);
			}
			None => warn!("ignoring unnamed function; create it with Function::named"),
		}
		self
	}

	pub fn register_class<T: Injectable>(&mut self) -> &mut Self {
		let class = ClassBinding::of::<T>();
		self.classes.insert(class.type_name().to_string(), class);
		self
	}

	/// Registers a value type so `Json` manifests tagged with it can be
	/// decoded.
	pub fn register_type<T>(&mut self) -> &mut Self
	where
		T: Serialize + DeserializeOwned + Any + Send + Sync,
	{
		let type_tag = type_name::<T>().to_string();
		let tag = type_tag.clone();
		self.types.insert(
			type_tag,
			Arc::new(move |json: serde_json::Value| {
				let decoded: T = serde_json::from_value(json.clone())?;
				Ok(Value::new(decoded).with_snapshot(Snapshot {
					type_tag: tag.clone(),
					json,
				}))
			}),
		);
		self
	}

	fn provider(&self, key: &Key, symbol: &str) -> DiResult<Provider> {
		self.providers
			.get(symbol)
			.cloned()
			.ok_or_else(|| not_in_catalog(key, "provider", symbol))
	}

	fn transform(&self, key: &Key, symbol: &str) -> DiResult<Transform> {
		self.transforms
			.get(symbol)
			.cloned()
			.ok_or_else(|| not_in_catalog(key, "transform", symbol))
	}

	fn function(&self, key: &Key, symbol: &str) -> DiResult<Function> {
		self.functions
			.get(symbol)
			.cloned()
			.ok_or_else(|| not_in_catalog(key, "function", symbol))
	}

	fn class(&self, key: &Key, symbol: &str) -> DiResult<ClassBinding> {
		self.classes
			.get(symbol)
			.cloned()
			.ok_or_else(|| not_in_catalog(key, "class", symbol))
	}

	fn decode(&self, key: &Key, type_tag: &str, json: serde_json::Value) -> DiResult<Value> {
		let decode = self
			.types
			.get(type_tag)
			.ok_or_else(|| not_in_catalog(key, "type", type_tag))?;
		decode(json).map_err(|e| unserializable(key, e.to_string()))
	}
}

impl fmt::Debug for ProviderCatalog {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProviderCatalog")
			.field("providers", &self.providers.keys().collect::<Vec<_>>())
			.field("transforms", &self.transforms.keys().collect::<Vec<_>>())
			.field("functions", &self.functions.keys().collect::<Vec<_>>())
			.field("classes", &self.classes.keys().collect::<Vec<_>>())
			.field("types", &self.types.keys().collect::<Vec<_>>())
			.finish()
	}
}

impl DesignManifest {
	pub fn to_json(&self) -> DiResult<String> {
		serde_json::to_string(self)
			.map_err(|e| unserializable(&Key::from(EXPRESSION), e.to_string()))
	}

	pub fn from_json(json: &str) -> DiResult<Self> {
		serde_json::from_str(json)
			.map_err(|e| unserializable(&Key::from(EXPRESSION), e.to_string()))
	}

	/// Rebuilds the design, looking every symbol up in `catalog`.
	pub fn into_design(self, catalog: &ProviderCatalog) -> DiResult<Design> {
		let mut design = Design::new();
		for (key, binding) in self.bindings {
			let binding = binding.rebuild(&key, catalog)?;
			design = design.bind(key, binding);
		}
		for (key, entries) in self.multi {
			for entry in entries {
				design = match entry {
					MultiEntryManifest::Reset => design.multi_bind_empty(key.clone()),
					MultiEntryManifest::Contribution { binding } => {
						design.multi_bind(key.clone(), binding.rebuild(&key, catalog)?)
					}
				};
			}
		}
		Ok(design)
	}
}

impl BindingManifest {
	fn rebuild(self, key: &Key, catalog: &ProviderCatalog) -> DiResult<Binding> {
		Ok(match self {
			Self::Instance { value } => Binding::Instance(value.rebuild(key, catalog)?),
			Self::Provider { injected } => Binding::Provider(injected.rebuild(key, catalog)?),
			Self::Class { symbol } => Binding::Class(catalog.class(key, &symbol)?),
		})
	}
}

impl InjectedManifest {
	pub fn into_injected(self, catalog: &ProviderCatalog) -> DiResult<Injected> {
		self.rebuild(&Key::from(EXPRESSION), catalog)
	}

	fn rebuild(self, key: &Key, catalog: &ProviderCatalog) -> DiResult<Injected> {
		Ok(match self {
			Self::Pure { value } => Injected::Pure(value.rebuild(key, catalog)?),
			Self::ByName { key: name } => Injected::ByName(name),
			Self::FromFunction {
				symbol,
				params,
				mapping,
			} => {
				let provider = catalog.provider(key, &symbol)?;
				if provider.params() != params.as_slice() {
					return Err(unserializable(
						key,
						format!(
							"provider '{}' in the catalog takes different parameters",
							symbol
						),
					));
				}
				let mut rebuilt = Vec::with_capacity(mapping.len());
				for (param, source) in mapping {
					rebuilt.push((param, source.rebuild(key, catalog)?));
				}
				Injected::from_function_with(provider, rebuilt)
			}
			Self::Mapped { source, transform } => source
				.rebuild(key, catalog)?
				.map_with(catalog.transform(key, &transform)?),
			Self::Combined { sources } => Injected::combine(
				sources
					.into_iter()
					.map(|source| source.rebuild(key, catalog))
					.collect::<DiResult<Vec<_>>>()?,
			),
			Self::Evaluated { expr } => Injected::eval(expr.rebuild(key, catalog)?),
		})
	}
}

impl ExprManifest {
	fn rebuild(self, key: &Key, catalog: &ProviderCatalog) -> DiResult<Expr> {
		Ok(match self {
			Self::Object { value } => Expr::object(value.rebuild(key, catalog)?),
			Self::Call { func, args, kwargs } => {
				let func = func.rebuild(key, catalog)?;
				let args = args
					.into_iter()
					.map(|arg| arg.rebuild(key, catalog))
					.collect::<DiResult<Vec<_>>>()?;
				let kwargs = kwargs
					.into_iter()
					.map(|(name, arg)| -> DiResult<(String, Expr)> {
						Ok((name, arg.rebuild(key, catalog)?))
					})
					.collect::<DiResult<Vec<_>>>()?;
				func.call_with(args, kwargs)
			}
			Self::Attribute { node, name } => node.rebuild(key, catalog)?.attr(name),
			Self::Index { node, key: index } => {
				let node = node.rebuild(key, catalog)?;
				node.index(index.rebuild(key, catalog)?)
			}
		})
	}
}

impl ValueManifest {
	fn rebuild(self, key: &Key, catalog: &ProviderCatalog) -> DiResult<Value> {
		Ok(match self {
			Self::Json { type_tag, json } => catalog.decode(key, &type_tag, json)?,
			Self::Injected { injected } => Value::new(injected.rebuild(key, catalog)?),
			Self::Designed { design, injected } => Value::new(Designed::new(
				design.into_design(catalog)?,
				injected.rebuild(key, catalog)?,
			)),
			Self::Function { symbol } => Value::function(catalog.function(key, &symbol)?),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::BoxError;
	use crate::provider;
	use crate::provider::Dependencies;
	use rstest::rstest;

	#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
	struct Endpoint {
		host: String,
		port: u16,
	}

	struct Client;

	#[async_trait::async_trait]
	impl Injectable for Client {
		fn dependencies() -> Vec<Key> {
			vec![Key::from("endpoint")]
		}

		async fn inject(_deps: &Dependencies) -> Result<Self, BoxError> {
			Ok(Client)
		}
	}

	fn format_endpoint() -> Provider {
		provider!("format", |endpoint: Endpoint| format!("{}:{}", endpoint.host, endpoint.port))
			.with_symbol("endpoint::format")
	}

	#[rstest]
	fn test_live_instance_names_offending_key() {
		// Arrange
		let design = Design::new()
			.bind_value("ok", Value::serializable(1u8).unwrap())
			.bind_instance("socket", std::sync::Mutex::new(0u8));

		// Act
		let err = design.to_manifest().unwrap_err();

		// Assert
		match err {
			DiError::Serialization { key, reason } => {
				assert_eq!(key, Key::from("socket"));
				assert!(reason.contains("Value::serializable"));
			}
			other => panic!("unexpected error {:?}", other),
		}
	}

	#[rstest]
	fn test_anonymous_provider_is_not_serializable() {
		let design = Design::new().bind_provider("f", provider!(|a: i64| a));
		let err = design.to_manifest().unwrap_err();
		assert!(matches!(err, DiError::Serialization { key, .. } if key.as_str() == "f"));
	}

	#[rstest]
	fn test_design_manifest_round_trip() {
		// Arrange
		let endpoint = Endpoint {
			host: "localhost".into(),
			port: 5432,
		};
		let design = Design::new()
			.bind_value("endpoint", Value::serializable(endpoint.clone()).unwrap())
			.bind_provider("url", format_endpoint())
			.bind_class::<Client>("client")
			.multi_bind_empty("hooks")
			.multi_bind_provider(
				"hooks",
				Injected::by_name("url").map_with(Transform::named("len", |v| {
					Ok(Value::new(v.downcast_ref::<String>().map_or(0, String::len)))
				})),
			);
		let mut catalog = ProviderCatalog::new();
		catalog
			.register_provider(format_endpoint())
			.register_transform(Transform::named("len", |v| Ok(v)))
			.register_class::<Client>()
			.register_type::<Endpoint>();

		// Act
		let manifest = design.to_manifest().unwrap();
		let json = manifest.to_json().unwrap();
		let parsed = DesignManifest::from_json(&json).unwrap();
		let rebuilt = parsed.clone().into_design(&catalog).unwrap();

		// Assert
		assert_eq!(parsed, manifest);
		assert_eq!(rebuilt.to_manifest().unwrap(), manifest);
		match rebuilt.get("endpoint") {
			Some(Binding::Instance(value)) => {
				assert_eq!(value.downcast_ref::<Endpoint>().unwrap(), &endpoint)
			}
			other => panic!("unexpected binding {:?}", other),
		}
	}

	#[rstest]
	fn test_missing_catalog_entry() {
		let manifest = Design::new()
			.bind_provider("url", format_endpoint())
			.to_manifest()
			.unwrap();
		let err = manifest.into_design(&ProviderCatalog::new()).unwrap_err();
		assert!(err.to_string().contains("provider 'endpoint::format' is not in the catalog"));
	}

	#[rstest]
	fn test_expression_manifest_keeps_tree() {
		// Arrange
		let expr = Expr::object(Value::function(Function::named("join", |args, _| {
			Ok(Value::new(args.len()))
		})))
		.call([Injected::by_name("cfg").proxy().attr("parts")]);
		let injected = Injected::eval(expr);

		// Act
		let manifest = injected.to_manifest().unwrap();

		// Assert
		let json = serde_json::to_value(&manifest).unwrap();
		assert_eq!(json["kind"], "evaluated");
		assert_eq!(json["expr"]["kind"], "call");
		assert_eq!(json["expr"]["func"]["value"]["symbol"], "join");
		assert_eq!(json["expr"]["args"][0]["name"], "parts");
	}
}
