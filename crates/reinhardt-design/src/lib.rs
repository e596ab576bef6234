//! # Reinhardt Design
//!
//! Binding registry and dependency expressions for the Reinhardt injector.
//!
//! ## Features
//!
//! - **Designs**: immutable, mergeable registries of named bindings
//! - **Injected**: composable values that declare the keys they need
//! - **Expressions**: record calls, attribute reads and indexing against
//!   values that are not resolved yet, then compile them into `Injected`
//! - **Graph analysis**: per-key dependencies and a missing-dependency
//!   report covering every broken path at once
//! - **Manifests**: serde descriptions of designs for out-of-process use
//!
//! ## Example
//!
//! ```rust
//! use reinhardt_design::{DIGraph, Design, Key, provider};
//!
//! let design = Design::new()
//!     .bind_instance("a", 1i64)
//!     .bind_provider("f", provider!(|a: i64, b: i64| a + b));
//!
//! let graph = DIGraph::new(design.build());
//! let missing = graph.find_missing_dependencies(["f"]);
//! assert_eq!(missing[0].key, Key::from("b"));
//! ```
//!
//! Resolution itself lives in `reinhardt-resolver`.

pub mod design;
pub mod designed;
pub mod error;
pub mod expr;
pub mod graph;
pub mod injected;
pub mod key;
pub mod manifest;
pub mod provider;
pub mod value;

pub use design::{
	Binding, BuiltDesign, Design, MultiBinding, MultiEntry, ResolvedBinding, classes, instances,
	providers,
};
pub use designed::{Designed, DesignedApplicative};
pub use error::{
	BoxError, DependencyResolutionFailure, DiError, DiResult, FailureCause, MissingDependencies,
	ProviderFailure,
};
pub use expr::{Applicative, Expr, ExprNode, InjectedApplicative, eval};
pub use graph::{DIGraph, GraphStatistics};
pub use injected::{Injected, Transform};
pub use key::{Key, format_path};
pub use manifest::{
	BindingManifest, DesignManifest, ExprManifest, InjectedManifest, MultiEntryManifest,
	ProviderCatalog, ValueManifest,
};
pub use provider::{ClassBinding, Dependencies, Injectable, Provider, ResourceRegistry, Teardown};
pub use value::{ExpressionError, Function, Object, Snapshot, Value};

// Re-exported for `Injectable` implementations.
pub use async_trait::async_trait;
