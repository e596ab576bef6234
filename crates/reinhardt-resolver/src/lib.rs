//! # Reinhardt Resolver
//!
//! Asynchronous resolution of [`reinhardt_design`] designs.
//!
//! ## Features
//!
//! - **Once per scope**: each key is built at most once in the scope that
//!   owns it, and concurrent requests share the pending construction
//! - **Parallel dependencies**: the inputs of a binding are resolved
//!   concurrently; the first failure cancels its siblings
//! - **Scope chain**: child resolvers build their overrides locally and
//!   reuse everything else from the parent
//! - **Diagnostics**: unbound keys are reported together with the path
//!   that needed them, before any provider runs
//! - **Teardown**: resource providers are released newest first when their
//!   scope closes
//!
//! ## Example
//!
//! ```rust
//! use reinhardt_resolver::{Design, provider, resolve};
//!
//! let design = Design::new()
//!     .bind_instance("a", 1i64)
//!     .bind_instance("b", 2i64)
//!     .bind_provider("f", provider!(|a: i64, b: i64| a + b));
//!
//! let f = resolve(&design, "f").unwrap();
//! assert_eq!(f.downcast_ref::<i64>(), Some(&3));
//! ```

pub mod config;
pub mod resolver;
pub mod scope;
pub mod trace;

pub use config::{ConfigError, DEFAULT_ENV_PREFIX, ResolverConfig};
pub use resolver::{AsyncResolver, Target, a_resolve, resolve};
pub use scope::{BindingSource, Scope};
pub use trace::{MAX_RESOLUTION_DEPTH, ResolutionTrace};

pub use reinhardt_design::{self, async_provider, provider};
pub use reinhardt_design::{
	Binding, BoxError, BuiltDesign, DIGraph, Dependencies, Design, Designed, DiError, DiResult,
	Expr, Injectable, Injected, Key, MissingDependencies, Provider, Value,
};
