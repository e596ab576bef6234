//! # Reinhardt Inject
//!
//! Key-based dependency injection for async Rust.
//!
//! Bindings are registered by name in an immutable [`Design`]. A provider
//! declares the keys it needs through its parameter names; the resolver
//! builds each key once per scope, runs independent dependencies
//! concurrently and reports every missing key at once, with the path that
//! needed it.
//!
//! ## Crates
//!
//! - [`design`]: designs, providers, deferred expressions, graph analysis
//!   and serializable manifests
//! - [`resolver`]: the asynchronous resolver, scope chain and configuration
//!   (feature `resolver`, on by default)
//!
//! ## Quick Example
//!
//! ```rust
//! use reinhardt_inject::prelude::*;
//!
//! let design = Design::new()
//!     .bind_instance("a", 1i64)
//!     .bind_instance("b", 2i64)
//!     .bind_provider("f", provider!(|a: i64, b: i64| a + b));
//!
//! let f = resolve(&design, "f").unwrap();
//! assert_eq!(f.downcast_ref::<i64>(), Some(&3));
//!
//! let overridden = design + Design::new().bind_instance("a", 2i64);
//! let f = resolve(&overridden, "f").unwrap();
//! assert_eq!(f.downcast_ref::<i64>(), Some(&4));
//! ```

pub use reinhardt_design as design;

#[cfg(feature = "resolver")]
pub use reinhardt_resolver as resolver;

pub use reinhardt_design::{async_provider, provider};

/// Commonly used types
pub mod prelude {
	pub use reinhardt_design::{
		Binding, BoxError, ClassBinding, Dependencies, Design, Designed, DiError, DiResult, Expr,
		Injectable, Injected, Key, Provider, Value, async_provider, async_trait, classes, instances,
		provider, providers,
	};

	#[cfg(feature = "resolver")]
	pub use reinhardt_resolver::{AsyncResolver, ResolverConfig, Target, a_resolve, resolve};
}
