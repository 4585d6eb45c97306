//! # Graft
//!
//! Transparent test-double injection for graft app instances.
//!
//! An [`Injector`] wraps an application instance so that, during tests,
//! selected decorations and registered plugins are swapped for configured
//! replacements. The wrapper exposes the full instance surface unchanged;
//! only the three decoration methods and `register` are rewritten. Each
//! configured name is substituted at most once, on the first matching call,
//! and the replaced original stays reachable from the replacement so
//! "call original and extend" compositions work.
//!
//! ## Example
//!
//! ```rust,no_run
//! use graft::{Injector, InjectorConfig};
//! use graft_core::{Decoration, Instance};
//! use serde_json::json;
//!
//! # async fn demo() -> graft_core::Result<()> {
//! let app = Injector::new(
//!     InjectorConfig::new()
//!         .reply_decorator("session", Decoration::func(|_| Ok(json!("test-session")))),
//! );
//!
//! // Installs the replacement, not the real decoration.
//! app.decorate_reply("session", Decoration::func(|_| Ok(json!("real-session"))))?;
//! app.ready().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod config;
pub mod fixtures;
pub mod injector;

// Re-export commonly used types
pub use config::InjectorConfig;
pub use fixtures::{Fixture, FixtureConfig, Fixtures};
pub use injector::Injector;

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::config::InjectorConfig;
    pub use crate::fixtures::{Fixture, FixtureConfig, Fixtures};
    pub use crate::injector::Injector;
    pub use graft_core::prelude::*;
}
