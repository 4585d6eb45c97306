//! # Graft Core
//!
//! The instance contract and reference in-memory application wrapped by the
//! `graft` injector. An application is a tree of encapsulation scopes:
//! plugins register against a child scope by default, decorations attached
//! inside a scope are invisible to its parents, and routes are served through
//! an in-process inject round trip.
//!
//! ## Example
//!
//! ```rust,no_run
//! use graft_core::{App, Decoration, Instance, Plugin, Route};
//! use http::Method;
//! use serde_json::{json, Value};
//!
//! # async fn demo() -> graft_core::Result<()> {
//! let app = App::new();
//! app.decorate("greeting", Decoration::value("hello"))?
//!     .register(
//!         Plugin::new("routes", |ctx| async move {
//!             ctx.instance().route(Route::get("/greet", |req| async move {
//!                 Ok(json!({ "payload": req.instance("greeting")? }))
//!             }))?;
//!             Ok(())
//!         }),
//!         Value::Null,
//!     )?;
//!
//! let res = app.inject(Method::GET, "/greet").await?;
//! assert_eq!(res.json()["payload"], "hello");
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

pub mod app;
pub mod decoration;
pub mod error;
pub mod instance;
pub mod plugin;
pub mod route;

// Re-export commonly used types
pub use app::{App, InjectResponse, RequestContext};
pub use decoration::{Decoration, DecorationCall, DecorationFn};
pub use error::{Error, Result};
pub use instance::{CloseHook, Instance};
pub use plugin::{Plugin, PluginCtx, PluginFn};
pub use route::{Route, RouteHandler};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::app::{App, InjectResponse, RequestContext};
    pub use crate::decoration::{Decoration, DecorationCall};
    pub use crate::error::{Error, Result};
    pub use crate::instance::Instance;
    pub use crate::plugin::{Plugin, PluginCtx};
    pub use crate::route::Route;
}
