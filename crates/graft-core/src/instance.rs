//! The instance contract wrapped by injectors

use crate::decoration::Decoration;
use crate::error::Result;
use crate::plugin::Plugin;
use crate::route::Route;
use serde_json::Value;

/// Hook run when the owning application shuts down
pub type CloseHook = Box<dyn FnOnce() + Send>;

/// One instance scope of an application
///
/// Implemented both by the reference [`App`](crate::app::App) (and its child
/// scopes) and by injector wrappers, so plugin bodies cannot tell a wrapped
/// scope from a bare one. Mutating methods return the same chainable
/// reference the instance itself would, so call chaining survives wrapping.
pub trait Instance: Send + Sync {
    /// Attach a named decoration to the instance scope
    fn decorate(&self, name: &str, value: Decoration) -> Result<&dyn Instance>;

    /// Attach a named decoration to the reply scope
    fn decorate_reply(&self, name: &str, value: Decoration) -> Result<&dyn Instance>;

    /// Attach a named decoration to the request scope
    fn decorate_request(&self, name: &str, value: Decoration) -> Result<&dyn Instance>;

    /// Queue a plugin for registration; bodies run when the application is
    /// readied
    fn register(&self, plugin: Plugin, opts: Value) -> Result<&dyn Instance>;

    /// Register a route in this scope
    fn route(&self, route: Route) -> Result<&dyn Instance>;

    /// Look up an instance decoration visible from this scope
    fn decoration(&self, name: &str) -> Option<Decoration>;

    /// Run `hook` when the owning application closes
    fn on_close(&self, hook: CloseHook) -> Result<()>;
}
