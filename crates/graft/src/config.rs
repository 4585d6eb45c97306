//! Injection configuration: name-keyed replacement tables
//!
//! The configuration itself is immutable once built. One-shot consumption is
//! tracked separately in [`Consumed`], shared by every wrapper an injector
//! spawns, so a name claimed anywhere in the scope tree stays claimed.

use graft_core::{Decoration, PluginCtx, PluginFn};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Which replacement table a name belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Kind {
    Instance,
    Reply,
    Request,
    Plugin,
}

/// Replacement tables for one injector
///
/// Four independent mappings, each keyed by decoration or plugin name. Built
/// with the chainable methods and handed to [`Injector`](crate::Injector).
#[derive(Default, Clone)]
pub struct InjectorConfig {
    decorators: HashMap<String, Decoration>,
    reply_decorators: HashMap<String, Decoration>,
    request_decorators: HashMap<String, Decoration>,
    plugins: HashMap<String, PluginFn>,
}

impl InjectorConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the instance decoration `name`
    pub fn decorator(mut self, name: impl Into<String>, replacement: Decoration) -> Self {
        self.decorators.insert(name.into(), replacement);
        self
    }

    /// Replace the reply decoration `name`
    pub fn reply_decorator(mut self, name: impl Into<String>, replacement: Decoration) -> Self {
        self.reply_decorators.insert(name.into(), replacement);
        self
    }

    /// Replace the request decoration `name`
    pub fn request_decorator(mut self, name: impl Into<String>, replacement: Decoration) -> Self {
        self.request_decorators.insert(name.into(), replacement);
        self
    }

    /// Replace the body of the plugin registered under `name`
    ///
    /// The replacement receives the original plugin through
    /// [`PluginCtx::original`] and can delegate to it with
    /// [`PluginCtx::call_original`].
    pub fn plugin<F, Fut>(mut self, name: impl Into<String>, replacement: F) -> Self
    where
        F: Fn(PluginCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = graft_core::Result<()>> + Send + 'static,
    {
        self.plugins
            .insert(name.into(), Arc::new(move |ctx| Box::pin(replacement(ctx))));
        self
    }

    pub(crate) fn decoration(&self, kind: Kind, name: &str) -> Option<&Decoration> {
        match kind {
            Kind::Instance => self.decorators.get(name),
            Kind::Reply => self.reply_decorators.get(name),
            Kind::Request => self.request_decorators.get(name),
            Kind::Plugin => None,
        }
    }

    pub(crate) fn plugin_replacement(&self, name: &str) -> Option<&PluginFn> {
        self.plugins.get(name)
    }
}

impl fmt::Debug for InjectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectorConfig")
            .field("decorators", &self.decorators.keys())
            .field("reply_decorators", &self.reply_decorators.keys())
            .field("request_decorators", &self.request_decorators.keys())
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Names already substituted, shared across nested wrappers
///
/// Claiming is a single check-and-insert under one lock, so a name can be
/// consumed at most once per injector.
#[derive(Debug, Default)]
pub(crate) struct Consumed {
    claimed: Mutex<HashSet<(Kind, String)>>,
}

impl Consumed {
    /// Returns true exactly once per `(kind, name)` pair.
    pub(crate) fn claim(&self, kind: Kind, name: &str) -> bool {
        self.claimed.lock().insert((kind, name.to_string()))
    }
}
