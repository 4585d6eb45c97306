//! Plugin model: named registration units with encapsulation scoping

use crate::error::{Error, Result};
use crate::instance::Instance;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Signature of a plugin body, already boxed
///
/// The body receives a [`PluginCtx`] bound to the scope the plugin was
/// registered against.
pub type PluginFn = Arc<dyn Fn(PluginCtx) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A named unit of registration
///
/// Plugins carry a stable name used as their identity, an encapsulation flag
/// deciding whether they run against a child scope or the registering scope,
/// and the options they were last registered with (`auto_config`).
#[derive(Clone)]
pub struct Plugin {
    name: String,
    encapsulate: bool,
    auto_config: Option<Value>,
    callback: PluginFn,
}

impl Plugin {
    /// Create an encapsulated plugin: its body runs against a child scope
    pub fn new<F, Fut>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(PluginCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::from_callback(name, true, Arc::new(move |ctx| Box::pin(callback(ctx))))
    }

    /// Create a shared plugin: its body runs in the registering scope
    pub fn shared<F, Fut>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(PluginCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::from_callback(name, false, Arc::new(move |ctx| Box::pin(callback(ctx))))
    }

    /// Build a plugin from an already-boxed callback
    pub fn from_callback(name: impl Into<String>, encapsulate: bool, callback: PluginFn) -> Self {
        Self {
            name: name.into(),
            encapsulate,
            auto_config: None,
            callback,
        }
    }

    /// Plugin name, used as its identity
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the plugin runs against a child scope
    pub fn encapsulate(&self) -> bool {
        self.encapsulate
    }

    /// The options this plugin was last registered with, if recorded
    pub fn auto_config(&self) -> Option<&Value> {
        self.auto_config.as_ref()
    }

    /// Record the options this plugin is being registered with
    pub fn set_auto_config(&mut self, opts: Value) {
        self.auto_config = Some(opts);
    }

    /// The plugin body
    pub fn callback(&self) -> &PluginFn {
        &self.callback
    }

    /// Invoke the plugin body
    pub fn run(&self, ctx: PluginCtx) -> BoxFuture<'static, Result<()>> {
        (self.callback)(ctx)
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("encapsulate", &self.encapsulate)
            .field("auto_config", &self.auto_config)
            .finish()
    }
}

/// Everything a plugin body sees when it runs
///
/// Holds the (possibly wrapped) instance scope the plugin registers against,
/// the options passed to `register`, and, for substituted plugins, the
/// replaced original.
#[derive(Clone)]
pub struct PluginCtx {
    instance: Arc<dyn Instance>,
    opts: Value,
    original: Option<Plugin>,
}

impl PluginCtx {
    /// Create a context without a replaced original
    pub fn new(instance: Arc<dyn Instance>, opts: Value) -> Self {
        Self {
            instance,
            opts,
            original: None,
        }
    }

    /// Create a context exposing a replaced original plugin
    pub fn with_original(instance: Arc<dyn Instance>, opts: Value, original: Plugin) -> Self {
        Self {
            instance,
            opts,
            original: Some(original),
        }
    }

    /// The instance scope the plugin registers against
    pub fn instance(&self) -> &dyn Instance {
        self.instance.as_ref()
    }

    /// A shareable handle to the instance scope
    pub fn instance_handle(&self) -> Arc<dyn Instance> {
        Arc::clone(&self.instance)
    }

    /// Options passed to `register`
    pub fn opts(&self) -> &Value {
        &self.opts
    }

    /// The replaced original plugin, if this one was substituted
    pub fn original(&self) -> Option<&Plugin> {
        self.original.as_ref()
    }

    /// Run the replaced original plugin against the same instance and options
    pub async fn call_original(&self) -> Result<()> {
        match &self.original {
            Some(original) => {
                original
                    .run(PluginCtx::new(self.instance_handle(), self.opts.clone()))
                    .await
            }
            None => Err(Error::NoOriginal),
        }
    }
}

impl fmt::Debug for PluginCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCtx")
            .field("opts", &self.opts)
            .field("original", &self.original.as_ref().map(Plugin::name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_flags() {
        let encapsulated = Plugin::new("a", |_ctx| async { Ok(()) });
        assert!(encapsulated.encapsulate());
        assert_eq!(encapsulated.name(), "a");

        let shared = Plugin::shared("b", |_ctx| async { Ok(()) });
        assert!(!shared.encapsulate());
    }

    #[test]
    fn test_auto_config_roundtrip() {
        let mut plugin = Plugin::new("a", |_ctx| async { Ok(()) });
        assert!(plugin.auto_config().is_none());

        plugin.set_auto_config(serde_json::json!({ "x": 1 }));
        assert_eq!(plugin.auto_config(), Some(&serde_json::json!({ "x": 1 })));
    }
}
