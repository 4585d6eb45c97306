//! The interception wrapper around an application instance
//!
//! An [`Injector`] exposes the full [`Instance`] surface of the wrapped
//! application and rewrites the four mutating entry points: the three
//! decoration methods and `register`. Matching names are swapped for the
//! configured replacements, at most once per name, with the original kept
//! reachable by the replacement. Every registered plugin is additionally
//! wrapped so its body sees a fresh wrapper around its child scope, keeping
//! injection active at every encapsulation depth.

use crate::config::{Consumed, InjectorConfig, Kind};
use futures::future::BoxFuture;
use graft_core::{
    App, CloseHook, Decoration, Error, InjectResponse, Instance, Plugin, PluginCtx, Result, Route,
};
use http::Method;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared interception state: configuration, consumed-set, revocation flag
///
/// Cloned into every nested wrapper, so one-shot consumption and revocation
/// are global to the injector.
#[derive(Clone)]
pub(crate) struct Shim {
    config: Arc<InjectorConfig>,
    consumed: Arc<Consumed>,
    revoked: Arc<AtomicBool>,
}

impl Shim {
    fn guard(&self) -> Result<()> {
        if self.revoked.load(Ordering::SeqCst) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::SeqCst)
    }

    /// Substitute a decoration if a matching replacement is configured and
    /// not yet consumed; otherwise pass the value through unchanged.
    fn replace_decoration(&self, kind: Kind, name: &str, value: Decoration) -> Decoration {
        let Some(replacement) = self.config.decoration(kind, name) else {
            return value;
        };
        if !self.consumed.claim(kind, name) {
            return value;
        }
        tracing::debug!(name = %name, kind = ?kind, "substituting decoration");
        attach_original(replacement.clone(), value)
    }

    /// Wrap a plugin for registration: substitute its body when configured,
    /// and make every body run against a freshly wrapped child scope.
    fn wrap_plugin(&self, mut plugin: Plugin, opts: &Value) -> Plugin {
        // Keep the registration options readable from the plugin itself, for
        // consumers that inspect them later (fixture autoloading does).
        plugin.set_auto_config(opts.clone());

        let name = plugin.name().to_string();
        let encapsulate = plugin.encapsulate();
        let (callback, original) = match self.config.plugin_replacement(&name) {
            Some(replacement) if self.consumed.claim(Kind::Plugin, &name) => {
                tracing::debug!(plugin = %name, "substituting plugin");
                (Arc::clone(replacement), Some(plugin))
            }
            _ => (Arc::clone(plugin.callback()), None),
        };

        let shim = self.clone();
        let wrapper = move |ctx: PluginCtx| -> BoxFuture<'static, Result<()>> {
            let scoped: Arc<dyn Instance> = Arc::new(ScopedInjector {
                inner: ctx.instance_handle(),
                shim: shim.clone(),
            });
            let next = match &original {
                Some(orig) => PluginCtx::with_original(scoped, ctx.opts().clone(), orig.clone()),
                None => PluginCtx::new(scoped, ctx.opts().clone()),
            };
            callback(next)
        };

        // The wrapper carries the effective plugin's name and encapsulation
        // marker, so substitution never changes scoping behavior.
        let mut wrapped = Plugin::from_callback(name, encapsulate, Arc::new(wrapper));
        wrapped.set_auto_config(opts.clone());
        wrapped
    }
}

/// Attach the replaced original to a callable replacement
///
/// Non-callable replacements are installed as-is.
fn attach_original(replacement: Decoration, original: Decoration) -> Decoration {
    match replacement {
        Decoration::Fn(f) => Decoration::func(move |call| f(&call.chained(&original))),
        value => value,
    }
}

/// Interception wrapper around an [`App`]
///
/// Behaves exactly like the wrapped instance: all [`Instance`] methods chain,
/// and the lifecycle methods delegate. When the underlying application
/// closes, the wrapper is revoked and every further intercepted call fails
/// with [`Error::Closed`].
pub struct Injector {
    app: App,
    shim: Shim,
}

impl Injector {
    /// Wrap a freshly created application
    pub fn new(config: InjectorConfig) -> Self {
        Self::wrap(config, App::new())
    }

    /// Wrap a supplied application
    pub fn wrap(config: InjectorConfig, app: App) -> Self {
        let shim = Shim {
            config: Arc::new(config),
            consumed: Arc::new(Consumed::default()),
            revoked: Arc::new(AtomicBool::new(false)),
        };
        // Revoke the wrapper once the underlying instance shuts down.
        let revoked = Arc::clone(&shim.revoked);
        if app
            .on_close(Box::new(move || revoked.store(true, Ordering::SeqCst)))
            .is_err()
        {
            shim.revoked.store(true, Ordering::SeqCst);
        }
        tracing::debug!("injector attached");
        Self { app, shim }
    }

    /// The wrapped application
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Whether the wrapper has been revoked
    pub fn is_revoked(&self) -> bool {
        self.shim.is_revoked()
    }

    /// Run all pending plugin registrations
    pub async fn ready(&self) -> Result<()> {
        self.app.ready().await
    }

    /// Simulate a request against the wrapped application
    pub async fn inject(&self, method: Method, path: &str) -> Result<InjectResponse> {
        self.app.inject(method, path).await
    }

    /// Close the wrapped application, revoking this wrapper
    pub async fn close(&self) -> Result<()> {
        self.app.close().await
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("app", &self.app)
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

impl Instance for Injector {
    fn decorate(&self, name: &str, value: Decoration) -> Result<&dyn Instance> {
        self.shim.guard()?;
        let value = self.shim.replace_decoration(Kind::Instance, name, value);
        self.app.decorate(name, value)?;
        Ok(self)
    }

    fn decorate_reply(&self, name: &str, value: Decoration) -> Result<&dyn Instance> {
        self.shim.guard()?;
        let value = self.shim.replace_decoration(Kind::Reply, name, value);
        self.app.decorate_reply(name, value)?;
        Ok(self)
    }

    fn decorate_request(&self, name: &str, value: Decoration) -> Result<&dyn Instance> {
        self.shim.guard()?;
        let value = self.shim.replace_decoration(Kind::Request, name, value);
        self.app.decorate_request(name, value)?;
        Ok(self)
    }

    fn register(&self, plugin: Plugin, opts: Value) -> Result<&dyn Instance> {
        self.shim.guard()?;
        let wrapped = self.shim.wrap_plugin(plugin, &opts);
        self.app.register(wrapped, opts)?;
        Ok(self)
    }

    fn route(&self, route: Route) -> Result<&dyn Instance> {
        self.shim.guard()?;
        self.app.route(route)?;
        Ok(self)
    }

    fn decoration(&self, name: &str) -> Option<Decoration> {
        if self.shim.is_revoked() {
            return None;
        }
        self.app.decoration(name)
    }

    fn on_close(&self, hook: CloseHook) -> Result<()> {
        self.shim.guard()?;
        self.app.on_close(hook)
    }
}

/// Wrapper around a child scope, created for every plugin body
struct ScopedInjector {
    inner: Arc<dyn Instance>,
    shim: Shim,
}

impl Instance for ScopedInjector {
    fn decorate(&self, name: &str, value: Decoration) -> Result<&dyn Instance> {
        self.shim.guard()?;
        let value = self.shim.replace_decoration(Kind::Instance, name, value);
        self.inner.decorate(name, value)?;
        Ok(self)
    }

    fn decorate_reply(&self, name: &str, value: Decoration) -> Result<&dyn Instance> {
        self.shim.guard()?;
        let value = self.shim.replace_decoration(Kind::Reply, name, value);
        self.inner.decorate_reply(name, value)?;
        Ok(self)
    }

    fn decorate_request(&self, name: &str, value: Decoration) -> Result<&dyn Instance> {
        self.shim.guard()?;
        let value = self.shim.replace_decoration(Kind::Request, name, value);
        self.inner.decorate_request(name, value)?;
        Ok(self)
    }

    fn register(&self, plugin: Plugin, opts: Value) -> Result<&dyn Instance> {
        self.shim.guard()?;
        let wrapped = self.shim.wrap_plugin(plugin, &opts);
        self.inner.register(wrapped, opts)?;
        Ok(self)
    }

    fn route(&self, route: Route) -> Result<&dyn Instance> {
        self.shim.guard()?;
        self.inner.route(route)?;
        Ok(self)
    }

    fn decoration(&self, name: &str) -> Option<Decoration> {
        if self.shim.is_revoked() {
            return None;
        }
        self.inner.decoration(name)
    }

    fn on_close(&self, hook: CloseHook) -> Result<()> {
        self.shim.guard()?;
        self.inner.on_close(hook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shim(config: InjectorConfig) -> Shim {
        Shim {
            config: Arc::new(config),
            consumed: Arc::new(Consumed::default()),
            revoked: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn test_unmatched_name_passes_through() {
        let shim = shim(InjectorConfig::new());
        let value = Decoration::value("bar");
        let out = shim.replace_decoration(Kind::Instance, "foo", value);
        assert_eq!(out.as_value(), Some(&json!("bar")));
    }

    #[test]
    fn test_replacement_fires_once() {
        let shim = shim(
            InjectorConfig::new().decorator("foo", Decoration::value("injected")),
        );

        let first = shim.replace_decoration(Kind::Instance, "foo", Decoration::value("bar"));
        assert_eq!(first.as_value(), Some(&json!("injected")));

        let second = shim.replace_decoration(Kind::Instance, "foo", Decoration::value("again"));
        assert_eq!(second.as_value(), Some(&json!("again")));
    }

    #[test]
    fn test_attach_original_passthrough() {
        let replacement = Decoration::func(|call| {
            let orig = call.call_original()?;
            Ok(json!(format!("{} -> passthrough", orig.as_str().unwrap_or(""))))
        });
        let attached = attach_original(replacement, Decoration::func(|_| Ok(json!("bar"))));
        assert_eq!(attached.resolve().unwrap(), json!("bar -> passthrough"));
    }

    #[test]
    fn test_guard_after_revoke() {
        let shim = shim(InjectorConfig::new());
        assert!(shim.guard().is_ok());
        shim.revoked.store(true, Ordering::SeqCst);
        assert!(matches!(shim.guard(), Err(Error::Closed)));
    }
}
