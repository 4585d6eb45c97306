//! Reference in-memory application instance
//!
//! Implements the contract injectors wrap: scoped decorations, queued plugin
//! registration with encapsulation, a global route table, and an in-process
//! inject round trip. There is no transport; requests are simulated.

use crate::decoration::{Decoration, DecorationCall};
use crate::error::{Error, Result};
use crate::instance::{CloseHook, Instance};
use crate::plugin::{Plugin, PluginCtx};
use crate::route::{Route, RouteHandler};
use futures::future::BoxFuture;
use http::{Method, StatusCode};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

type ScopeId = usize;

const ROOT: ScopeId = 0;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Slot {
    Instance,
    Request,
    Reply,
}

struct Scope {
    parent: Option<ScopeId>,
    prefix: String,
    instance: HashMap<String, Decoration>,
    request: HashMap<String, Decoration>,
    reply: HashMap<String, Decoration>,
    pending: VecDeque<(Plugin, Value)>,
}

impl Scope {
    fn new(parent: Option<ScopeId>, prefix: String) -> Self {
        Self {
            parent,
            prefix,
            instance: HashMap::new(),
            request: HashMap::new(),
            reply: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    fn slot(&self, slot: Slot) -> &HashMap<String, Decoration> {
        match slot {
            Slot::Instance => &self.instance,
            Slot::Request => &self.request,
            Slot::Reply => &self.reply,
        }
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut HashMap<String, Decoration> {
        match slot {
            Slot::Instance => &mut self.instance,
            Slot::Request => &mut self.request,
            Slot::Reply => &mut self.reply,
        }
    }
}

#[derive(Clone)]
struct RegisteredRoute {
    scope: ScopeId,
    handler: RouteHandler,
}

struct AppInner {
    scopes: Vec<Scope>,
    routes: HashMap<(Method, String), RegisteredRoute>,
    close_hooks: Vec<CloseHook>,
    closed: bool,
}

impl AppInner {
    /// Walk the scope chain child-first and clone the first match.
    fn lookup(&self, mut scope: ScopeId, slot: Slot, name: &str) -> Option<Decoration> {
        loop {
            if let Some(found) = self.scopes[scope].slot(slot).get(name) {
                return Some(found.clone());
            }
            scope = self.scopes[scope].parent?;
        }
    }

    fn add_decoration(
        &mut self,
        scope: ScopeId,
        slot: Slot,
        name: &str,
        value: Decoration,
    ) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        if self.lookup(scope, slot, name).is_some() {
            return Err(Error::DuplicateDecoration(name.to_string()));
        }
        self.scopes[scope].slot_mut(slot).insert(name.to_string(), value);
        Ok(())
    }

    fn queue_plugin(&mut self, scope: ScopeId, plugin: Plugin, opts: Value) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        tracing::debug!(plugin = %plugin.name(), "plugin queued");
        self.scopes[scope].pending.push_back((plugin, opts));
        Ok(())
    }

    fn add_route(&mut self, scope: ScopeId, route: Route) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        let path = join_prefix(&self.scopes[scope].prefix, &route.path);
        let key = (route.method.clone(), path);
        if self.routes.contains_key(&key) {
            return Err(Error::DuplicateRoute {
                method: key.0.to_string(),
                path: key.1,
            });
        }
        tracing::debug!(method = %key.0, path = %key.1, "route registered");
        self.routes.insert(
            key,
            RegisteredRoute {
                scope,
                handler: route.handler,
            },
        );
        Ok(())
    }
}

fn join_prefix(base: &str, extra: &str) -> String {
    let mut out = String::from(base.trim_end_matches('/'));
    let extra = extra.trim_end_matches('/');
    if !extra.is_empty() {
        if !extra.starts_with('/') {
            out.push('/');
        }
        out.push_str(extra);
    }
    // A bare "/" trims down to nothing; the root path must stay addressable.
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// The reference application instance
///
/// Cheap to clone; clones share the same underlying state. The [`Instance`]
/// implementation operates on the root scope.
#[derive(Clone)]
pub struct App {
    inner: Arc<Mutex<AppInner>>,
}

impl App {
    /// Create an empty application with a single root scope
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(AppInner {
                scopes: vec![Scope::new(None, String::new())],
                routes: HashMap::new(),
                close_hooks: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Run all pending plugin registrations, including ones queued by plugin
    /// bodies while they run
    pub async fn ready(&self) -> Result<()> {
        loop {
            let job = {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return Err(Error::Closed);
                }
                let mut found = None;
                for (id, scope) in inner.scopes.iter_mut().enumerate() {
                    if let Some(pending) = scope.pending.pop_front() {
                        found = Some((id, pending));
                        break;
                    }
                }
                found
            };
            let Some((scope, (plugin, opts))) = job else {
                return Ok(());
            };
            self.run_plugin(scope, plugin, opts).await?;
        }
    }

    async fn run_plugin(&self, scope: ScopeId, plugin: Plugin, opts: Value) -> Result<()> {
        let target = {
            let mut inner = self.inner.lock();
            if plugin.encapsulate() {
                let prefix = join_prefix(
                    &inner.scopes[scope].prefix,
                    opts.get("prefix").and_then(Value::as_str).unwrap_or(""),
                );
                inner.scopes.push(Scope::new(Some(scope), prefix));
                inner.scopes.len() - 1
            } else {
                scope
            }
        };
        let name = plugin.name().to_string();
        tracing::debug!(plugin = %name, encapsulate = plugin.encapsulate(), "running plugin");
        let handle: Arc<dyn Instance> = Arc::new(ScopeRef {
            inner: Arc::clone(&self.inner),
            scope: target,
        });
        plugin
            .run(PluginCtx::new(handle, opts))
            .await
            .map_err(|err| match err {
                err @ Error::Plugin { .. } => err,
                other => Error::plugin(name, other),
            })?;
        // Registrations made by the body run before any earlier-queued
        // sibling does: loading is depth-first.
        if target != scope {
            self.drain_scope(target).await?;
        }
        Ok(())
    }

    /// Run everything pending in one scope, including registrations its
    /// plugins queue while running
    fn drain_scope(&self, scope: ScopeId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            loop {
                let job = {
                    let mut inner = self.inner.lock();
                    if inner.closed {
                        return Err(Error::Closed);
                    }
                    inner.scopes[scope].pending.pop_front()
                };
                let Some((plugin, opts)) = job else {
                    return Ok(());
                };
                self.run_plugin(scope, plugin, opts).await?;
            }
        })
    }

    /// Simulate a request and return the response
    ///
    /// Awaits readiness first, so pending registrations are always applied.
    pub async fn inject(&self, method: Method, path: &str) -> Result<InjectResponse> {
        self.ready().await?;
        let found = {
            let inner = self.inner.lock();
            inner.routes.get(&(method.clone(), path.to_string())).cloned()
        };
        let Some(route) = found else {
            return Ok(InjectResponse {
                status: StatusCode::NOT_FOUND,
                payload: serde_json::json!({ "error": "route not found", "path": path }),
            });
        };
        let ctx = RequestContext {
            inner: Arc::clone(&self.inner),
            scope: route.scope,
            method,
            path: path.to_string(),
        };
        match (route.handler)(ctx).await {
            Ok(payload) => Ok(InjectResponse {
                status: StatusCode::OK,
                payload,
            }),
            Err(err) => Ok(InjectResponse {
                status: err.to_status_code(),
                payload: serde_json::json!({ "error": err.to_string() }),
            }),
        }
    }

    /// Close the application: run close hooks (newest first) and refuse
    /// further mutation
    ///
    /// Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let hooks = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Ok(());
            }
            inner.closed = true;
            std::mem::take(&mut inner.close_hooks)
        };
        for hook in hooks.into_iter().rev() {
            hook();
        }
        tracing::debug!("instance closed");
        Ok(())
    }

    /// Whether the application has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("App")
            .field("scopes", &inner.scopes.len())
            .field("routes", &inner.routes.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

impl Instance for App {
    fn decorate(&self, name: &str, value: Decoration) -> Result<&dyn Instance> {
        self.inner
            .lock()
            .add_decoration(ROOT, Slot::Instance, name, value)?;
        Ok(self)
    }

    fn decorate_reply(&self, name: &str, value: Decoration) -> Result<&dyn Instance> {
        self.inner
            .lock()
            .add_decoration(ROOT, Slot::Reply, name, value)?;
        Ok(self)
    }

    fn decorate_request(&self, name: &str, value: Decoration) -> Result<&dyn Instance> {
        self.inner
            .lock()
            .add_decoration(ROOT, Slot::Request, name, value)?;
        Ok(self)
    }

    fn register(&self, plugin: Plugin, opts: Value) -> Result<&dyn Instance> {
        self.inner.lock().queue_plugin(ROOT, plugin, opts)?;
        Ok(self)
    }

    fn route(&self, route: Route) -> Result<&dyn Instance> {
        self.inner.lock().add_route(ROOT, route)?;
        Ok(self)
    }

    fn decoration(&self, name: &str) -> Option<Decoration> {
        self.inner.lock().lookup(ROOT, Slot::Instance, name)
    }

    fn on_close(&self, hook: CloseHook) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Error::Closed);
        }
        inner.close_hooks.push(hook);
        Ok(())
    }
}

/// Handle to one (possibly child) scope of an application
struct ScopeRef {
    inner: Arc<Mutex<AppInner>>,
    scope: ScopeId,
}

impl Instance for ScopeRef {
    fn decorate(&self, name: &str, value: Decoration) -> Result<&dyn Instance> {
        self.inner
            .lock()
            .add_decoration(self.scope, Slot::Instance, name, value)?;
        Ok(self)
    }

    fn decorate_reply(&self, name: &str, value: Decoration) -> Result<&dyn Instance> {
        self.inner
            .lock()
            .add_decoration(self.scope, Slot::Reply, name, value)?;
        Ok(self)
    }

    fn decorate_request(&self, name: &str, value: Decoration) -> Result<&dyn Instance> {
        self.inner
            .lock()
            .add_decoration(self.scope, Slot::Request, name, value)?;
        Ok(self)
    }

    fn register(&self, plugin: Plugin, opts: Value) -> Result<&dyn Instance> {
        self.inner.lock().queue_plugin(self.scope, plugin, opts)?;
        Ok(self)
    }

    fn route(&self, route: Route) -> Result<&dyn Instance> {
        self.inner.lock().add_route(self.scope, route)?;
        Ok(self)
    }

    fn decoration(&self, name: &str) -> Option<Decoration> {
        self.inner.lock().lookup(self.scope, Slot::Instance, name)
    }

    fn on_close(&self, hook: CloseHook) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Error::Closed);
        }
        inner.close_hooks.push(hook);
        Ok(())
    }
}

/// The request a route handler or decoration is serving
///
/// Bound to the scope the route was registered in; decoration lookups walk
/// that scope's chain up to the root.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<Mutex<AppInner>>,
    scope: ScopeId,
    method: Method,
    path: String,
}

impl RequestContext {
    /// Request method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Resolve an instance decoration visible from the route's scope
    pub fn instance(&self, name: &str) -> Result<Value> {
        self.call_slot(Slot::Instance, name)
    }

    /// Invoke a request decoration visible from the route's scope
    pub fn request(&self, name: &str) -> Result<Value> {
        self.call_slot(Slot::Request, name)
    }

    /// Invoke a reply decoration visible from the route's scope
    pub fn reply(&self, name: &str) -> Result<Value> {
        self.call_slot(Slot::Reply, name)
    }

    fn call_slot(&self, slot: Slot, name: &str) -> Result<Value> {
        // Clone out of the lock before invoking: decorations may call back.
        let decoration = self
            .inner
            .lock()
            .lookup(self.scope, slot, name)
            .ok_or_else(|| Error::UnknownDecoration(name.to_string()))?;
        decoration.call(&DecorationCall::with_ctx(self))
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Response produced by [`App::inject`]
#[derive(Debug, Clone)]
pub struct InjectResponse {
    status: StatusCode,
    payload: Value,
}

impl InjectResponse {
    /// Response status
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response payload
    pub fn json(&self) -> &Value {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duplicate_decoration() {
        let app = App::new();
        app.decorate("foo", Decoration::value("bar")).unwrap();
        let result = app.decorate("foo", Decoration::value("baz"));
        assert!(matches!(result, Err(Error::DuplicateDecoration(_))));
    }

    #[test]
    fn test_chaining() {
        let app = App::new();
        app.decorate("a", Decoration::value(1))
            .unwrap()
            .decorate_reply("b", Decoration::value(2))
            .unwrap()
            .decorate_request("c", Decoration::value(3))
            .unwrap();
        assert!(app.decoration("a").is_some());
    }

    #[tokio::test]
    async fn test_inject_round_trip() {
        let app = App::new();
        app.decorate("greeting", Decoration::value("hello"))
            .unwrap()
            .route(Route::get("/greet", |req| async move {
                Ok(json!({ "payload": req.instance("greeting")? }))
            }))
            .unwrap();

        let res = app.inject(Method::GET, "/greet").await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.json()["payload"], "hello");
    }

    #[tokio::test]
    async fn test_root_route_reachable() {
        let app = App::new();
        app.route(Route::get("/", |_req| async { Ok(json!("root")) }))
            .unwrap();

        let res = app.inject(Method::GET, "/").await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.json(), &json!("root"));
    }

    #[tokio::test]
    async fn test_root_route_in_unprefixed_plugin_scope() {
        let app = App::new();
        app.register(
            Plugin::new("root_route", |ctx| async move {
                ctx.instance()
                    .route(Route::get("/", |_req| async { Ok(json!("scoped")) }))?;
                Ok(())
            }),
            Value::Null,
        )
        .unwrap();

        let res = app.inject(Method::GET, "/").await.unwrap();
        assert_eq!(res.json(), &json!("scoped"));
    }

    #[tokio::test]
    async fn test_route_not_found() {
        let app = App::new();
        let res = app.inject(Method::GET, "/missing").await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_encapsulated_plugin_does_not_leak() {
        let app = App::new();
        app.register(
            Plugin::new("child", |ctx| async move {
                ctx.instance().decorate("inside", Decoration::value(true))?;
                Ok(())
            }),
            Value::Null,
        )
        .unwrap();
        app.ready().await.unwrap();

        assert!(app.decoration("inside").is_none());
    }

    #[tokio::test]
    async fn test_shared_plugin_runs_in_parent_scope() {
        let app = App::new();
        app.register(
            Plugin::shared("shared", |ctx| async move {
                ctx.instance().decorate("inside", Decoration::value(true))?;
                Ok(())
            }),
            Value::Null,
        )
        .unwrap();
        app.ready().await.unwrap();

        assert!(app.decoration("inside").is_some());
    }

    #[tokio::test]
    async fn test_nested_registration_runs() {
        let app = App::new();
        app.register(
            Plugin::new("outer", |ctx| async move {
                ctx.instance().register(
                    Plugin::new("inner", |ctx| async move {
                        ctx.instance()
                            .route(Route::get("/deep", |_req| async { Ok(json!("ok")) }))?;
                        Ok(())
                    }),
                    Value::Null,
                )?;
                Ok(())
            }),
            Value::Null,
        )
        .unwrap();

        let res = app.inject(Method::GET, "/deep").await.unwrap();
        assert_eq!(res.json(), &json!("ok"));
    }

    #[tokio::test]
    async fn test_nested_registration_runs_before_later_sibling() {
        let app = App::new();
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&order);
        app.register(
            Plugin::new("outer", move |ctx| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().push("outer");
                    let nested_seen = Arc::clone(&seen);
                    ctx.instance().register(
                        Plugin::new("nested", move |_ctx| {
                            let seen = Arc::clone(&nested_seen);
                            async move {
                                seen.lock().push("nested");
                                Ok(())
                            }
                        }),
                        Value::Null,
                    )?;
                    Ok(())
                }
            }),
            Value::Null,
        )
        .unwrap();

        let seen = Arc::clone(&order);
        app.register(
            Plugin::new("sibling", move |_ctx| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().push("sibling");
                    Ok(())
                }
            }),
            Value::Null,
        )
        .unwrap();

        app.ready().await.unwrap();
        assert_eq!(*order.lock(), vec!["outer", "nested", "sibling"]);
    }

    #[tokio::test]
    async fn test_register_prefix_applies_to_routes() {
        let app = App::new();
        app.register(
            Plugin::new("api", |ctx| async move {
                ctx.instance()
                    .route(Route::get("/ping", |_req| async { Ok(json!("pong")) }))?;
                Ok(())
            }),
            json!({ "prefix": "/v1" }),
        )
        .unwrap();

        let res = app.inject(Method::GET, "/v1/ping").await.unwrap();
        assert_eq!(res.json(), &json!("pong"));
    }

    #[tokio::test]
    async fn test_child_scope_sees_parent_decorations() {
        let app = App::new();
        app.decorate_reply("bar", Decoration::func(|_| Ok(json!("foobar"))))
            .unwrap()
            .register(
                Plugin::new("child", |ctx| async move {
                    ctx.instance()
                        .route(Route::get("/bar", |req| async move {
                            Ok(json!({ "payload": req.reply("bar")? }))
                        }))?;
                    Ok(())
                }),
                Value::Null,
            )
            .unwrap();

        let res = app.inject(Method::GET, "/bar").await.unwrap();
        assert_eq!(res.json()["payload"], "foobar");
    }

    #[tokio::test]
    async fn test_plugin_failure_maps_to_plugin_error() {
        let app = App::new();
        app.register(
            Plugin::new("broken", |_ctx| async {
                Err(Error::UnknownDecoration("nope".to_string()))
            }),
            Value::Null,
        )
        .unwrap();

        let err = app.ready().await.unwrap_err();
        assert!(matches!(err, Error::Plugin { plugin, .. } if plugin == "broken"));
    }

    #[tokio::test]
    async fn test_close_runs_hooks_once() {
        let app = App::new();
        let flag = Arc::new(Mutex::new(0));
        let seen = Arc::clone(&flag);
        app.on_close(Box::new(move || *seen.lock() += 1)).unwrap();

        app.close().await.unwrap();
        app.close().await.unwrap();
        assert_eq!(*flag.lock(), 1);

        let result = app.decorate("late", Decoration::value(1));
        assert!(matches!(result, Err(Error::Closed)));
    }

    #[test]
    fn test_join_prefix() {
        assert_eq!(join_prefix("", "/foo"), "/foo");
        assert_eq!(join_prefix("/v1", "/foo"), "/v1/foo");
        assert_eq!(join_prefix("/v1/", "/foo"), "/v1/foo");
        assert_eq!(join_prefix("/v1", ""), "/v1");
        assert_eq!(join_prefix("", "/"), "/");
        assert_eq!(join_prefix("/", "/"), "/");
    }
}
