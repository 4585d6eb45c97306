//! Routes served by the in-process inject round trip

use crate::app::RequestContext;
use crate::error::Result;
use futures::future::BoxFuture;
use http::Method;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Signature of a route handler, already boxed
pub type RouteHandler = Arc<dyn Fn(RequestContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A route: method, path, and handler producing a JSON payload
#[derive(Clone)]
pub struct Route {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) handler: RouteHandler,
}

impl Route {
    /// Create a route
    pub fn new<F, Fut>(method: Method, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            method,
            path: path.into(),
            handler: Arc::new(move |req| Box::pin(handler(req))),
        }
    }

    /// Create a GET route
    pub fn get<F, Fut>(path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self::new(Method::GET, path, handler)
    }

    /// Route method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Route path, before any scope prefix is applied
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish()
    }
}
