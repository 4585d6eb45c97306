//! Named decorations attached to instance, request, and reply scopes

use crate::app::RequestContext;
use crate::error::{Error, Result};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Signature of a callable decoration
pub type DecorationFn = Arc<dyn Fn(&DecorationCall<'_>) -> Result<Value> + Send + Sync>;

/// A named value or callable attached to a scope
///
/// Plain values resolve by cloning; callables are invoked with a
/// [`DecorationCall`] describing the current request and, when the decoration
/// was substituted by an injector, the replaced original.
#[derive(Clone)]
pub enum Decoration {
    /// A plain JSON value
    Value(Value),
    /// A callable decoration
    Fn(DecorationFn),
}

impl Decoration {
    /// Create a plain value decoration
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// Create a callable decoration
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&DecorationCall<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Self::Fn(Arc::new(f))
    }

    /// Whether this decoration is callable
    pub fn is_fn(&self) -> bool {
        matches!(self, Decoration::Fn(_))
    }

    /// The underlying value, for plain value decorations
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Decoration::Value(v) => Some(v),
            Decoration::Fn(_) => None,
        }
    }

    /// Invoke the decoration with the given call context
    ///
    /// Plain values ignore the context and resolve by cloning.
    pub fn call(&self, call: &DecorationCall<'_>) -> Result<Value> {
        match self {
            Decoration::Value(v) => Ok(v.clone()),
            Decoration::Fn(f) => f(call),
        }
    }

    /// Resolve the decoration outside of any request
    pub fn resolve(&self) -> Result<Value> {
        self.call(&DecorationCall::new())
    }
}

impl fmt::Debug for Decoration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoration::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Decoration::Fn(_) => f.debug_tuple("Fn").finish(),
        }
    }
}

/// Invocation context handed to a callable decoration
///
/// Carries the request being served (when the decoration runs inside a
/// handler) and the replaced original (when the decoration was substituted).
#[derive(Debug, Default)]
pub struct DecorationCall<'a> {
    ctx: Option<&'a RequestContext>,
    original: Option<&'a Decoration>,
}

impl<'a> DecorationCall<'a> {
    /// An empty call, outside of any request
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_ctx(ctx: &'a RequestContext) -> Self {
        Self {
            ctx: Some(ctx),
            original: None,
        }
    }

    /// Derive a call that exposes `original` as the replaced decoration,
    /// keeping the current request context
    pub fn chained<'b>(&'b self, original: &'b Decoration) -> DecorationCall<'b> {
        DecorationCall {
            ctx: self.ctx,
            original: Some(original),
        }
    }

    /// The request this decoration is serving, if any
    pub fn ctx(&self) -> Option<&RequestContext> {
        self.ctx
    }

    /// The replaced original decoration, if this one was substituted
    pub fn original(&self) -> Option<&Decoration> {
        self.original
    }

    /// Invoke the replaced original decoration
    ///
    /// The original runs with the same request context but no further
    /// original of its own.
    pub fn call_original(&self) -> Result<Value> {
        match self.original {
            Some(original) => original.call(&DecorationCall {
                ctx: self.ctx,
                original: None,
            }),
            None => Err(Error::NoOriginal),
        }
    }

    /// Resolve an instance decoration visible from the current request scope
    pub fn instance(&self, name: &str) -> Result<Value> {
        self.require_ctx(name)?.instance(name)
    }

    /// Invoke a request decoration visible from the current request scope
    pub fn request(&self, name: &str) -> Result<Value> {
        self.require_ctx(name)?.request(name)
    }

    /// Invoke a reply decoration visible from the current request scope
    pub fn reply(&self, name: &str) -> Result<Value> {
        self.require_ctx(name)?.reply(name)
    }

    fn require_ctx(&self, name: &str) -> Result<&RequestContext> {
        self.ctx
            .ok_or_else(|| Error::UnknownDecoration(name.to_string()))
    }
}
