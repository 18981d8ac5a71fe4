//! Callables and their explicit parameter declarations.
//!
//! A [`Callable`] is a handler or dependency function plus the ordered list of parameters it
//! receives. Each parameter is a leaf read from the request through a marker, a nested
//! dependency, a security requirement or an injected framework value. Declarations are explicit
//! builder calls; nothing is discovered by reflection.

use std::{
    fmt,
    future::Future,
    sync::{Arc, OnceLock},
};

use futures_util::{FutureExt, future::BoxFuture};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    error::ArgumentError,
    marker::Marker,
    request::RequestContext,
    security::{Security, SecurityScheme},
    typeinfo::TypeInfo,
};

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Value>>;
type HandlerFn = dyn Fn(Arguments) -> HandlerFuture + Send + Sync;

/// How long a resolved dependency value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Scope {
    /// Resolved at most once per request.
    #[default]
    Request,
    /// Resolved once per app lifetime and shared by every request.
    App,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::App => "app",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Framework values handed to a callable without extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Injected {
    /// The request itself, reachable through [`Arguments::request`].
    Request,
    /// The app state value configured on the app.
    AppState,
}

/// Identity of a callable, stable for the lifetime of its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallableId(usize);

pub(crate) enum CallableBody {
    Handler(Arc<HandlerFn>),
    Security(SecurityScheme),
}

struct CallableInner {
    name: String,
    params: Vec<ParamDecl>,
    body: CallableBody,
}

/// A handler or dependency function with its declared parameters.
///
/// Cloning is cheap and keeps the identity, so the same callable declared twice in one graph
/// is resolved once.
#[derive(Clone)]
pub struct Callable {
    inner: Arc<CallableInner>,
}

impl Callable {
    pub fn builder(name: impl Into<String>) -> CallableBuilder {
        CallableBuilder {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub(crate) fn security(name: String, params: Vec<ParamDecl>, scheme: SecurityScheme) -> Self {
        Self {
            inner: Arc::new(CallableInner {
                name,
                params,
                body: CallableBody::Security(scheme),
            }),
        }
    }

    pub fn id(&self) -> CallableId {
        CallableId(Arc::as_ptr(&self.inner) as *const () as usize)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn params(&self) -> &[ParamDecl] {
        &self.inner.params
    }

    /// The scheme when this callable is a built-in security scheme.
    pub fn security_scheme(&self) -> Option<&SecurityScheme> {
        match &self.inner.body {
            CallableBody::Security(scheme) => Some(scheme),
            CallableBody::Handler(_) => None,
        }
    }

    pub(crate) fn body(&self) -> &CallableBody {
        &self.inner.body
    }

    /// Runs the callable with already resolved arguments.
    pub fn call(&self, arguments: Arguments) -> Option<HandlerFuture> {
        match &self.inner.body {
            CallableBody::Handler(handler) => Some(handler(arguments)),
            CallableBody::Security(_) => None,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.inner.name)
            .field("params", &self.inner.params.len())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// A callable referenced before it is defined; filled once.
#[derive(Clone, Default)]
pub struct CallableSlot {
    target: Arc<OnceLock<Callable>>,
}

impl CallableSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills the slot. Returns the callable back if it was already filled.
    pub fn fill(&self, callable: &Callable) -> Result<(), Callable> {
        self.target.set(callable.clone())
    }

    pub fn get(&self) -> Option<&Callable> {
        self.target.get()
    }
}

impl fmt::Debug for CallableSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CallableSlot").field(&self.get().map(Callable::name)).finish()
    }
}

#[derive(Debug, Clone)]
pub enum DependsTarget {
    Callable(Callable),
    Slot(CallableSlot),
}

/// A nested dependant: another callable whose result is passed in.
#[derive(Debug, Clone)]
pub struct Depends {
    target: DependsTarget,
    scope: Scope,
    use_cache: bool,
}

impl Depends {
    pub fn on(callable: &Callable) -> Self {
        Self {
            target: DependsTarget::Callable(callable.clone()),
            scope: Scope::Request,
            use_cache: true,
        }
    }

    /// Depends on whatever callable `slot` is filled with by the time the graph is built.
    pub fn on_slot(slot: &CallableSlot) -> Self {
        Self {
            target: DependsTarget::Slot(slot.clone()),
            scope: Scope::Request,
            use_cache: true,
        }
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Resolve this dependency separately instead of sharing the value with other declarations.
    pub fn no_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn target(&self) -> Option<&Callable> {
        match &self.target {
            DependsTarget::Callable(callable) => Some(callable),
            DependsTarget::Slot(slot) => slot.get(),
        }
    }

    pub fn get_scope(&self) -> Scope {
        self.scope
    }

    pub fn use_cache(&self) -> bool {
        self.use_cache
    }
}

#[derive(Debug, Clone)]
pub enum ParamKind {
    Leaf { marker: Marker, type_info: TypeInfo },
    Dependency(Depends),
    Security(Security),
    Injected(Injected),
}

/// One declared parameter of a callable.
#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: String,
    pub kind: ParamKind,
}

pub struct CallableBuilder {
    name: String,
    params: Vec<ParamDecl>,
}

impl CallableBuilder {
    fn push(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(ParamDecl { name: name.into(), kind });
        self
    }

    /// A value of type `T` read from the request as `marker` describes.
    pub fn param<T>(self, name: impl Into<String>, marker: impl Into<Marker>) -> Self
    where
        T: DeserializeOwned + Serialize + JsonSchema + 'static,
    {
        self.push(name, ParamKind::Leaf {
            marker: marker.into(),
            type_info: TypeInfo::of::<T>(),
        })
    }

    pub fn depends(self, name: impl Into<String>, depends: Depends) -> Self {
        self.push(name, ParamKind::Dependency(depends))
    }

    pub fn security(self, name: impl Into<String>, security: Security) -> Self {
        self.push(name, ParamKind::Security(security))
    }

    pub fn inject(self, name: impl Into<String>, injected: Injected) -> Self {
        self.push(name, ParamKind::Injected(injected))
    }

    /// Finishes with an async function. Its output is converted to JSON.
    pub fn build<F, Fut, R>(self, function: F) -> Callable
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Serialize,
    {
        let handler = move |arguments: Arguments| -> HandlerFuture {
            let future = function(arguments);
            async move { Ok(serde_json::to_value(future.await?)?) }.boxed()
        };
        self.finish(Arc::new(handler))
    }

    /// Finishes with a synchronous function.
    pub fn build_sync<F, R>(self, function: F) -> Callable
    where
        F: Fn(Arguments) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Serialize,
    {
        let handler = move |arguments: Arguments| -> HandlerFuture {
            let result = function(arguments).and_then(|value| Ok(serde_json::to_value(value)?));
            futures_util::future::ready(result).boxed()
        };
        self.finish(Arc::new(handler))
    }

    fn finish(self, handler: Arc<HandlerFn>) -> Callable {
        Callable {
            inner: Arc::new(CallableInner {
                name: self.name,
                params: self.params,
                body: CallableBody::Handler(handler),
            }),
        }
    }
}

/// Resolved values passed to a callable, keyed by parameter name in declaration order.
#[derive(Clone, Default)]
pub struct Arguments {
    values: IndexMap<String, Value>,
    request: Option<Arc<RequestContext>>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub(crate) fn set_request(&mut self, request: Arc<RequestContext>) {
        self.request = Some(request);
    }

    /// Deserializes the argument `name` into `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, ArgumentError> {
        let value = self.values.get(name).ok_or_else(|| ArgumentError::Missing(name.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|error| ArgumentError::Type {
            name: name.to_string(),
            message: error.to_string(),
        })
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// The request, when the callable declared [`Injected::Request`].
    pub fn request(&self) -> Option<&RequestContext> {
        self.request.as_deref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.values.iter()
    }

    pub fn into_values(self) -> IndexMap<String, Value> {
        self.values
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("values", &self.values)
            .field("request", &self.request.is_some())
            .finish()
    }
}
