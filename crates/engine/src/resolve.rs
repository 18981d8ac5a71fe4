//! Request-time resolution of a dependant graph.
//!
//! One pass owns a `OnceCell` per node, so a node shared by several parents runs once even
//! when siblings race for it. App-scoped nodes are memoized in the [`AppScopeCache`] by
//! callable identity instead and survive across passes until the cache is cleared.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use futures_util::{
    FutureExt,
    future::{BoxFuture, join_all},
};
use quay_types::ValidationErrors;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::{
    callable::{Arguments, CallableBody, CallableId, Injected, Scope},
    error::ResolutionError,
    graph::{DependantGraph, DependantNode, NodeId, ParamSource},
    request::{RawRequest, RequestContext},
    security::{KEY_NAME_PARAM, SecurityScheme},
};

/// Which failure wins when a request is both unauthenticated and invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPriority {
    /// Security requirements are resolved first; an authentication failure stops the pass
    /// before the remaining parameters are read.
    #[default]
    ShortCircuit,
    /// Every parameter is resolved; validation failures are reported before authentication.
    AfterValidation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolutionPolicy {
    pub security_priority: SecurityPriority,
}

/// Values of app-scoped dependants, shared by every request of one app.
#[derive(Debug, Default)]
pub struct AppScopeCache {
    values: Mutex<HashMap<CallableId, Arc<OnceCell<Value>>>>,
    state: Value,
}

impl AppScopeCache {
    /// A cache whose `Injected::AppState` value is `state`.
    pub fn new(state: Value) -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            state,
        }
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    fn cell(&self, id: CallableId) -> Arc<OnceCell<Value>> {
        let mut values = self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        values.entry(id).or_default().clone()
    }

    /// The cached value of an app-scoped callable, if it was resolved already.
    pub fn get(&self, id: CallableId) -> Option<Value> {
        let values = self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        values.get(&id).and_then(|cell| cell.get().cloned())
    }

    pub fn len(&self) -> usize {
        let values = self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        values.values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every app-scoped value; the next resolution recomputes them.
    pub fn clear(&self) {
        let mut values = self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        values.clear();
    }
}

/// Resolves the route callable's arguments for one request.
pub async fn resolve(
    graph: &DependantGraph,
    request: Arc<RequestContext>,
    app: &AppScopeCache,
    policy: &ResolutionPolicy,
) -> Result<Arguments, ResolutionError> {
    let pass = Pass::new(graph, request, app, policy);
    pass.arguments(graph.node(graph.root())).await
}

/// Eagerly resolves every app-scoped node of `graph` into the app cache.
pub async fn resolve_app_scoped(graph: &DependantGraph, app: &AppScopeCache) -> Result<(), ResolutionError> {
    let pass = Pass::detached(graph, app);
    for id in graph.app_scoped() {
        pass.resolve_node(id).await?;
    }
    Ok(())
}

/// The API key name of a security node whose scheme takes it from an app-scoped dependency.
pub async fn deferred_key_name(
    graph: &DependantGraph,
    security_node: NodeId,
    app: &AppScopeCache,
) -> Result<Option<String>, ResolutionError> {
    let Some(source) = graph
        .node(security_node)
        .params
        .iter()
        .find(|param| param.name == KEY_NAME_PARAM)
        .and_then(|param| param.source.child())
    else {
        return Ok(None);
    };
    let pass = Pass::detached(graph, app);
    let value = pass.resolve_node(source).await?;
    Ok(value.as_str().map(str::to_string))
}

/// Failures gathered from one batch of sibling parameters.
#[derive(Default)]
struct Failures {
    validation: ValidationErrors,
    unauthenticated: Option<ResolutionError>,
    handler: Option<ResolutionError>,
}

impl Failures {
    fn record(&mut self, error: ResolutionError) {
        match error {
            ResolutionError::Validation(errors) => self.validation.extend(errors),
            unauthenticated @ ResolutionError::Unauthenticated { .. } => {
                self.unauthenticated.get_or_insert(unauthenticated);
            }
            handler @ ResolutionError::Handler { .. } => {
                self.handler.get_or_insert(handler);
            }
        }
    }
}

struct Pass<'a> {
    graph: &'a DependantGraph,
    request: Arc<RequestContext>,
    app: &'a AppScopeCache,
    policy: ResolutionPolicy,
    cells: Vec<OnceCell<Result<Value, ResolutionError>>>,
}

impl<'a> Pass<'a> {
    fn new(graph: &'a DependantGraph, request: Arc<RequestContext>, app: &'a AppScopeCache, policy: &ResolutionPolicy) -> Self {
        Self {
            graph,
            request,
            app,
            policy: *policy,
            cells: (0..graph.len()).map(|_| OnceCell::new()).collect(),
        }
    }

    /// A pass without a real request, for app-scoped nodes only.
    fn detached(graph: &'a DependantGraph, app: &'a AppScopeCache) -> Self {
        let request = Arc::new(RequestContext::new(RawRequest::new("GET", "/")));
        Self::new(graph, request, app, &ResolutionPolicy::default())
    }

    fn resolve_node(&self, id: NodeId) -> BoxFuture<'_, Result<Value, ResolutionError>> {
        async move {
            let node = self.graph.node(id);
            if node.scope == Scope::App {
                let cell = self.app.cell(node.callable.id());
                if let Some(value) = cell.get() {
                    debug!(node = id.index(), callable = %node.callable.name(), "app-scoped value reused");
                    return Ok(value.clone());
                }
                return cell.get_or_try_init(|| self.evaluate(node)).await.cloned();
            }
            self.cells[id.index()].get_or_init(|| self.evaluate(node)).await.clone()
        }
        .boxed()
    }

    async fn evaluate(&self, node: &DependantNode) -> Result<Value, ResolutionError> {
        let arguments = self.arguments(node).await?;
        match node.callable.body() {
            CallableBody::Security(scheme) => self.authenticate(node, scheme, &arguments),
            CallableBody::Handler(handler) => handler(arguments).await.map_err(|error| {
                warn!(callable = %node.callable.name(), error = %error, "dependant failed");
                ResolutionError::Handler {
                    callable: node.callable.name().to_string(),
                    error: Arc::new(error),
                }
            }),
        }
    }

    fn authenticate(&self, node: &DependantNode, scheme: &SecurityScheme, arguments: &Arguments) -> Result<Value, ResolutionError> {
        let key_name = arguments.value(KEY_NAME_PARAM).and_then(Value::as_str);
        match scheme.authenticate(&self.request, key_name) {
            Ok(credentials) => Ok(credentials),
            Err(failure) if scheme.is_auto_error() => {
                warn!(scheme = %node.callable.name(), path = %self.request.path(), reason = %failure.message, "authentication failed");
                Err(ResolutionError::Unauthenticated {
                    message: failure.message,
                    www_authenticate: failure.www_authenticate,
                })
            }
            Err(_) => Ok(Value::Null),
        }
    }

    async fn param_value(&self, source: &ParamSource) -> Result<Value, ResolutionError> {
        match source {
            ParamSource::Leaf { extractor, .. } => extractor.extract(&self.request).await.map_err(ResolutionError::Validation),
            ParamSource::Dependency(child) | ParamSource::Security { node: child, .. } => self.resolve_node(*child).await,
            ParamSource::Injected(Injected::AppState) => Ok(self.app.state().clone()),
            ParamSource::Injected(Injected::Request) => Ok(Value::Null),
        }
    }

    fn is_guarded(&self, source: &ParamSource) -> bool {
        source.child().is_some_and(|child| self.graph.node(child).guarded)
    }

    /// Resolves the parameters of `node` into the arguments its callable is called with.
    async fn arguments(&self, node: &DependantNode) -> Result<Arguments, ResolutionError> {
        let indexes: Vec<usize> = (0..node.params.len()).collect();
        let batches: Vec<Vec<usize>> = match self.policy.security_priority {
            SecurityPriority::ShortCircuit => {
                let (guarded, rest): (Vec<usize>, Vec<usize>) =
                    indexes.into_iter().partition(|index| self.is_guarded(&node.params[*index].source));
                vec![guarded, rest]
            }
            SecurityPriority::AfterValidation => vec![indexes],
        };

        let mut values: Vec<Option<Value>> = vec![None; node.params.len()];
        let mut failures = Failures::default();
        for batch in batches.into_iter().filter(|batch| !batch.is_empty()) {
            let outcomes = join_all(batch.iter().map(|index| self.param_value(&node.params[*index].source))).await;
            for (index, outcome) in batch.into_iter().zip(outcomes) {
                match outcome {
                    Ok(value) => values[index] = Some(value),
                    Err(error) => failures.record(error),
                }
            }
            if let Some(handler) = failures.handler.take() {
                return Err(handler);
            }
            if self.policy.security_priority == SecurityPriority::ShortCircuit
                && let Some(unauthenticated) = failures.unauthenticated.take()
            {
                return Err(unauthenticated);
            }
        }
        if !failures.validation.is_empty() {
            return Err(ResolutionError::Validation(failures.validation));
        }
        if let Some(unauthenticated) = failures.unauthenticated {
            return Err(unauthenticated);
        }

        let mut arguments = Arguments::new();
        for (param, value) in node.params.iter().zip(values) {
            match (&param.source, value) {
                (ParamSource::Injected(Injected::Request), _) => arguments.set_request(self.request.clone()),
                (_, Some(value)) => arguments.insert(param.name.clone(), value),
                (_, None) => {}
            }
        }
        Ok(arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        callable::{Callable, Depends},
        marker::ParamMarker,
        security::{Security, SecurityScheme},
    };
    use quay_types::ValidationErrorKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(name: &str, counter: Arc<AtomicUsize>) -> Callable {
        Callable::builder(name).build(move |_| {
            let counter = counter.clone();
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
        })
    }

    fn request(raw: RawRequest) -> Arc<RequestContext> {
        Arc::new(RequestContext::new(raw))
    }

    #[tokio::test]
    async fn shared_sub_dependants_run_once_per_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let shared = counting("shared", calls.clone());
        let left = Callable::builder("left").depends("v", Depends::on(&shared)).build_sync(|args| args.get::<u32>("v").map_err(Into::into));
        let right = Callable::builder("right").depends("v", Depends::on(&shared)).build_sync(|args| args.get::<u32>("v").map_err(Into::into));
        let root = Callable::builder("root")
            .depends("left", Depends::on(&left))
            .depends("right", Depends::on(&right))
            .build_sync(|_| Ok(()));
        let graph = DependantGraph::build(&root).unwrap();
        let app = AppScopeCache::default();

        let arguments = resolve(&graph, request(RawRequest::new("GET", "/")), &app, &ResolutionPolicy::default())
            .await
            .unwrap();
        assert_eq!(arguments.value("left"), Some(&json!(1)));
        assert_eq!(arguments.value("right"), Some(&json!(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        resolve(&graph, request(RawRequest::new("GET", "/")), &app, &ResolutionPolicy::default())
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn racing_siblings_share_a_suspended_dependant() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let shared = Callable::builder("shared").build(move |_| {
            let counter = counter.clone();
            async move {
                tokio::task::yield_now().await;
                tokio::task::yield_now().await;
                Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
            }
        });
        let sibling = |name: &str| {
            Callable::builder(name).depends("v", Depends::on(&shared)).build(|args| async move {
                tokio::task::yield_now().await;
                Ok::<_, anyhow::Error>(args.get::<u32>("v")?)
            })
        };
        let root = Callable::builder("root")
            .depends("left", Depends::on(&sibling("left")))
            .depends("right", Depends::on(&sibling("right")))
            .depends("direct", Depends::on(&shared))
            .build_sync(|_| Ok(()));
        let graph = DependantGraph::build(&root).unwrap();
        let app = AppScopeCache::default();

        let arguments = resolve(&graph, request(RawRequest::new("GET", "/")), &app, &ResolutionPolicy::default())
            .await
            .unwrap();
        assert_eq!(arguments.value("left"), Some(&json!(1)));
        assert_eq!(arguments.value("right"), Some(&json!(1)));
        assert_eq!(arguments.value("direct"), Some(&json!(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn app_scoped_values_survive_requests_until_cleared() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = counting("pool", calls.clone());
        let root = Callable::builder("root")
            .depends("pool", Depends::on(&pool).scope(Scope::App))
            .build_sync(|_| Ok(()));
        let graph = DependantGraph::build(&root).unwrap();
        let app = AppScopeCache::default();

        resolve_app_scoped(&graph, &app).await.unwrap();
        assert_eq!(app.get(pool.id()), Some(json!(1)));
        for _ in 0..3 {
            let arguments = resolve(&graph, request(RawRequest::new("GET", "/")), &app, &ResolutionPolicy::default())
                .await
                .unwrap();
            assert_eq!(arguments.value("pool"), Some(&json!(1)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        app.clear();
        assert!(app.is_empty());
        resolve(&graph, request(RawRequest::new("GET", "/")), &app, &ResolutionPolicy::default())
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn validation_failures_are_aggregated() {
        let root = Callable::builder("root")
            .param::<u32>("page", ParamMarker::query())
            .param::<u32>("size", ParamMarker::query())
            .build_sync(|_| Ok(()));
        let graph = DependantGraph::build(&root).unwrap();
        let error = resolve(
            &graph,
            request(RawRequest::new("GET", "/").with_query("size=big")),
            &AppScopeCache::default(),
            &ResolutionPolicy::default(),
        )
        .await
        .unwrap_err();
        let ResolutionError::Validation(errors) = error else {
            panic!("expected validation failure, got {error:?}");
        };
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.entries()[0].kind, ValidationErrorKind::Missing);
        assert_eq!(errors.entries()[1].kind, ValidationErrorKind::IntParsing);
    }

    fn guarded_route(calls: Arc<AtomicUsize>) -> DependantGraph {
        let expensive = counting("expensive", calls);
        let root = Callable::builder("root")
            .param::<u32>("page", ParamMarker::query())
            .depends("expensive", Depends::on(&expensive))
            .security("key", Security::new(SecurityScheme::api_key_header("key")))
            .build_sync(|_| Ok(()));
        DependantGraph::build(&root).unwrap()
    }

    #[tokio::test]
    async fn short_circuit_reports_authentication_before_validation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let graph = guarded_route(calls.clone());
        let error = resolve(
            &graph,
            request(RawRequest::new("GET", "/")),
            &AppScopeCache::default(),
            &ResolutionPolicy::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(error.status(), 401);
        assert_eq!(error.to_string(), "Not authenticated");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn after_validation_reports_validation_first() {
        let calls = Arc::new(AtomicUsize::new(0));
        let graph = guarded_route(calls.clone());
        let policy = ResolutionPolicy {
            security_priority: SecurityPriority::AfterValidation,
        };
        let error = resolve(&graph, request(RawRequest::new("GET", "/")), &AppScopeCache::default(), &policy)
            .await
            .unwrap_err();
        assert_eq!(error.status(), 422);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let error = resolve(
            &graph,
            request(RawRequest::new("GET", "/").with_query("page=1")),
            &AppScopeCache::default(),
            &policy,
        )
        .await
        .unwrap_err();
        assert_eq!(error.status(), 401);
    }

    #[tokio::test]
    async fn optional_security_resolves_to_null() {
        let root = Callable::builder("root")
            .security("key", Security::new(SecurityScheme::api_key_header("key").auto_error(false)))
            .build_sync(|_| Ok(()));
        let graph = DependantGraph::build(&root).unwrap();
        let app = AppScopeCache::default();
        let arguments = resolve(&graph, request(RawRequest::new("GET", "/")), &app, &ResolutionPolicy::default())
            .await
            .unwrap();
        assert_eq!(arguments.value("key"), Some(&Value::Null));

        let arguments = resolve(
            &graph,
            request(RawRequest::new("GET", "/").with_header("key", "abc")),
            &app,
            &ResolutionPolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(arguments.get::<String>("key"), Ok("abc".to_string()));
    }

    #[tokio::test]
    async fn deferred_key_names_resolve_through_the_app_cache() {
        let name = Callable::builder("get_name").build_sync(|_| Ok("key"));
        let scheme = SecurityScheme::api_key(
            crate::security::ApiKeyLocation::Header,
            crate::security::KeyName::Deferred(Depends::on(&name).scope(Scope::App)),
        )
        .scheme_name("LazyAPIKeyHeader");
        let root = Callable::builder("root").security("key", Security::new(scheme)).build_sync(|_| Ok(()));
        let graph = DependantGraph::build(&root).unwrap();
        let app = AppScopeCache::default();

        let node = graph.security_requirements()[0].0;
        assert_eq!(deferred_key_name(&graph, node, &app).await.unwrap(), Some("key".to_string()));

        let arguments = resolve(
            &graph,
            request(RawRequest::new("GET", "/").with_header("key", "k1")),
            &app,
            &ResolutionPolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(arguments.value("key"), Some(&json!("k1")));
    }

    #[tokio::test]
    async fn handler_errors_propagate_and_injection_works() {
        let failing = Callable::builder("failing").build_sync(|_| -> anyhow::Result<()> { Err(anyhow::anyhow!("database down")) });
        let root = Callable::builder("root").depends("db", Depends::on(&failing)).build_sync(|_| Ok(()));
        let graph = DependantGraph::build(&root).unwrap();
        let error = resolve(
            &graph,
            request(RawRequest::new("GET", "/")),
            &AppScopeCache::default(),
            &ResolutionPolicy::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(&error, ResolutionError::Handler { callable, .. } if callable == "failing"));

        let root = Callable::builder("root")
            .inject("request", Injected::Request)
            .inject("state", Injected::AppState)
            .build_sync(|_| Ok(()));
        let graph = DependantGraph::build(&root).unwrap();
        let arguments = resolve(
            &graph,
            request(RawRequest::new("GET", "/items")),
            &AppScopeCache::new(json!({"region": "eu"})),
            &ResolutionPolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(arguments.request().map(RequestContext::path), Some("/items"));
        assert_eq!(arguments.value("state"), Some(&json!({"region": "eu"})));
        assert!(arguments.value("request").is_none());
    }
}
