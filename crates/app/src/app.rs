//! The app object: owns the route table, the app-scoped cache and the document builder.

use std::sync::Arc;

use indexmap::IndexMap;
use quay_engine::{
    AppScopeCache, Callable, RawRequest, RequestContext, ResolutionError, ResolutionPolicy, SchemaRegistry, SecurityNames,
    deferred_key_name, resolve, resolve_app_scoped,
};
use quay_types::{Components, Info, MediaTypeObject, OPENAPI_VERSION, OpenApiDocument, Operation, ResponseObject};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{
    config::AppConfig,
    response::Response,
    routing::{Route, RouteError, RouteMatch, Router},
};

const VALIDATION_ERROR: &str = "ValidationError";
const HTTP_VALIDATION_ERROR: &str = "HTTPValidationError";

pub struct App {
    config: AppConfig,
    policy: ResolutionPolicy,
    router: Router,
    cache: AppScopeCache,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self::with_state(config, Value::Null)
    }

    /// An app whose `Injected::AppState` parameters receive `state`.
    pub fn with_state(config: AppConfig, state: Value) -> Self {
        Self {
            policy: config.policy(),
            config,
            router: Router::default(),
            cache: AppScopeCache::new(state),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn routes(&self) -> &[Route] {
        self.router.routes()
    }

    pub fn app_cache(&self) -> &AppScopeCache {
        &self.cache
    }

    /// Registers `callable` for `method` and `path`, building its dependant graph.
    pub fn route(&mut self, method: &str, path: &str, callable: &Callable) -> Result<&mut Self, RouteError> {
        self.router.add(Route::new(method, path, callable)?)?;
        Ok(self)
    }

    /// Resolves every app-scoped dependant of every route.
    pub async fn startup(&self) -> Result<(), ResolutionError> {
        for route in self.router.routes() {
            resolve_app_scoped(&route.graph, &self.cache).await?;
        }
        info!(title = %self.config.title, routes = self.router.routes().len(), cached = self.cache.len(), "app started");
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.cache.clear();
        info!(title = %self.config.title, "app stopped");
    }

    /// Runs one request through routing, resolution and the route's callable.
    pub async fn dispatch(&self, mut raw: RawRequest) -> Response {
        if let Some(document_path) = &self.config.openapi_path
            && raw.method == "GET"
            && raw.path == *document_path
        {
            return self.document_response().await;
        }

        let (route, path_params) = match self.router.find(&raw.method, &raw.path) {
            RouteMatch::Found { route, path_params } => (route, path_params),
            RouteMatch::MethodNotAllowed { allowed } => {
                return Response::detail(405, "Method Not Allowed").with_header("allow", allowed.join(", "));
            }
            RouteMatch::NotFound => return Response::detail(404, "Not Found"),
        };
        debug!(route = %route.template.as_str(), method = %route.method, "dispatching request");
        raw.path_params = path_params;

        let request = Arc::new(RequestContext::new(raw));
        let arguments = match resolve(&route.graph, request, &self.cache, &self.policy).await {
            Ok(arguments) => arguments,
            Err(error) => return Response::from_error(&error),
        };
        let Some(call) = route.callable.call(arguments) else {
            warn!(route = %route.template.as_str(), "route callable is a security scheme");
            return Response::detail(500, "Internal Server Error");
        };
        match call.await {
            Ok(value) => Response::json(200, value),
            Err(error) => Response::from_error(&ResolutionError::Handler {
                callable: route.callable.name().to_string(),
                error: Arc::new(error),
            }),
        }
    }

    async fn document_response(&self) -> Response {
        let document = match self.openapi().await {
            Ok(document) => document,
            Err(error) => return Response::from_error(&error),
        };
        match serde_json::to_value(&document) {
            Ok(body) => Response::json(200, body),
            Err(error) => {
                warn!(error = %error, "failed to serialize the OpenAPI document");
                Response::detail(500, "Internal Server Error")
            }
        }
    }

    /// Builds the OpenAPI document from every route's providers and security requirements.
    pub async fn openapi(&self) -> Result<OpenApiDocument, ResolutionError> {
        let mut registry = SchemaRegistry::new();
        let mut names = SecurityNames::new();
        let mut paths: IndexMap<String, IndexMap<String, Operation>> = IndexMap::new();
        let mut validates = false;

        for route in self.router.routes() {
            let graph = &route.graph;
            let mut operation = Operation::default();
            for provider in graph.providers() {
                provider.contribute(&mut registry, &mut operation);
            }
            let mut requirements: IndexMap<String, Vec<String>> = IndexMap::new();
            for (node, scopes) in graph.security_requirements() {
                let Some(scheme) = graph.node(node).callable.security_scheme() else {
                    continue;
                };
                let key_name = deferred_key_name(graph, node, &self.cache).await?;
                let name = names.register(&scheme.name(), scheme.openapi_object(key_name.as_deref()));
                let merged = requirements.entry(name).or_default();
                for scope in scopes {
                    if !merged.contains(&scope) {
                        merged.push(scope);
                    }
                }
            }
            operation
                .security
                .extend(requirements.into_iter().map(|(name, scopes)| IndexMap::from([(name, scopes)])));

            operation.responses.insert(
                "200".into(),
                ResponseObject {
                    description: "Successful Response".into(),
                    content: None,
                },
            );
            if graph.has_leaves() {
                validates = true;
                operation.responses.insert("422".into(), validation_response());
            }

            paths
                .entry(route.template.as_str().to_string())
                .or_default()
                .insert(route.method.to_ascii_lowercase(), operation);
        }

        let mut schemas = registry.definitions();
        if validates {
            schemas.insert(HTTP_VALIDATION_ERROR.into(), http_validation_error_schema());
            schemas.insert(VALIDATION_ERROR.into(), validation_error_schema());
        }
        debug!(paths = paths.len(), schemas = schemas.len(), "built OpenAPI document");

        Ok(OpenApiDocument {
            openapi: OPENAPI_VERSION.into(),
            info: Info {
                title: self.config.title.clone(),
                version: self.config.version.clone(),
                description: self.config.description.clone(),
            },
            paths,
            components: Components {
                schemas,
                security_schemes: names.into_components(),
            },
        })
    }
}

fn validation_response() -> ResponseObject {
    let media_type = MediaTypeObject {
        schema: Some(json!({ "$ref": format!("#/components/schemas/{HTTP_VALIDATION_ERROR}") })),
        ..MediaTypeObject::default()
    };
    ResponseObject {
        description: "Validation Error".into(),
        content: Some(IndexMap::from([("application/json".to_string(), media_type)])),
    }
}

fn http_validation_error_schema() -> Value {
    json!({
        "title": HTTP_VALIDATION_ERROR,
        "type": "object",
        "properties": {
            "detail": {
                "title": "Detail",
                "type": "array",
                "items": { "$ref": format!("#/components/schemas/{VALIDATION_ERROR}") }
            }
        }
    })
}

fn validation_error_schema() -> Value {
    json!({
        "title": VALIDATION_ERROR,
        "required": ["location", "message", "type"],
        "type": "object",
        "properties": {
            "location": {
                "title": "Location",
                "type": "array",
                "items": { "oneOf": [{ "type": "string" }, { "type": "integer" }] }
            },
            "message": { "title": "Message", "type": "string" },
            "type": { "title": "Error Type", "type": "string" }
        }
    })
}
