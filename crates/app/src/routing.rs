//! The route table: compiled path templates paired with their dependant graphs.

use std::sync::Arc;

use indexmap::IndexMap;
use quay_engine::{BuildError, Callable, DependantGraph, OpenApiProvider};
use quay_types::ParamLocation;
use quay_util::{PathTemplate, PathTemplateError};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error(transparent)]
    Template(#[from] PathTemplateError),
    #[error("route {method} {path}: {source}")]
    Build {
        method: String,
        path: String,
        #[source]
        source: BuildError,
    },
    #[error("route {method} {path} declares path parameter '{name}' missing from the template")]
    UnknownPathParam { method: String, path: String, name: String },
    #[error("route {method} {path} is registered twice")]
    Duplicate { method: String, path: String },
}

#[derive(Debug, Clone)]
pub struct Route {
    pub method: String,
    pub template: PathTemplate,
    pub callable: Callable,
    pub graph: Arc<DependantGraph>,
}

impl Route {
    pub fn new(method: &str, path: &str, callable: &Callable) -> Result<Self, RouteError> {
        let method = method.to_ascii_uppercase();
        let template = PathTemplate::parse(path)?;
        let graph = DependantGraph::build(callable).map_err(|source| RouteError::Build {
            method: method.clone(),
            path: path.to_string(),
            source,
        })?;

        for provider in graph.providers() {
            if let OpenApiProvider::Parameter(provider) = provider
                && provider.binding.location == ParamLocation::Path
                && !template.has_param(&provider.binding.wire_name)
            {
                return Err(RouteError::UnknownPathParam {
                    method,
                    path: path.to_string(),
                    name: provider.binding.wire_name.clone(),
                });
            }
        }

        Ok(Self {
            method,
            template,
            callable: callable.clone(),
            graph: Arc::new(graph),
        })
    }
}

/// Outcome of matching a request against the table.
#[derive(Debug)]
pub enum RouteMatch<'a> {
    Found {
        route: &'a Route,
        path_params: IndexMap<String, String>,
    },
    MethodNotAllowed {
        allowed: Vec<String>,
    },
    NotFound,
}

#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn add(&mut self, route: Route) -> Result<(), RouteError> {
        let duplicate = self
            .routes
            .iter()
            .any(|existing| existing.method == route.method && existing.template.as_str() == route.template.as_str());
        if duplicate {
            return Err(RouteError::Duplicate {
                method: route.method,
                path: route.template.as_str().to_string(),
            });
        }
        info!(route = %route.template.as_str(), method = %route.method, nodes = route.graph.len(), "registered route");
        self.routes.push(route);
        Ok(())
    }

    /// Routes in registration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn find(&self, method: &str, path: &str) -> RouteMatch<'_> {
        let mut allowed = Vec::new();
        for route in &self.routes {
            let Some(path_params) = route.template.matches(path) else {
                continue;
            };
            if route.method.eq_ignore_ascii_case(method) {
                return RouteMatch::Found { route, path_params };
            }
            allowed.push(route.method.clone());
        }
        if allowed.is_empty() {
            RouteMatch::NotFound
        } else {
            RouteMatch::MethodNotAllowed { allowed }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_engine::ParamMarker;

    fn handler(name: &str) -> Callable {
        Callable::builder(name).build_sync(|_| Ok(()))
    }

    #[test]
    fn finds_routes_and_reports_wrong_methods() {
        let get_item = Callable::builder("get_item")
            .param::<u32>("item_id", ParamMarker::path())
            .build_sync(|_| Ok(()));
        let mut router = Router::default();
        router.add(Route::new("get", "/items/{item_id}", &get_item).unwrap()).unwrap();
        router.add(Route::new("POST", "/items", &handler("create")).unwrap()).unwrap();

        match router.find("GET", "/items/42") {
            RouteMatch::Found { route, path_params } => {
                assert_eq!(route.callable.name(), "get_item");
                assert_eq!(path_params["item_id"], "42");
            }
            other => panic!("expected a match, got {other:?}"),
        }
        assert!(matches!(
            router.find("GET", "/items"),
            RouteMatch::MethodNotAllowed { allowed } if allowed == vec!["POST".to_string()]
        ));
        assert!(matches!(router.find("GET", "/users"), RouteMatch::NotFound));
    }

    #[test]
    fn rejects_invalid_registrations() {
        let get_item = Callable::builder("get_item")
            .param::<u32>("item_id", ParamMarker::path())
            .build_sync(|_| Ok(()));
        assert!(matches!(
            Route::new("GET", "/items/{id}", &get_item),
            Err(RouteError::UnknownPathParam { name, .. }) if name == "item_id"
        ));

        let optional = Callable::builder("get_item")
            .param::<Option<u32>>("item_id", ParamMarker::path())
            .build_sync(|_| Ok(()));
        assert!(matches!(Route::new("GET", "/items/{item_id}", &optional), Err(RouteError::Build { .. })));

        let mut router = Router::default();
        router.add(Route::new("GET", "/", &handler("index")).unwrap()).unwrap();
        assert!(matches!(
            router.add(Route::new("GET", "/", &handler("index")).unwrap()),
            Err(RouteError::Duplicate { .. })
        ));
    }
}
