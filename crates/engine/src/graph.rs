//! Dependant graph construction.
//!
//! The graph is an arena of nodes in post-order: every node is stored after the nodes it
//! depends on, and the root is last. Nodes are keyed by `(callable identity, scope)` so a
//! callable declared in several places resolves once, unless a declaration opts out of
//! caching.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt::Write as _,
};

use indexmap::IndexMap;
use quay_types::ParamLocation;
use tracing::debug;

use crate::{
    callable::{Callable, CallableId, Injected, ParamKind, Scope},
    error::BuildError,
    extract::Extractor,
    marker::{BodyBinding, ParameterBinding},
    openapi::OpenApiProvider,
    security::SecurityScheme,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Where a resolved parameter value comes from.
#[derive(Debug, Clone)]
pub enum ParamSource {
    Leaf {
        extractor: Extractor,
        provider: OpenApiProvider,
    },
    Dependency(NodeId),
    Security {
        node: NodeId,
        scopes: Vec<String>,
    },
    Injected(Injected),
}

impl ParamSource {
    /// The node this parameter waits on, for dependencies and security requirements.
    pub fn child(&self) -> Option<NodeId> {
        match self {
            Self::Dependency(node) | Self::Security { node, .. } => Some(*node),
            Self::Leaf { .. } | Self::Injected(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedParam {
    pub name: String,
    pub source: ParamSource,
}

#[derive(Debug, Clone)]
pub struct DependantNode {
    pub callable: Callable,
    pub scope: Scope,
    pub use_cache: bool,
    pub params: Vec<ResolvedParam>,
    /// Whether a security scheme is this node or one of its transitive dependencies.
    pub guarded: bool,
}

impl DependantNode {
    pub fn is_security(&self) -> bool {
        self.callable.security_scheme().is_some()
    }

    /// Distinct child nodes in declaration order.
    pub fn children(&self) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.params
            .iter()
            .filter_map(|param| param.source.child())
            .filter(|child| seen.insert(*child))
            .collect()
    }
}

/// The resolved declaration tree of one route callable.
#[derive(Debug, Clone)]
pub struct DependantGraph {
    nodes: Vec<DependantNode>,
    root: NodeId,
}

impl DependantGraph {
    pub fn build(root: &Callable) -> Result<Self, BuildError> {
        let mut builder = GraphBuilder::default();
        let root = builder.visit(root, Scope::Request, true)?;
        debug!(root = %builder.nodes[root.0].callable.name(), nodes = builder.nodes.len(), "built dependant graph");
        Ok(Self {
            nodes: builder.nodes,
            root,
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &DependantNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &DependantNode)> {
        self.nodes.iter().enumerate().map(|(index, node)| (NodeId(index), node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes ordered so every node comes after everything it depends on.
    pub fn evaluation_order(&self) -> Vec<NodeId> {
        let mut in_degrees: Vec<usize> = vec![0; self.nodes.len()];
        let mut dependants: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (id, node) in self.nodes() {
            for child in node.children() {
                in_degrees[id.0] += 1;
                dependants.entry(child).or_default().push(id);
            }
        }

        let mut queue: VecDeque<NodeId> = (0..self.nodes.len())
            .filter(|index| in_degrees[*index] == 0)
            .map(NodeId)
            .collect();
        let mut ordered = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            ordered.push(id);
            for parent in dependants.get(&id).into_iter().flatten() {
                in_degrees[parent.0] -= 1;
                if in_degrees[parent.0] == 0 {
                    queue.push_back(*parent);
                }
            }
        }
        ordered
    }

    /// App-scoped nodes in evaluation order.
    pub fn app_scoped(&self) -> Vec<NodeId> {
        self.evaluation_order()
            .into_iter()
            .filter(|id| self.node(*id).scope == Scope::App)
            .collect()
    }

    /// Nodes reachable from the root, each once, parents before their children.
    fn document_order(&self) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            stack.extend(self.node(id).children().into_iter().rev());
        }
        order
    }

    /// OpenAPI providers of every leaf parameter in document order.
    pub fn providers(&self) -> Vec<&OpenApiProvider> {
        self.document_order()
            .into_iter()
            .flat_map(|id| self.node(id).params.iter())
            .filter_map(|param| match &param.source {
                ParamSource::Leaf { provider, .. } => Some(provider),
                _ => None,
            })
            .collect()
    }

    /// Security requirements in document order, with the scopes of every declaration merged.
    pub fn security_requirements(&self) -> Vec<(NodeId, Vec<String>)> {
        let mut requirements: IndexMap<NodeId, Vec<String>> = IndexMap::new();
        for param in self.document_order().into_iter().flat_map(|id| self.node(id).params.iter()) {
            if let ParamSource::Security { node, scopes } = &param.source {
                let merged = requirements.entry(*node).or_default();
                for scope in scopes {
                    if !merged.contains(scope) {
                        merged.push(scope.clone());
                    }
                }
            }
        }
        requirements.into_iter().collect()
    }

    /// Whether any extractor reads the request, so the route can fail validation.
    pub fn has_leaves(&self) -> bool {
        self.nodes
            .iter()
            .any(|node| node.params.iter().any(|param| matches!(param.source, ParamSource::Leaf { .. })))
    }

    /// A structural summary: equal for graphs built from the same declarations.
    pub fn fingerprint(&self) -> String {
        let mut fingerprint = String::new();
        for (id, node) in self.nodes() {
            let _ = write!(fingerprint, "{}:{}@{}", id.0, node.callable.name(), node.scope);
            if !node.use_cache {
                fingerprint.push_str("!nocache");
            }
            fingerprint.push('(');
            for (position, param) in node.params.iter().enumerate() {
                if position > 0 {
                    fingerprint.push(',');
                }
                let _ = match &param.source {
                    ParamSource::Leaf { extractor, .. } => write!(fingerprint, "{}={}", param.name, extractor.kind()),
                    ParamSource::Dependency(child) => write!(fingerprint, "{}=#{}", param.name, child.0),
                    ParamSource::Security { node, scopes } => {
                        write!(fingerprint, "{}=sec#{}[{}]", param.name, node.0, scopes.join(" "))
                    }
                    ParamSource::Injected(injected) => write!(fingerprint, "{}={:?}", param.name, injected),
                };
            }
            fingerprint.push_str(");");
        }
        fingerprint
    }
}

#[derive(Default)]
struct GraphBuilder {
    nodes: Vec<DependantNode>,
    cached: HashMap<(CallableId, Scope), NodeId>,
    ancestors: Vec<(Callable, Scope)>,
    parameters: IndexMap<(ParamLocation, String), ParameterBinding>,
    body: Option<BodyBinding>,
    schemes: Vec<(SecurityScheme, NodeId)>,
}

impl GraphBuilder {
    fn visit(&mut self, callable: &Callable, scope: Scope, use_cache: bool) -> Result<NodeId, BuildError> {
        if let Some(position) = self.ancestors.iter().position(|(ancestor, _)| ancestor.id() == callable.id()) {
            let mut path: Vec<String> = self.ancestors[position..]
                .iter()
                .map(|(ancestor, _)| ancestor.name().to_string())
                .collect();
            path.push(callable.name().to_string());
            return Err(BuildError::Cycle { path });
        }
        if let Some((parent, Scope::App)) = self.ancestors.last()
            && scope == Scope::Request
        {
            return Err(BuildError::ScopeMismatch {
                dependant: parent.name().to_string(),
                dependency: callable.name().to_string(),
            });
        }
        if use_cache && let Some(existing) = self.cached.get(&(callable.id(), scope)) {
            debug!(node = existing.0, callable = %callable.name(), "reused dependant");
            return Ok(*existing);
        }
        if let Some(depends) = callable.security_scheme().and_then(|scheme| scheme.deferred_key_name())
            && depends.get_scope() != Scope::App
        {
            return Err(BuildError::DeferredNameScope {
                scheme: callable.name().to_string(),
            });
        }

        self.ancestors.push((callable.clone(), scope));
        let params = self.visit_params(callable, scope);
        self.ancestors.pop();
        let params = params?;

        let guarded = callable.security_scheme().is_some()
            || params
                .iter()
                .filter_map(|param| param.source.child())
                .any(|child| self.nodes[child.0].guarded);
        let id = NodeId(self.nodes.len());
        self.nodes.push(DependantNode {
            callable: callable.clone(),
            scope,
            use_cache,
            params,
            guarded,
        });
        if use_cache {
            self.cached.insert((callable.id(), scope), id);
        }
        debug!(node = id.0, callable = %callable.name(), scope = %scope, guarded, "added dependant");
        Ok(id)
    }

    fn visit_params(&mut self, callable: &Callable, scope: Scope) -> Result<Vec<ResolvedParam>, BuildError> {
        let mut names = HashSet::new();
        let mut params = Vec::with_capacity(callable.params().len());
        for declaration in callable.params() {
            if !names.insert(declaration.name.as_str()) {
                return Err(BuildError::DuplicateParameter {
                    callable: callable.name().to_string(),
                    name: declaration.name.clone(),
                });
            }
            let request_only = || BuildError::ScopeMismatch {
                dependant: callable.name().to_string(),
                dependency: declaration.name.clone(),
            };

            let source = match &declaration.kind {
                ParamKind::Leaf { marker, type_info } => {
                    if scope == Scope::App {
                        return Err(request_only());
                    }
                    let extractor = marker.extractor(&declaration.name, type_info)?;
                    let provider = marker.openapi_provider(&declaration.name, type_info)?;
                    self.check_conflicts(&extractor)?;
                    ParamSource::Leaf { extractor, provider }
                }
                ParamKind::Dependency(depends) => {
                    let target = depends.target().ok_or_else(|| BuildError::UnfilledSlot {
                        dependant: callable.name().to_string(),
                    })?;
                    ParamSource::Dependency(self.visit(target, depends.get_scope(), depends.use_cache())?)
                }
                ParamKind::Security(_) if scope == Scope::App => return Err(request_only()),
                ParamKind::Security(security) => ParamSource::Security {
                    node: self.visit_security(security.callable())?,
                    scopes: security.get_scopes().to_vec(),
                },
                ParamKind::Injected(Injected::Request) if scope == Scope::App => return Err(request_only()),
                ParamKind::Injected(injected) => ParamSource::Injected(*injected),
            };
            params.push(ResolvedParam {
                name: declaration.name.clone(),
                source,
            });
        }
        Ok(params)
    }

    /// Equal schemes declared by separate `Security` values share one node.
    fn visit_security(&mut self, callable: &Callable) -> Result<NodeId, BuildError> {
        let Some(scheme) = callable.security_scheme() else {
            return self.visit(callable, Scope::Request, true);
        };
        if let Some((_, existing)) = self.schemes.iter().find(|(known, _)| known.same_scheme(scheme)) {
            debug!(node = existing.0, scheme = %scheme.name(), "reused security scheme");
            return Ok(*existing);
        }
        let id = self.visit(callable, Scope::Request, true)?;
        self.schemes.push((scheme.clone(), id));
        Ok(id)
    }

    fn check_conflicts(&mut self, extractor: &Extractor) -> Result<(), BuildError> {
        match extractor {
            Extractor::Parameter(binding) => {
                let wire_name = match binding.location {
                    ParamLocation::Header => binding.wire_name.to_ascii_lowercase(),
                    _ => binding.wire_name.clone(),
                };
                match self.parameters.get(&(binding.location, wire_name.clone())) {
                    Some(existing) if !existing.same_contract(binding) => Err(BuildError::ConflictingParameter {
                        location: binding.location,
                        wire_name: binding.wire_name.clone(),
                    }),
                    Some(_) => Ok(()),
                    None => {
                        self.parameters.insert((binding.location, wire_name), binding.clone());
                        Ok(())
                    }
                }
            }
            Extractor::Body(binding) => match &self.body {
                Some(existing) if !existing.same_contract(binding) => {
                    Err(BuildError::ConflictingBody {
                        first: format!("{} ({})", existing.name, existing.kind_name()),
                        second: format!("{} ({})", binding.name, binding.kind_name()),
                    })
                }
                Some(_) => Ok(()),
                None => {
                    self.body = Some(binding.clone());
                    Ok(())
                }
            },
        }
    }
}
