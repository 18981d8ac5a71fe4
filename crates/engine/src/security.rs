//! Built-in security schemes.
//!
//! A scheme is a dependant like any other: [`Security::new`] wraps it in a callable whose node
//! reads credentials from the request. The same scheme describes itself as an OpenAPI
//! security scheme object, and [`SecurityNames`] gives every distinct scheme of a document a
//! unique component name.

use base64::{Engine, engine::general_purpose::STANDARD};
use indexmap::IndexMap;
use quay_types::{OAuthFlow, OAuthFlows, ParamLocation, SecuritySchemeObject};
use serde_json::{Value, json};
use tracing::warn;

use crate::{
    callable::{Callable, Depends, Injected, ParamDecl, ParamKind},
    request::RequestContext,
};

/// Parameter name under which a deferred API key name is passed to the scheme node.
pub(crate) const KEY_NAME_PARAM: &str = "key_name";
const REQUEST_PARAM: &str = "request";

const NOT_AUTHENTICATED: &str = "Not authenticated";
const INVALID_CREDENTIALS: &str = "Invalid authentication credentials";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

impl ApiKeyLocation {
    fn param_location(&self) -> ParamLocation {
        match self {
            Self::Header => ParamLocation::Header,
            Self::Query => ParamLocation::Query,
            Self::Cookie => ParamLocation::Cookie,
        }
    }
}

/// Where an API key scheme gets the name of its key.
#[derive(Debug, Clone)]
pub enum KeyName {
    Static(String),
    /// Produced by an app-scoped dependency, resolved once per app.
    Deferred(Depends),
}

#[derive(Debug, Clone)]
pub enum SchemeKind {
    ApiKey { location: ApiKeyLocation, key_name: KeyName },
    HttpBasic { realm: Option<String> },
    HttpBearer { bearer_format: Option<String> },
    OAuth2PasswordBearer { token_url: String, scopes: IndexMap<String, String> },
    OpenIdConnect { url: String },
}

/// A security scheme and how it reacts to missing credentials.
#[derive(Debug, Clone)]
pub struct SecurityScheme {
    kind: SchemeKind,
    scheme_name: Option<String>,
    description: Option<String>,
    auto_error: bool,
}

/// Why a request was not authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    pub message: String,
    pub www_authenticate: Option<String>,
}

impl SecurityScheme {
    fn with_kind(kind: SchemeKind) -> Self {
        Self {
            kind,
            scheme_name: None,
            description: None,
            auto_error: true,
        }
    }

    pub fn api_key(location: ApiKeyLocation, key_name: KeyName) -> Self {
        Self::with_kind(SchemeKind::ApiKey { location, key_name })
    }

    pub fn api_key_header(name: impl Into<String>) -> Self {
        Self::api_key(ApiKeyLocation::Header, KeyName::Static(name.into()))
    }

    pub fn api_key_query(name: impl Into<String>) -> Self {
        Self::api_key(ApiKeyLocation::Query, KeyName::Static(name.into()))
    }

    pub fn api_key_cookie(name: impl Into<String>) -> Self {
        Self::api_key(ApiKeyLocation::Cookie, KeyName::Static(name.into()))
    }

    pub fn http_basic() -> Self {
        Self::with_kind(SchemeKind::HttpBasic { realm: None })
    }

    pub fn http_bearer() -> Self {
        Self::with_kind(SchemeKind::HttpBearer { bearer_format: None })
    }

    pub fn oauth2_password_bearer(token_url: impl Into<String>) -> Self {
        Self::with_kind(SchemeKind::OAuth2PasswordBearer {
            token_url: token_url.into(),
            scopes: IndexMap::new(),
        })
    }

    pub fn open_id_connect(url: impl Into<String>) -> Self {
        Self::with_kind(SchemeKind::OpenIdConnect { url: url.into() })
    }

    pub fn scheme_name(mut self, name: impl Into<String>) -> Self {
        self.scheme_name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// With `false`, missing or invalid credentials resolve to `null` instead of a 401.
    pub fn auto_error(mut self, auto_error: bool) -> Self {
        self.auto_error = auto_error;
        self
    }

    /// Realm announced in the `WWW-Authenticate` header of HTTP basic failures.
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        if let SchemeKind::HttpBasic { realm: current } = &mut self.kind {
            *current = Some(realm.into());
        }
        self
    }

    pub fn bearer_format(mut self, format: impl Into<String>) -> Self {
        if let SchemeKind::HttpBearer { bearer_format } = &mut self.kind {
            *bearer_format = Some(format.into());
        }
        self
    }

    /// Declares an OAuth2 scope with its description.
    pub fn scope(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        if let SchemeKind::OAuth2PasswordBearer { scopes, .. } = &mut self.kind {
            scopes.insert(name.into(), description.into());
        }
        self
    }

    pub fn kind(&self) -> &SchemeKind {
        &self.kind
    }

    pub fn is_auto_error(&self) -> bool {
        self.auto_error
    }

    /// The dependency producing the API key name, for deferred key names.
    pub fn deferred_key_name(&self) -> Option<&Depends> {
        match &self.kind {
            SchemeKind::ApiKey {
                key_name: KeyName::Deferred(depends),
                ..
            } => Some(depends),
            _ => None,
        }
    }

    /// Whether two schemes read and document the same credentials.
    pub fn same_scheme(&self, other: &SecurityScheme) -> bool {
        let same_kind = match (&self.kind, &other.kind) {
            (
                SchemeKind::ApiKey {
                    location: ours,
                    key_name: KeyName::Deferred(our_depends),
                },
                SchemeKind::ApiKey {
                    location: theirs,
                    key_name: KeyName::Deferred(their_depends),
                },
            ) => {
                ours == theirs
                    && matches!(
                        (our_depends.target(), their_depends.target()),
                        (Some(a), Some(b)) if a.id() == b.id()
                    )
            }
            (SchemeKind::ApiKey { key_name: KeyName::Deferred(_), .. }, _)
            | (_, SchemeKind::ApiKey { key_name: KeyName::Deferred(_), .. }) => false,
            (SchemeKind::HttpBasic { realm: ours }, SchemeKind::HttpBasic { realm: theirs }) => ours == theirs,
            _ => self.openapi_object(None) == other.openapi_object(None),
        };
        same_kind && self.auto_error == other.auto_error && self.name() == other.name()
    }

    /// Base component name: the explicit scheme name or the kind's default.
    pub fn name(&self) -> String {
        if let Some(name) = &self.scheme_name {
            return name.clone();
        }
        match &self.kind {
            SchemeKind::ApiKey {
                location: ApiKeyLocation::Header,
                ..
            } => "APIKeyHeader",
            SchemeKind::ApiKey {
                location: ApiKeyLocation::Query,
                ..
            } => "APIKeyQuery",
            SchemeKind::ApiKey {
                location: ApiKeyLocation::Cookie,
                ..
            } => "APIKeyCookie",
            SchemeKind::HttpBasic { .. } => "HTTPBasic",
            SchemeKind::HttpBearer { .. } => "HTTPBearer",
            SchemeKind::OAuth2PasswordBearer { .. } => "OAuth2PasswordBearer",
            SchemeKind::OpenIdConnect { .. } => "OpenIdConnect",
        }
        .to_string()
    }

    /// The OpenAPI security scheme object. `key_name` supplies a deferred API key name.
    pub fn openapi_object(&self, key_name: Option<&str>) -> SecuritySchemeObject {
        let description = self.description.clone();
        match &self.kind {
            SchemeKind::ApiKey { location, key_name: declared } => SecuritySchemeObject::ApiKey {
                name: match declared {
                    KeyName::Static(name) => name.clone(),
                    KeyName::Deferred(_) => key_name.unwrap_or_default().to_string(),
                },
                location: location.param_location(),
                description,
            },
            SchemeKind::HttpBasic { .. } => SecuritySchemeObject::Http {
                scheme: "basic".into(),
                bearer_format: None,
                description,
            },
            SchemeKind::HttpBearer { bearer_format } => SecuritySchemeObject::Http {
                scheme: "bearer".into(),
                bearer_format: bearer_format.clone(),
                description,
            },
            SchemeKind::OAuth2PasswordBearer { token_url, scopes } => SecuritySchemeObject::OAuth2 {
                flows: OAuthFlows {
                    password: Some(OAuthFlow {
                        token_url: token_url.clone(),
                        scopes: scopes.clone(),
                    }),
                },
                description,
            },
            SchemeKind::OpenIdConnect { url } => SecuritySchemeObject::OpenIdConnect {
                open_id_connect_url: url.clone(),
                description,
            },
        }
    }

    /// Reads the credentials this scheme expects from the request.
    pub fn authenticate(&self, request: &RequestContext, key_name: Option<&str>) -> Result<Value, AuthFailure> {
        match &self.kind {
            SchemeKind::ApiKey { location, key_name: declared } => {
                let name = match declared {
                    KeyName::Static(name) => name.as_str(),
                    KeyName::Deferred(_) => key_name.unwrap_or_default(),
                };
                let key = match location {
                    ApiKeyLocation::Header => request.header(name),
                    ApiKeyLocation::Query => request.query_values(name).last().copied(),
                    ApiKeyLocation::Cookie => request.cookie(name),
                };
                key.filter(|key| !key.is_empty())
                    .map(|key| Value::String(key.to_string()))
                    .ok_or_else(|| failure(NOT_AUTHENTICATED, None))
            }
            SchemeKind::HttpBasic { realm } => {
                let challenge = match realm {
                    Some(realm) => format!("Basic realm=\"{}\"", realm),
                    None => "Basic".to_string(),
                };
                let Some(credentials) = authorization(request, "basic") else {
                    return Err(failure(NOT_AUTHENTICATED, Some(challenge)));
                };
                let decoded = STANDARD
                    .decode(credentials)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
                    .ok_or_else(|| failure(INVALID_CREDENTIALS, Some(challenge.clone())))?;
                let (username, password) = decoded
                    .split_once(':')
                    .ok_or_else(|| failure(INVALID_CREDENTIALS, Some(challenge.clone())))?;
                Ok(json!({"username": username, "password": password}))
            }
            SchemeKind::HttpBearer { .. } => {
                if request.header("authorization").is_none() {
                    return Err(failure(NOT_AUTHENTICATED, Some("Bearer".into())));
                }
                authorization(request, "bearer")
                    .map(|token| json!({"scheme": "Bearer", "credentials": token}))
                    .ok_or_else(|| failure(INVALID_CREDENTIALS, Some("Bearer".into())))
            }
            SchemeKind::OAuth2PasswordBearer { .. } => authorization(request, "bearer")
                .map(|token| Value::String(token.to_string()))
                .ok_or_else(|| failure(NOT_AUTHENTICATED, Some("Bearer".into()))),
            SchemeKind::OpenIdConnect { .. } => request
                .header("authorization")
                .filter(|value| !value.is_empty())
                .map(|value| Value::String(value.to_string()))
                .ok_or_else(|| failure(NOT_AUTHENTICATED, None)),
        }
    }
}

fn failure(message: &str, www_authenticate: Option<String>) -> AuthFailure {
    AuthFailure {
        message: message.to_string(),
        www_authenticate,
    }
}

/// Credentials of an `Authorization` header using `scheme`, compared case-insensitively.
fn authorization<'a>(request: &'a RequestContext, scheme: &str) -> Option<&'a str> {
    let value = request.header("authorization")?;
    let (declared, credentials) = value.trim().split_once(' ')?;
    let credentials = credentials.trim();
    (declared.eq_ignore_ascii_case(scheme) && !credentials.is_empty()).then_some(credentials)
}

/// Declares that a callable requires a security scheme, optionally with OAuth2 scopes.
#[derive(Debug, Clone)]
pub struct Security {
    callable: Callable,
    scopes: Vec<String>,
}

impl Security {
    pub fn new(scheme: SecurityScheme) -> Self {
        let mut params = vec![ParamDecl {
            name: REQUEST_PARAM.into(),
            kind: ParamKind::Injected(Injected::Request),
        }];
        if let Some(depends) = scheme.deferred_key_name() {
            params.push(ParamDecl {
                name: KEY_NAME_PARAM.into(),
                kind: ParamKind::Dependency(depends.clone()),
            });
        }
        Self {
            callable: Callable::security(scheme.name(), params, scheme),
            scopes: Vec::new(),
        }
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    pub fn get_scopes(&self) -> &[String] {
        &self.scopes
    }
}

/// Assigns document-wide unique names to security schemes.
///
/// Structurally equal schemes share a name; a different scheme reusing a taken name gets
/// `_2`, `_3`, ... in registration order.
#[derive(Debug, Clone, Default)]
pub struct SecurityNames {
    schemes: IndexMap<String, SecuritySchemeObject>,
}

impl SecurityNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, base: &str, object: SecuritySchemeObject) -> String {
        let mut suffix = 1;
        loop {
            let candidate = if suffix == 1 {
                base.to_string()
            } else {
                format!("{}_{}", base, suffix)
            };
            match self.schemes.get(&candidate) {
                Some(existing) if *existing == object => return candidate,
                Some(_) => suffix += 1,
                None => {
                    if suffix > 1 {
                        warn!(scheme = %base, name = %candidate, "security scheme name collision");
                    }
                    self.schemes.insert(candidate.clone(), object);
                    return candidate;
                }
            }
        }
    }

    pub fn into_components(self) -> IndexMap<String, SecuritySchemeObject> {
        self.schemes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RawRequest;

    fn request(headers: &[(&str, &str)]) -> RequestContext {
        let raw = headers
            .iter()
            .fold(RawRequest::new("GET", "/"), |raw, (name, value)| raw.with_header(*name, *value));
        RequestContext::new(raw)
    }

    #[test]
    fn api_keys_read_from_their_location() {
        let header = SecurityScheme::api_key_header("key");
        assert_eq!(header.authenticate(&request(&[("Key", "secret")]), None), Ok(json!("secret")));
        let missing = header.authenticate(&request(&[]), None).unwrap_err();
        assert_eq!(missing.message, "Not authenticated");
        assert_eq!(missing.www_authenticate, None);

        let query = SecurityScheme::api_key_query("token");
        let context = RequestContext::new(RawRequest::new("GET", "/").with_query("token=t1"));
        assert_eq!(query.authenticate(&context, None), Ok(json!("t1")));

        let cookie = SecurityScheme::api_key_cookie("session");
        assert_eq!(cookie.authenticate(&request(&[("cookie", "session=s")]), None), Ok(json!("s")));
    }

    #[test]
    fn deferred_key_names_come_from_the_caller() {
        let name_source = Callable::builder("get_name").build_sync(|_| Ok("key"));
        let scheme = SecurityScheme::api_key(ApiKeyLocation::Header, KeyName::Deferred(Depends::on(&name_source)));
        assert_eq!(scheme.authenticate(&request(&[("key", "k")]), Some("key")), Ok(json!("k")));
        assert_eq!(
            scheme.openapi_object(Some("key")),
            SecuritySchemeObject::ApiKey {
                name: "key".into(),
                location: ParamLocation::Header,
                description: None
            }
        );
        let security = Security::new(scheme);
        assert_eq!(security.callable().params().len(), 2);
    }

    #[test]
    fn http_basic_decodes_credentials() {
        let scheme = SecurityScheme::http_basic().realm("api");
        let encoded = format!("Basic {}", STANDARD.encode("ada:lovelace"));
        assert_eq!(
            scheme.authenticate(&request(&[("authorization", encoded.as_str())]), None),
            Ok(json!({"username": "ada", "password": "lovelace"}))
        );
        let invalid = scheme.authenticate(&request(&[("authorization", "Basic !!!")]), None).unwrap_err();
        assert_eq!(invalid.message, "Invalid authentication credentials");
        assert_eq!(invalid.www_authenticate.as_deref(), Some("Basic realm=\"api\""));
    }

    #[test]
    fn bearer_schemes_read_tokens() {
        let bearer = SecurityScheme::http_bearer();
        assert_eq!(
            bearer.authenticate(&request(&[("authorization", "bearer abc")]), None),
            Ok(json!({"scheme": "Bearer", "credentials": "abc"}))
        );
        let wrong = bearer.authenticate(&request(&[("authorization", "Basic abc")]), None).unwrap_err();
        assert_eq!(wrong.message, "Invalid authentication credentials");

        let oauth = SecurityScheme::oauth2_password_bearer("/token").scope("items:read", "Read items");
        assert_eq!(oauth.authenticate(&request(&[("authorization", "Bearer t")]), None), Ok(json!("t")));
        let SecuritySchemeObject::OAuth2 { flows, .. } = oauth.openapi_object(None) else {
            panic!("expected oauth2 object");
        };
        let password = flows.password.expect("password flow");
        assert_eq!(password.token_url, "/token");
        assert_eq!(password.scopes["items:read"], "Read items");
    }

    #[test]
    fn default_names_follow_the_kind() {
        assert_eq!(SecurityScheme::api_key_header("k").name(), "APIKeyHeader");
        assert_eq!(SecurityScheme::api_key_cookie("k").name(), "APIKeyCookie");
        assert_eq!(SecurityScheme::http_basic().name(), "HTTPBasic");
        assert_eq!(SecurityScheme::open_id_connect("https://id.example.com").name(), "OpenIdConnect");
        assert_eq!(SecurityScheme::http_bearer().scheme_name("Token").name(), "Token");
    }

    #[test]
    fn colliding_names_get_suffixes() {
        let mut names = SecurityNames::new();
        let first = SecurityScheme::api_key_header("a").openapi_object(None);
        let second = SecurityScheme::api_key_header("b").openapi_object(None);
        assert_eq!(names.register("APIKeyHeader", first.clone()), "APIKeyHeader");
        assert_eq!(names.register("APIKeyHeader", second.clone()), "APIKeyHeader_2");
        assert_eq!(names.register("APIKeyHeader", first), "APIKeyHeader");
        assert_eq!(names.register("APIKeyHeader", second), "APIKeyHeader_2");
        assert_eq!(names.into_components().len(), 2);
    }
}
