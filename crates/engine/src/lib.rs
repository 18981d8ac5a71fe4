//! # Quay Engine
//!
//! The request-handling core: parameter markers, the dependant graph built from a route's
//! callable, and the resolution engine that turns a request into the callable's arguments.
//!
//! ## Usage
//!
//! ```rust
//! use quay_engine::{Callable, DependantGraph, ParamMarker};
//!
//! let list_items = Callable::builder("list_items")
//!     .param::<Option<u32>>("limit", ParamMarker::query())
//!     .build_sync(|args| Ok(args.get::<Option<u32>>("limit")?));
//!
//! let graph = DependantGraph::build(&list_items)?;
//! assert_eq!(graph.providers().len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`marker`**: declarative markers and the binding step both factories share
//! - **`extract`**: extractors reading and validating values from a request
//! - **`openapi`**: providers contributing parameters and request bodies to an operation
//! - **`callable`**: callables, dependency declarations and resolved arguments
//! - **`graph`**: the deduplicated, scope-checked dependant graph
//! - **`resolve`**: per-request and app-scoped resolution
//! - **`security`**: built-in security schemes

pub mod callable;
pub mod error;
pub mod extract;
pub mod graph;
pub mod marker;
pub mod openapi;
pub mod request;
pub mod resolve;
pub mod security;
pub mod typeinfo;

pub use callable::{Arguments, Callable, CallableBuilder, CallableId, CallableSlot, Depends, HandlerFuture, Injected, Scope};
pub use error::{ArgumentError, BodyReadError, BuildError, ResolutionError};
pub use extract::Extractor;
pub use graph::{DependantGraph, DependantNode, NodeId, ParamSource};
pub use marker::{
    BodyMarker, ContentTypeDiscriminated, FieldMarker, File, FileFormat, Form, FormEncodedField, FormEncoding, FormField, FormFile,
    Json, Marker, ParamMarker, RepeatedFormField,
};
pub use openapi::{OpenApiProvider, SchemaRegistry};
pub use request::{BodySource, RawRequest, RequestContext};
pub use resolve::{AppScopeCache, ResolutionPolicy, SecurityPriority, deferred_key_name, resolve, resolve_app_scoped};
pub use security::{ApiKeyLocation, KeyName, Security, SecurityNames, SecurityScheme};
pub use typeinfo::{TypeInfo, UploadFile};
