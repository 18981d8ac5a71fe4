//! # Quay App
//!
//! A thin in-process app around the engine: a route table, request dispatch, the OpenAPI
//! document builder and a test client. There is no transport; requests arrive as
//! [`quay_engine::RawRequest`] values.

pub mod app;
pub mod config;
pub mod response;
pub mod routing;
pub mod testing;

pub use app::App;
pub use config::{AppConfig, CONFIG_PATH_ENV, ConfigError};
pub use response::{HttpError, Response};
pub use routing::{Route, RouteError, RouteMatch, Router};
pub use testing::{TestClient, TestRequest, TestResponse};
