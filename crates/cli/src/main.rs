use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use quay_app::{AppConfig, TestClient};
use quay_util::redact_sensitive;
use tracing::debug;

mod demo;

#[derive(Debug, Parser)]
#[command(name = "quay", version, about = "Inspect and exercise the bundled Quay demo app")]
struct Cli {
    /// Config file (JSON or YAML); defaults to $QUAY_CONFIG_PATH
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the demo app's OpenAPI document
    Openapi {
        /// Emit YAML instead of JSON
        #[arg(long)]
        yaml: bool,
    },
    /// Run one request through the demo app and print the response
    Call {
        method: String,
        /// Request path, optionally with a `?query` suffix
        path: String,
        /// Header as `name:value`; repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Query string appended to the path
        #[arg(long)]
        query: Option<String>,
        /// JSON request body
        #[arg(long)]
        json: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_path(path).with_context(|| format!("failed to load config {}", path.display()))?,
        None => AppConfig::load().context("failed to load config from QUAY_CONFIG_PATH")?,
    };
    let app = demo::build_app(config)?;
    let client = TestClient::start(app).await.context("app startup failed")?;

    let outcome = match cli.command {
        Command::Openapi { yaml } => print_document(&client, yaml).await,
        Command::Call {
            method,
            path,
            headers,
            query,
            json,
        } => call(&client, &method, &path, &headers, query.as_deref(), json.as_deref()).await,
    };
    client.close().await;
    outcome
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing::subscriber::set_global_default(log_subscriber(&filter));
}

/// The `RUST_LOG` filter alone decides which levels are emitted.
fn log_subscriber(filter: &str) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
}

async fn print_document(client: &TestClient, yaml: bool) -> Result<()> {
    let document = client.app().openapi().await.context("failed to build the OpenAPI document")?;
    let rendered = if yaml {
        serde_yaml::to_string(&document)?
    } else {
        serde_json::to_string_pretty(&document)?
    };
    println!("{}", rendered);
    Ok(())
}

async fn call(client: &TestClient, method: &str, path: &str, headers: &[String], query: Option<&str>, json: Option<&str>) -> Result<()> {
    let mut request = client.request(method, path);
    for header in headers {
        let Some((name, value)) = header.split_once(':') else {
            bail!("header '{}' must look like name:value", header);
        };
        debug!(header = %redact_sensitive(header), "request header");
        request = request.header(name.trim(), value.trim());
    }
    if let Some(query) = query {
        request = request.raw_query(query.strip_prefix('?').unwrap_or(query));
    }
    if let Some(body) = json {
        let value: serde_json::Value = serde_json::from_str(body).context("--json is not valid JSON")?;
        request = request.json(&value);
    }

    let response = request.send().await;
    println!("{}\n{}", response.status, serde_json::to_string_pretty(&response.body)?);
    Ok(())
}
