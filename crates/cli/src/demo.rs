//! The demo app bundled with the CLI.

use anyhow::{Context, Result};
use quay_app::{App, AppConfig, HttpError};
use quay_engine::{Callable, Depends, Form, FormFile, Json, ParamMarker, Security, SecurityScheme, UploadFile};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct User {
    username: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct Item {
    name: String,
    price: f64,
    description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct Upload {
    description: String,
    file: UploadFile,
}

pub fn build_app(config: AppConfig) -> Result<App> {
    let current_user = Callable::builder("get_current_user")
        .security("api_key", Security::new(SecurityScheme::api_key_header("key").auto_error(false)))
        .build_sync(|args| {
            let key: Option<String> = args.get("api_key")?;
            Ok(key.map(|username| User { username }))
        });
    let read_current_user = Callable::builder("read_current_user")
        .depends("user", Depends::on(&current_user))
        .build_sync(|args| {
            let user: Option<User> = args.get("user")?;
            Ok(match user {
                Some(user) => serde_json::to_value(user)?,
                None => json!({"msg": "Create an account first"}),
            })
        });

    let read_item = Callable::builder("read_item")
        .param::<u32>("item_id", ParamMarker::path().description("Item identifier"))
        .param::<Option<String>>("q", ParamMarker::query())
        .param::<Option<String>>("x_token", ParamMarker::header())
        .build_sync(|args| {
            let item_id: u32 = args.get("item_id")?;
            if item_id == 0 {
                return Err(HttpError::new(404, "Item not found").into());
            }
            Ok(json!({
                "item_id": item_id,
                "q": args.get::<Option<String>>("q")?,
                "x_token": args.get::<Option<String>>("x_token")?,
            }))
        });

    let create_item = Callable::builder("create_item")
        .param::<Item>("item", Json::new().description("The item to create"))
        .build_sync(|args| Ok(args.get::<Item>("item")?));

    let upload = Callable::builder("upload")
        .param::<Upload>("upload", Form::multipart().field("file", FormFile::new()))
        .build_sync(|args| {
            let upload: Upload = args.get("upload")?;
            Ok(json!({
                "description": upload.description,
                "filename": upload.file.filename,
                "content_type": upload.file.content_type,
                "size": upload.file.content.len(),
            }))
        });

    let mut app = App::new(config);
    app.route("GET", "/users/me", &read_current_user)
        .and_then(|app| app.route("GET", "/items/{item_id}", &read_item))
        .and_then(|app| app.route("POST", "/items", &create_item))
        .and_then(|app| app.route("POST", "/upload", &upload))
        .context("failed to register demo routes")?;
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_app::TestClient;

    #[tokio::test]
    async fn demo_routes_answer() {
        let client = TestClient::new(build_app(AppConfig::default()).unwrap());

        let response = client.get("/users/me").send().await;
        assert_eq!(response.body, json!({"msg": "Create an account first"}));

        let response = client.get("/items/3?q=blue").header("x-token", "t").send().await;
        assert_eq!(response.body, json!({"item_id": 3, "q": "blue", "x_token": "t"}));

        let response = client.get("/items/0").send().await;
        assert_eq!(response.status, 404);

        let response = client.post("/items").json(&json!({"name": "pen", "price": 2.5})).send().await;
        assert_eq!(response.body, json!({"name": "pen", "price": 2.5, "description": null}));
    }
}
