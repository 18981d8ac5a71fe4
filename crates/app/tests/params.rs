use quay_app::{App, AppConfig, TestClient};
use quay_engine::{Callable, CallableBuilder, ParamMarker};
use quay_types::ParamStyle;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct Filter {
    color: Option<String>,
    size: Option<u32>,
}

fn echo(name: &str) -> CallableBuilder {
    Callable::builder(name)
}

/// Answers with every resolved argument as a JSON object.
fn finish(builder: CallableBuilder) -> Callable {
    builder.build_sync(|args| Ok(args.into_values()))
}

fn client(routes: &[(&str, Callable)]) -> TestClient {
    let mut app = App::new(AppConfig::default());
    for (path, callable) in routes {
        app.route("GET", path, callable).unwrap();
    }
    TestClient::new(app)
}

#[tokio::test]
async fn path_parameters_are_required_and_typed() {
    let get_item = finish(echo("get_item").param::<u32>("item_id", ParamMarker::path()));
    let client = client(&[("/items/{item_id}", get_item)]);

    let response = client.get("/items/42").send().await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({"item_id": 42}));

    let response = client.get("/items/forty-two").send().await;
    assert_eq!(response.status, 422);
    assert_eq!(response.body["detail"][0]["location"], json!(["path", "item_id"]));
    assert_eq!(response.body["detail"][0]["type"], json!("int_parsing"));
}

#[tokio::test]
async fn labelled_and_matrix_path_styles() {
    let label = finish(echo("label").param::<Vec<u32>>("ids", ParamMarker::path().style(ParamStyle::Label)));
    let matrix = finish(echo("matrix").param::<Vec<u32>>("ids", ParamMarker::path().style(ParamStyle::Matrix)));
    let client = client(&[("/label/{ids}", label), ("/matrix/{ids}", matrix)]);

    assert_eq!(client.get("/label/.1,2,3").send().await.body, json!({"ids": [1, 2, 3]}));
    assert_eq!(client.get("/matrix/;ids=4,5").send().await.body, json!({"ids": [4, 5]}));
}

#[tokio::test]
async fn query_sequences_follow_style_and_explode() {
    let exploded = finish(echo("exploded").param::<Vec<String>>("tag", ParamMarker::query()));
    let joined = finish(echo("joined").param::<Vec<u32>>("ids", ParamMarker::query().explode(false)));
    let piped = finish(echo("piped").param::<Vec<String>>(
        "names",
        ParamMarker::query().style(ParamStyle::PipeDelimited).explode(false),
    ));
    let client = client(&[("/exploded", exploded), ("/joined", joined), ("/piped", piped)]);

    assert_eq!(client.get("/exploded?tag=a&tag=b").send().await.body, json!({"tag": ["a", "b"]}));
    assert_eq!(client.get("/joined?ids=1,2,3").send().await.body, json!({"ids": [1, 2, 3]}));
    assert_eq!(client.get("/piped").raw_query("names=x|y").send().await.body, json!({"names": ["x", "y"]}));
}

#[tokio::test]
async fn deep_object_and_form_object_queries() {
    let deep = finish(echo("deep").param::<Filter>("filter", ParamMarker::query().style(ParamStyle::DeepObject)));
    let flat = finish(echo("flat").param::<Filter>("filter", ParamMarker::query()));
    let client = client(&[("/deep", deep), ("/flat", flat)]);

    let response = client.get("/deep").raw_query("filter[color]=red&filter[size]=3").send().await;
    assert_eq!(response.body, json!({"filter": {"color": "red", "size": 3}}));

    let response = client.get("/flat?color=blue&size=9").send().await;
    assert_eq!(response.body, json!({"filter": {"color": "blue", "size": 9}}));
}

#[tokio::test]
async fn optional_parameters_and_defaults() {
    let list = finish(
        echo("list")
            .param::<Option<u32>>("limit", ParamMarker::query())
            .param::<u32>("offset", ParamMarker::query().default(json!(0))),
    );
    let client = client(&[("/items", list)]);

    assert_eq!(client.get("/items").send().await.body, json!({"limit": null, "offset": 0}));
    assert_eq!(client.get("/items?limit=5&offset=10").send().await.body, json!({"limit": 5, "offset": 10}));
}

#[tokio::test]
async fn headers_and_cookies() {
    let read = finish(
        echo("read")
            .param::<String>("x_token", ParamMarker::header())
            .param::<Option<String>>("raw_name", ParamMarker::header().convert_underscores(false))
            .param::<Option<String>>("session", ParamMarker::cookie())
            .param::<Option<String>>("theme", ParamMarker::cookie().alias("ui-theme")),
    );
    let client = client(&[("/read", read)]);

    let response = client
        .get("/read")
        .header("X-Token", "t0k3n")
        .header("raw_name", "kept")
        .cookie("session", "s1")
        .cookie("ui-theme", "dark")
        .send()
        .await;
    assert_eq!(response.status, 200, "{:?}", response.body);
    assert_eq!(
        response.body,
        json!({"x_token": "t0k3n", "raw_name": "kept", "session": "s1", "theme": "dark"})
    );

    let response = client.get("/read").send().await;
    assert_eq!(response.status, 422);
    assert_eq!(response.body["detail"][0]["location"], json!(["header", "x-token"]));
}

#[tokio::test]
async fn missing_and_malformed_query_parameters_are_reported_together() {
    let search = finish(
        echo("search")
            .param::<String>("q", ParamMarker::query())
            .param::<u32>("page", ParamMarker::query())
            .param::<bool>("exact", ParamMarker::query()),
    );
    let client = client(&[("/search", search)]);

    let response = client.get("/search?page=two&exact=maybe").send().await;
    assert_eq!(response.status, 422);
    let detail = response.body["detail"].as_array().cloned().unwrap_or_default();
    let kinds: Vec<&Value> = detail.iter().map(|entry| &entry["type"]).collect();
    assert_eq!(kinds, vec![&json!("missing"), &json!("int_parsing"), &json!("bool_parsing")]);
    assert_eq!(detail[0], json!({"location": ["query", "q"], "message": "Field required", "type": "missing"}));
}
