use quay_app::{App, AppConfig, TestClient};
use quay_engine::{Callable, ContentTypeDiscriminated, File, FileFormat, Form, FormEncodedField, FormFile, Json, RepeatedFormField, UploadFile};
use quay_types::ParamStyle;
use quay_util::MultipartBuilder;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct Item {
    name: String,
    price: f64,
    tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct Search {
    query: String,
    ids: Vec<u32>,
    labels: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct Avatar {
    user: String,
    image: UploadFile,
}

fn client(path: &str, callable: &Callable) -> TestClient {
    let mut app = App::new(AppConfig::default());
    app.route("POST", path, callable).unwrap();
    TestClient::new(app)
}

fn echo_body<T>(marker: impl Into<quay_engine::Marker>) -> Callable
where
    T: serde::de::DeserializeOwned + Serialize + JsonSchema + 'static,
{
    Callable::builder("echo")
        .param::<T>("body", marker)
        .build_sync(|args| Ok(args.get::<Value>("body")?))
}

#[tokio::test]
async fn json_bodies_are_validated_against_the_model() {
    let client = client("/items", &echo_body::<Item>(Json::new()));

    let response = client.post("/items").json(&json!({"name": "pen", "price": 1.5})).send().await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({"name": "pen", "price": 1.5, "tags": null}));

    let response = client.post("/items").json(&json!({"name": "pen"})).send().await;
    assert_eq!(response.status, 422);
    assert_eq!(response.body["detail"][0]["location"], json!(["body", "price"]));
    assert_eq!(response.body["detail"][0]["type"], json!("missing"));
}

#[tokio::test]
async fn text_plain_is_rejected_for_json_bodies() {
    let client = client("/items", &echo_body::<Item>(Json::new()));
    let response = client
        .post("/items")
        .body(br#"{"name": "pen", "price": 1}"#.to_vec(), "text/plain")
        .send()
        .await;
    assert_eq!(response.status, 422);
    assert_eq!(response.body["detail"][0]["type"], json!("unsupported_media_type"));
    assert_eq!(response.body["detail"][0]["location"], json!(["body"]));

    let lenient = client_lenient();
    let response = lenient
        .post("/items")
        .body(br#"{"name": "pen", "price": 1}"#.to_vec(), "text/plain")
        .send()
        .await;
    assert_eq!(response.status, 200);
}

fn client_lenient() -> TestClient {
    client("/items", &echo_body::<Item>(Json::new().enforce_media_type(false)))
}

#[tokio::test]
async fn optional_bodies_accept_an_empty_request() {
    let client = client("/items", &echo_body::<Option<Item>>(Json::new()));
    let response = client.post("/items").bytes(Vec::new()).send().await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, Value::Null);
}

#[tokio::test]
async fn urlencoded_forms_use_field_markers() {
    let marker = Form::urlencoded()
        .field("ids", FormEncodedField::new().explode(false))
        .field("labels", RepeatedFormField::new().alias("label"));
    let client = client("/search", &echo_body::<Search>(marker));

    let response = client
        .post("/search")
        .form(&[("query", "shoes"), ("ids", "1,2"), ("label", "new"), ("label", "sale")])
        .send()
        .await;
    assert_eq!(response.status, 200, "{:?}", response.body);
    assert_eq!(response.body, json!({"query": "shoes", "ids": [1, 2], "labels": ["new", "sale"]}));

    let response = client.post("/search").form(&[("ids", "x")]).send().await;
    assert_eq!(response.status, 422);
    let locations: Vec<&Value> = response
        .body["detail"]
        .as_array()
        .map(|entries| entries.iter().map(|entry| &entry["location"]).collect())
        .unwrap_or_default();
    assert!(locations.contains(&&json!(["body", "query"])));
    assert!(locations.contains(&&json!(["body", "ids", 0])) || locations.contains(&&json!(["body", "ids"])));
}

#[tokio::test]
async fn multipart_uploads() {
    let marker = Form::multipart().field("image", FormFile::new().media_type("image/png"));
    let upload = Callable::builder("upload")
        .param::<Avatar>("avatar", marker)
        .build_sync(|args| {
            let avatar: Avatar = args.get("avatar")?;
            Ok(json!({
                "user": avatar.user,
                "filename": avatar.image.filename,
                "size": avatar.image.content.len(),
            }))
        });
    let client = client("/upload", &upload);

    let form = MultipartBuilder::new("xXx")
        .text("user", "ada")
        .file("image", "me.png", "image/png", vec![0x89, 0x50, 0x4e, 0x47]);
    let response = client.post("/upload").multipart(&form).send().await;
    assert_eq!(response.status, 200, "{:?}", response.body);
    assert_eq!(response.body, json!({"user": "ada", "filename": "me.png", "size": 4}));

    let response = client.post("/upload").form(&[("user", "ada")]).send().await;
    assert_eq!(response.status, 422);
    assert_eq!(response.body["detail"][0]["type"], json!("unsupported_media_type"));
}

#[tokio::test]
async fn file_bodies_and_content_type_dispatch() {
    let raw = Callable::builder("raw")
        .param::<UploadFile>("file", File::new().media_type("image/*"))
        .build_sync(|args| {
            let file: UploadFile = args.get("file")?;
            Ok(json!({"content_type": file.content_type, "size": file.content.len()}))
        });
    let encoded = echo_body::<String>(File::new().format(FileFormat::Base64));
    let either = echo_body::<Value>(
        ContentTypeDiscriminated::new()
            .variant::<Item>(Json::new())
            .variant::<Search>(Form::urlencoded().field("ids", FormEncodedField::new().style(ParamStyle::Form).explode(false))),
    );

    let mut app = App::new(AppConfig::default());
    app.route("POST", "/raw", &raw)
        .unwrap()
        .route("POST", "/encoded", &encoded)
        .unwrap()
        .route("POST", "/either", &either)
        .unwrap();
    let client = TestClient::new(app);

    let response = client.post("/raw").body(vec![1, 2, 3], "image/gif").send().await;
    assert_eq!(response.body, json!({"content_type": "image/gif", "size": 3}));
    let response = client.post("/raw").body(vec![1], "text/plain").send().await;
    assert_eq!(response.status, 422);

    let response = client.post("/encoded").body(b"aGVsbG8=".to_vec(), "text/plain").send().await;
    assert_eq!(response.body, json!("hello"));

    let response = client.post("/either").json(&json!({"name": "pen", "price": 2})).send().await;
    assert_eq!(response.body["name"], json!("pen"));
    let response = client
        .post("/either")
        .form(&[("query", "q"), ("ids", "3,4"), ("labels", "a")])
        .send()
        .await;
    assert_eq!(response.body, json!({"query": "q", "ids": [3, 4], "labels": ["a"]}));
    let response = client.post("/either").body(b"a,b".to_vec(), "text/csv").send().await;
    assert_eq!(response.status, 422);
    assert_eq!(response.body["detail"][0]["type"], json!("unsupported_media_type"));
}

#[tokio::test]
async fn file_bodies_without_a_media_type_take_any_request() {
    let raw = Callable::builder("raw")
        .param::<UploadFile>("file", File::new())
        .build_sync(|args| {
            let file: UploadFile = args.get("file")?;
            Ok(json!({"size": file.content.len()}))
        });
    let client = client("/raw", &raw);

    let response = client.post("/raw").bytes(b"abc".to_vec()).send().await;
    assert_eq!(response.status, 200, "{:?}", response.body);
    assert_eq!(response.body, json!({"size": 3}));
}
