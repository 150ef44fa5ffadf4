use std::{num::NonZeroUsize, path::PathBuf, sync::Arc};

use axum::{
    Router,
    body::Body,
    http::{
        Method, Request, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE, LOCATION},
    },
    response::Response,
};
use folio::{
    application::projects::{PROJECTS_KEY, ProjectService},
    cache::{CacheConfig, CacheService},
    config::{AuthSettings, ContentEnvironment, ContentSettings, ProjectsSource, Secret},
    infra::http::{HttpState, build_router},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;

const ADMIN_TOKEN: &str = "admin-token";
const COMMAND_TOKEN: &str = "command-token";
const DECOY: &str = "https://example.com/decoy";

const PROJECTS_V1: &str = r#"
- title: Ray marcher
  slug: ray-marcher
  description: Signed distance fields
  cover_image: /images/ray.png
  images: []
- null
- title: Synth
  slug: synth
  description: Tiny synthesizer
  cover_image: /images/synth.png
  images: []
"#;

const PROJECTS_V2: &str = r#"
- title: Only one
  slug: only-one
  description: Replaced content
  cover_image: /images/one.png
  images: []
"#;

struct TestApp {
    _dir: TempDir,
    projects_path: PathBuf,
    cache: CacheService,
    router: Router,
}

impl TestApp {
    async fn new(environment: ContentEnvironment) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let projects_path = dir.path().join("projects.yml");
        tokio::fs::write(&projects_path, PROJECTS_V1)
            .await
            .expect("write projects");

        let cache = CacheService::connect(&CacheConfig {
            database_path: dir.path().join("cache.db"),
            lru_max_entries: NonZeroUsize::new(16).expect("non-zero"),
        })
        .await
        .expect("cache service");

        let projects = ProjectService::new(
            cache.clone(),
            &ContentSettings {
                environment,
                projects_source: ProjectsSource::File(projects_path.clone()),
            },
        );

        let state = HttpState {
            cache: cache.clone(),
            projects,
            auth: Arc::new(AuthSettings {
                admin_token: Some(Secret::new(ADMIN_TOKEN)),
                internal_command_token: Some(Secret::new(COMMAND_TOKEN)),
                decoy_redirect_url: Url::parse(DECOY).expect("decoy url"),
            }),
        };

        Self {
            _dir: dir,
            projects_path,
            cache,
            router: build_router(state),
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond")
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty()).expect("request should build"))
            .await
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

async fn text_body(response: Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

fn slugs(body: &Value) -> Vec<String> {
    body["projects"]
        .as_array()
        .expect("projects array")
        .iter()
        .map(|project| project["slug"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn projects_are_listed_with_server_timing() {
    let app = TestApp::new(ContentEnvironment::Production).await;

    let response = app.get("/projects", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let timing = response
        .headers()
        .get("server-timing")
        .and_then(|value| value.to_str().ok())
        .expect("server-timing header")
        .to_string();
    assert!(timing.contains("cache_content_data_projects"));
    assert!(timing.contains("getFreshValue_content_data_projects"));

    let body = json_body(response).await;
    assert_eq!(slugs(&body), vec!["ray-marcher", "synth"]);
}

#[tokio::test]
async fn project_detail_and_missing_slug() {
    let app = TestApp::new(ContentEnvironment::Production).await;

    let response = app.get("/projects/synth", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["project"]["title"], json!("Synth"));

    let response = app.get("/projects/unknown", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn fresh_parameter_requires_admin() {
    let app = TestApp::new(ContentEnvironment::Production).await;
    assert_eq!(app.get("/projects", None).await.status(), StatusCode::OK);

    tokio::fs::write(&app.projects_path, PROJECTS_V2)
        .await
        .expect("rewrite projects");

    let anonymous = json_body(app.get("/projects?fresh", None).await).await;
    assert_eq!(slugs(&anonymous), vec!["ray-marcher", "synth"]);

    let wrong_token = json_body(app.get("/projects?fresh", Some("nope")).await).await;
    assert_eq!(slugs(&wrong_token), vec!["ray-marcher", "synth"]);

    let admin = json_body(app.get("/projects?fresh", Some(ADMIN_TOKEN)).await).await;
    assert_eq!(slugs(&admin), vec!["only-one"]);
}

#[tokio::test]
async fn development_always_reloads_and_never_caches() {
    let app = TestApp::new(ContentEnvironment::Development).await;
    assert_eq!(app.get("/projects", None).await.status(), StatusCode::OK);

    tokio::fs::write(&app.projects_path, PROJECTS_V2)
        .await
        .expect("rewrite projects");
    let body = json_body(app.get("/projects", None).await).await;
    assert_eq!(slugs(&body), vec!["only-one"]);

    let keys = app.cache.list_keys(100).await.expect("keys");
    assert!(keys.sqlite.is_empty());
}

#[tokio::test]
async fn healthz_reports_durable_store() {
    let app = TestApp::new(ContentEnvironment::Production).await;
    assert_eq!(app.get("/healthz", None).await.status(), StatusCode::NO_CONTENT);

    app.cache.close().await;
    assert_eq!(
        app.get("/healthz", None).await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn admin_routes_are_hidden_from_anonymous_callers() {
    let app = TestApp::new(ContentEnvironment::Production).await;

    for uri in [
        "/cache/admin",
        "/cache/admin?query=content",
        "/resources/cache/sqlite/content:data:projects",
    ] {
        assert_eq!(app.get(uri, None).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            app.get(uri, Some(COMMAND_TOKEN)).await.status(),
            StatusCode::NOT_FOUND
        );
    }
}

#[tokio::test]
async fn admin_lists_and_searches_keys() {
    let app = TestApp::new(ContentEnvironment::Production).await;
    assert_eq!(app.get("/projects", None).await.status(), StatusCode::OK);

    let body = json_body(app.get("/cache/admin", Some(ADMIN_TOKEN)).await).await;
    assert_eq!(body["cacheKeys"]["sqlite"], json!([PROJECTS_KEY]));
    assert_eq!(body["cacheKeys"]["lru"], json!([]));

    let body = json_body(
        app.get("/cache/admin?query=talks&limit=10", Some(ADMIN_TOKEN))
            .await,
    )
    .await;
    assert_eq!(body["cacheKeys"]["sqlite"], json!([]));
}

#[tokio::test]
async fn admin_inspects_a_single_entry() {
    let app = TestApp::new(ContentEnvironment::Production).await;
    assert_eq!(app.get("/projects", None).await.status(), StatusCode::OK);

    let body = json_body(
        app.get(
            "/resources/cache/sqlite/content:data:projects",
            Some(ADMIN_TOKEN),
        )
        .await,
    )
    .await;
    assert_eq!(body["cacheKey"], json!(PROJECTS_KEY));
    assert_eq!(body["value"]["metadata"]["ttl"], json!(3_600_000));
    assert_eq!(body["value"]["metadata"]["swr"], json!(300_000));
    assert_eq!(body["value"]["value"][0]["slug"], json!("ray-marcher"));

    let body = json_body(
        app.get("/resources/cache/lru/content:data:projects", Some(ADMIN_TOKEN))
            .await,
    )
    .await;
    assert_eq!(body["value"], Value::Null);
}

#[tokio::test]
async fn admin_deletes_by_tier_and_rejects_unknown_tiers() {
    let app = TestApp::new(ContentEnvironment::Production).await;
    assert_eq!(app.get("/projects", None).await.status(), StatusCode::OK);

    let delete = |tier: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/cache/admin")
            .header(AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!(
                "cacheKey=content%3Adata%3Aprojects&type={tier}"
            )))
            .expect("request should build")
    };

    let response = app.send(delete("redis")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(text_body(response).await, "Unknown cache type: redis");

    let response = app.send(delete("sqlite")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "success": true }));

    let keys = app.cache.list_keys(100).await.expect("keys");
    assert!(keys.sqlite.is_empty());
}

#[tokio::test]
async fn remote_cache_commands_require_the_internal_token() {
    let app = TestApp::new(ContentEnvironment::Production).await;
    let command = |token: Option<&str>, body: Value| {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/resources/cache/sqlite")
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
            .body(Body::from(body.to_string()))
            .expect("request should build")
    };
    let entry = json!({
        "metadata": { "createdTime": 1, "ttl": null, "swr": null },
        "value": ["pushed"]
    });

    for token in [None, Some(ADMIN_TOKEN)] {
        let response = app
            .send(command(token, json!({ "key": "remote:key", "cacheValue": entry })))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok()),
            Some(DECOY)
        );
    }
    assert!(app.cache.list_keys(100).await.expect("keys").sqlite.is_empty());

    let response = app
        .send(command(
            Some(COMMAND_TOKEN),
            json!({ "key": "remote:key", "cacheValue": entry }),
        ))
        .await;
    assert_eq!(json_body(response).await, json!({ "success": true }));
    assert_eq!(
        app.cache.list_keys(100).await.expect("keys").sqlite,
        vec!["remote:key".to_string()]
    );

    let response = app
        .send(command(Some(COMMAND_TOKEN), json!({ "key": "remote:key" })))
        .await;
    assert_eq!(json_body(response).await, json!({ "success": true }));
    assert!(app.cache.list_keys(100).await.expect("keys").sqlite.is_empty());
}
