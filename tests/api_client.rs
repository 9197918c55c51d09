//! ApiClient against an in-process axum backend.

use axum::extract::{Json, Path};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use issuedesk::config::ServerConfig;
use issuedesk::errors::ClientError;
use issuedesk::ApiClient;
use issuedesk_common::{MessageRole, Repository};
use serde_json::{Value, json};
use tokio::net::TcpListener;

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/api", addr)
}

fn client(base: &str, token: Option<&str>) -> ApiClient {
    let config = ServerConfig {
        api_url: base.to_string(),
        ..ServerConfig::default()
    };
    ApiClient::new(&config, token.map(str::to_string)).unwrap()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let router = Router::new().route(
        "/api/auth/profile",
        get(|headers: HeaderMap| async move {
            match bearer(&headers).as_deref() {
                Some("secret") => (StatusCode::OK, Json(json!({ "login": "octocat" }))),
                _ => (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "no token" }))),
            }
        }),
    );
    let base = serve(router).await;

    let profile = client(&base, Some("secret")).profile().await.unwrap();
    assert_eq!(profile.login, "octocat");

    let err = client(&base, None).profile().await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_error_body_message_is_surfaced() {
    let router = Router::new()
        .route(
            "/api/sessions",
            get(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "database unavailable" })),
                )
            }),
        )
        .route(
            "/api/repos",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream timed out") }),
        );
    let base = serve(router).await;
    let api = client(&base, Some("t"));

    match api.list_sessions().await.unwrap_err() {
        ClientError::Status { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "database unavailable");
        }
        other => panic!("unexpected error {:?}", other),
    }
    match api.list_repos().await.unwrap_err() {
        ClientError::Status { status, message } => {
            assert_eq!(status, 502);
            assert_eq!(message, "upstream timed out");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_resource_is_not_found() {
    let base = serve(Router::new()).await;
    let err = client(&base, Some("t")).get_session("nope").await.unwrap_err();
    assert!(matches!(err, ClientError::NotFound { .. }));
}

#[tokio::test]
async fn test_send_message_posts_content_and_client_id() {
    let router = Router::new().route(
        "/api/sessions/{id}/messages",
        post(|Path(id): Path<String>, Json(body): Json<Value>| async move {
            Json(json!({
                "id": "m-42",
                "session_id": id,
                "role": "user",
                "content": body["content"],
                "timestamp": "2026-03-01T12:00:00Z",
                "client_id": body["client_id"],
            }))
        }),
    );
    let base = serve(router).await;

    let msg = client(&base, Some("t"))
        .send_message("s1", "hello there", "c-1")
        .await
        .unwrap();
    assert_eq!(msg.id, "m-42");
    assert_eq!(msg.session_id, "s1");
    assert_eq!(msg.role, MessageRole::User);
    assert_eq!(msg.content, "hello there");
    assert_eq!(msg.client_id.as_deref(), Some("c-1"));
}

#[tokio::test]
async fn test_session_id_with_reserved_characters_stays_one_segment() {
    let router = Router::new().route(
        "/api/sessions/{id}/messages",
        get(|Path(id): Path<String>| async move {
            Json(json!([{
                "id": "m-1",
                "session_id": id,
                "role": "assistant",
                "content": "hi",
                "timestamp": "2026-03-01T12:00:00Z",
            }]))
        }),
    );
    let base = serve(router).await;

    let messages = client(&base, Some("t"))
        .list_messages("team/s 1?x=2")
        .await
        .unwrap();
    assert_eq!(messages[0].session_id, "team/s 1?x=2");
}

#[tokio::test]
async fn test_create_session_sends_repository() {
    let router = Router::new().route(
        "/api/sessions",
        post(|Json(body): Json<Value>| async move {
            Json(json!({
                "id": "s-new",
                "repository": body["repository"],
                "title": body["title"],
                "created_at": "2026-03-01T12:00:00Z",
                "updated_at": "2026-03-01T12:00:00Z",
            }))
        }),
    );
    let base = serve(router).await;

    let repo = Repository::parse("octo/widgets@dev", "main").unwrap();
    let session = client(&base, Some("t"))
        .create_session(&repo, Some("Flaky login"))
        .await
        .unwrap();
    assert_eq!(session.id, "s-new");
    assert_eq!(session.repository, repo);
    assert_eq!(session.title.as_deref(), Some("Flaky login"));
    assert_eq!(session.statistics.message_count, 0);
}

#[tokio::test]
async fn test_create_issue_flag_reaches_backend() {
    let router = Router::new().route(
        "/api/sessions/{id}/issues",
        post(|Json(body): Json<Value>| async move {
            let pushed = body["create_github_issue"].as_bool().unwrap_or(false);
            Json(json!({
                "title": "Login fails on Safari",
                "body": "Steps...",
                "labels": ["bug"],
                "github_issue_number": if pushed { json!(17) } else { Value::Null },
            }))
        }),
    );
    let base = serve(router).await;
    let api = client(&base, Some("t"));

    let draft = api.create_issue("s1", false).await.unwrap();
    assert_eq!(draft.github_issue_number, None);
    let pushed = api.create_issue("s1", true).await.unwrap();
    assert_eq!(pushed.github_issue_number, Some(17));
    assert_eq!(pushed.labels, vec!["bug".to_string()]);
}
