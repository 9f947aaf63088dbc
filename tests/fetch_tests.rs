use std::sync::{Arc, Mutex};
use std::time::Duration;

use optiextract_client::error::Error;
use optiextract_client::fetch::{ApiRequest, AuthedClient};
use optiextract_client::profile::{ProfileCache, UserProfile};
use optiextract_client::routes::{RecordingNavigator, Route};
use optiextract_client::session::{
    KeyValueStore, MemoryStore, Notice, NoticeLevel, Notifier, SessionRecord, SessionStore,
};
use reqwest::multipart::Form;
use serde_json::json;
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct Notices(Mutex<Vec<Notice>>);

impl Notifier for Notices {
    fn notify(&self, notice: Notice) {
        self.0.lock().unwrap().push(notice);
    }
}

struct Setup {
    client: AuthedClient,
    backend: Arc<MemoryStore>,
    navigator: Arc<RecordingNavigator>,
    notices: Arc<Notices>,
}

fn setup(server: &MockServer, token: Option<&str>) -> Setup {
    let backend = Arc::new(MemoryStore::new());
    let store = SessionStore::new(backend.clone());
    if let Some(token) = token {
        store.save(&SessionRecord::new(token, "R1")).unwrap();
    }
    let navigator = Arc::new(RecordingNavigator::new());
    let notices = Arc::new(Notices::default());
    let client = AuthedClient::new(
        &server.uri(),
        reqwest::Client::new(),
        store,
        notices.clone(),
        navigator.clone(),
    )
    .with_redirect_delay(Duration::from_millis(5));

    Setup {
        client,
        backend,
        navigator,
        notices,
    }
}

#[tokio::test]
async fn test_attaches_bearer_and_json_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/templates/7/fields"))
        .and(header("Authorization", "Bearer T1"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(json!({ "name": "invoice_number" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 3 })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let s = setup(&mock_server, Some("T1"));
    let request = ApiRequest::post("templates/{id}/fields")
        .path_var("id", 7)
        .json(&json!({ "name": "invoice_number" }))
        .unwrap();

    let created: serde_json::Value = s.client.execute(request).await.unwrap();
    assert_eq!(created, json!({ "id": 3 }));
}

#[tokio::test]
async fn test_query_parameters() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/documents"))
        .and(query_param("status", "parsed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let s = setup(&mock_server, Some("T1"));
    let docs: Vec<serde_json::Value> = s
        .client
        .execute(ApiRequest::get("documents").query("status", "parsed"))
        .await
        .unwrap();
    assert!(docs.is_empty());
}

#[tokio::test]
async fn test_multipart_upload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/documents/upload"))
        .and(header_exists("Content-Type"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "task_id": "abc" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let s = setup(&mock_server, Some("T1"));
    let form = Form::new().text("template_id", "7");
    let response: serde_json::Value = s
        .client
        .execute(ApiRequest::post("documents/upload").multipart(form))
        .await
        .unwrap();
    assert_eq!(response["task_id"], "abc");
}

#[tokio::test]
async fn test_unauthorized_ends_the_session() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/documents"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "expired" })))
        .mount(&mock_server)
        .await;

    let s = setup(&mock_server, Some("T1"));

    let result = s
        .client
        .execute::<serde_json::Value>(ApiRequest::get("documents"))
        .await;

    assert!(matches!(result, Err(Error::SessionExpired)));
    assert_eq!(s.backend.get("appData").unwrap(), None);
    assert_eq!(s.navigator.history(), vec![Route::SessionExpired]);

    let notices = s.notices.0.lock().unwrap().clone();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
}

#[tokio::test]
async fn test_other_errors_keep_the_session() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/templates/9"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "message": "Not your template" })),
        )
        .mount(&mock_server)
        .await;

    let s = setup(&mock_server, Some("T1"));
    let result = s
        .client
        .execute::<serde_json::Value>(ApiRequest::delete("templates/9"))
        .await;

    match result {
        Err(Error::Api { status, message }) => {
            assert_eq!(status, 403);
            assert_eq!(message, "Not your template");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(s.backend.get("appData").unwrap().is_some());
    assert!(s.navigator.history().is_empty());
}

#[tokio::test]
async fn test_no_token_sends_nothing() {
    let mock_server = MockServer::start().await;
    let s = setup(&mock_server, None);

    let result = s
        .client
        .execute::<serde_json::Value>(ApiRequest::get("documents"))
        .await;

    assert!(matches!(result, Err(Error::NotAuthenticated)));
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_profile_is_fetched_once_then_cached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/me"))
        .and(header("Authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "first_name": "Ada",
            "last_name": "Lovelace",
            "email": "ada@example.com",
            "company_id": 4,
            "company_name": "Analytical Engines"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let s = setup(&mock_server, Some("T1"));
    let cache = ProfileCache::new(s.client.clone(), s.backend.clone(), "userProfile", "users/me");
    assert_eq!(cache.cached(), None);

    let first = cache.current().await.unwrap();
    let second = cache.current().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        first,
        UserProfile {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            company_id: Some(4),
            company_name: Some("Analytical Engines".to_string()),
        }
    );
    assert_eq!(first.full_name(), "Ada Lovelace");

    cache.clear().unwrap();
    assert_eq!(cache.cached(), None);
}
