//! Client for the backend's auth endpoints

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::{Result, SessionError, FALLBACK_ERROR_MESSAGE};

/// Relative paths of the auth endpoints
#[derive(Debug, Clone)]
pub struct AuthPaths {
    pub login: String,
    pub refresh: String,
    pub sign_up: String,
    pub verify_email: String,
    pub reset_password: String,
}

impl Default for AuthPaths {
    fn default() -> Self {
        Self {
            login: "auth/login".to_string(),
            refresh: "auth/refresh".to_string(),
            sign_up: "auth/signup".to_string(),
            verify_email: "auth/verify-email".to_string(),
            reset_password: "auth/reset-password".to_string(),
        }
    }
}

/// Tokens returned by a successful refresh
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RefreshedTokens {
    #[serde(alias = "token")]
    pub access_token: String,

    /// Present only when the backend rotated the refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Tokens returned by a successful login
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Registration form
#[derive(Debug, Clone, Serialize)]
pub struct SignUpRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub password: String,
    #[serde(skip)]
    pub confirm_password: String,
    pub company_id: Option<i64>,
}

impl SignUpRequest {
    /// Checks the form before it is sent
    pub fn validate(&self) -> Result<()> {
        if self.password != self.confirm_password {
            return Err(SessionError::validation("Passwords do not match."));
        }
        if self.phone_number.len() != 10 || !self.phone_number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SessionError::validation(
                "Phone number must be exactly 10 digits and contain only numbers.",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: Option<String>,
}

/// Anything that can trade a refresh token for new tokens
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens>;
}

/// Auth API client
#[derive(Debug, Clone)]
pub struct AuthApi {
    base_url: String,
    http_client: Client,
    paths: AuthPaths,
}

impl AuthApi {
    pub fn new(base_url: &str, http_client: Client, paths: AuthPaths) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            paths,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn paths(&self) -> &AuthPaths {
        &self.paths
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/{}",
            self.base_url,
            path.trim_start_matches('/')
        ))?)
    }

    /// メール・パスワードでログイン
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginTokens> {
        let url = self.endpoint(&self.paths.login)?;

        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });

        let response = self.http_client.post(url).json(&payload).send().await?;
        let response = ensure_success(response).await?;

        Ok(response.json().await?)
    }

    /// ユーザー登録
    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<Option<String>> {
        request.validate()?;
        let url = self.endpoint(&self.paths.sign_up)?;

        let response = self.http_client.post(url).json(request).send().await?;
        let response = ensure_success(response).await?;

        let body: MessageResponse = response.json().await?;
        Ok(body.message)
    }

    /// Confirm an email address with the token from the verification link
    pub async fn verify_email(&self, token: &str) -> Result<()> {
        if token.is_empty() {
            return Err(SessionError::validation("Missing token."));
        }
        let url = self.endpoint(&self.paths.verify_email)?;

        let response = self
            .http_client
            .get(url)
            .query(&[("token", token)])
            .send()
            .await?;
        ensure_success(response).await?;

        Ok(())
    }

    /// パスワードリセット
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<String> {
        if token.is_empty() {
            return Err(SessionError::validation(
                "No reset token found. Please use the link from your email.",
            ));
        }
        if new_password.chars().count() < 8 {
            return Err(SessionError::validation(
                "New password must be at least 8 characters long.",
            ));
        }
        if new_password != confirm_password {
            return Err(SessionError::validation("Passwords do not match."));
        }

        let url = self.endpoint(&self.paths.reset_password)?;
        let payload = serde_json::json!({
            "token": token,
            "new_password": new_password,
        });

        let response = self.http_client.post(url).json(&payload).send().await?;
        let response = ensure_success(response).await?;

        let body: MessageResponse = response.json().await.unwrap_or(MessageResponse { message: None });
        Ok(body
            .message
            .unwrap_or_else(|| "Your password has been successfully reset!".to_string()))
    }
}

#[async_trait]
impl TokenRefresher for AuthApi {
    /// セッションをリフレッシュ
    ///
    /// The refresh token travels only in the `Authorization` header. A 401
    /// here is the normal "refresh token is dead too" answer and is reported
    /// as [`SessionError::Rejected`] like any other non-2xx status.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens> {
        let url = self.endpoint(&self.paths.refresh)?;
        debug!("Refreshing access token via {}", url);

        let response = self
            .http_client
            .post(url)
            .bearer_auth(refresh_token)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        Ok(response.json().await?)
    }
}

/// Turn a non-2xx response into [`SessionError::Rejected`]
pub async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    warn!("Request failed with status {}: {}", status, message);

    Err(SessionError::Rejected {
        status: status.as_u16(),
        message,
    })
}

/// Human-readable message from an error body
///
/// Looks at `detail` (string, or the first `msg` of a validation list),
/// then `message`, then a bare JSON string.
pub fn error_message(body: &str) -> String {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return FALLBACK_ERROR_MESSAGE.to_string(),
    };

    let from_detail = match value.get("detail") {
        Some(Value::String(detail)) => Some(detail.clone()),
        Some(Value::Array(items)) => items
            .iter()
            .find_map(|item| item.get("msg").and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    };

    from_detail
        .or_else(|| {
            value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .or_else(|| value.as_str().map(str::to_string))
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> AuthApi {
        AuthApi::new(&server.uri(), Client::new(), AuthPaths::default())
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"detail":"Invalid token"}"#), "Invalid token");
        assert_eq!(error_message(r#"{"message":"Nope"}"#), "Nope");
        assert_eq!(
            error_message(r#"{"detail":[{"loc":["body"],"msg":"field required"}]}"#),
            "field required"
        );
        assert_eq!(error_message(r#""plain""#), "plain");
        assert_eq!(error_message(""), FALLBACK_ERROR_MESSAGE);
        assert_eq!(error_message("<html>"), FALLBACK_ERROR_MESSAGE);
        assert_eq!(error_message(r#"{"detail":""}"#), FALLBACK_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_refresh_sends_bearer_and_no_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(header("Authorization", "Bearer R1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "T2"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let tokens = api(&mock_server).refresh("R1").await.unwrap();
        assert_eq!(tokens.access_token, "T2");
        assert_eq!(tokens.refresh_token, None);

        let requests = mock_server.received_requests().await.unwrap();
        assert!(requests[0].body.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_accepts_legacy_token_field() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "T2" })))
            .mount(&mock_server)
            .await;

        let tokens = api(&mock_server).refresh("R1").await.unwrap();
        assert_eq!(tokens.access_token, "T2");
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "detail": "Token expired" })),
            )
            .mount(&mock_server)
            .await;

        match api(&mock_server).refresh("R1").await {
            Err(SessionError::Rejected { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Token expired");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_login() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({ "email": "a@example.com", "password": "pw" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "T1",
                "refresh_token": "R1",
                "token_type": "bearer"
            })))
            .mount(&mock_server)
            .await;

        let tokens = api(&mock_server).login("a@example.com", "pw").await.unwrap();
        assert_eq!(tokens.access_token, "T1");
        assert_eq!(tokens.refresh_token, "R1");
    }

    #[tokio::test]
    async fn test_sign_up_validates_before_sending() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/signup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Check your inbox"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut request = SignUpRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone_number: "12345".to_string(),
            password: "secret123".to_string(),
            confirm_password: "secret123".to_string(),
            company_id: None,
        };
        let client = api(&mock_server);

        assert!(matches!(
            client.sign_up(&request).await,
            Err(SessionError::Validation(_))
        ));

        request.phone_number = "0123456789".to_string();
        request.confirm_password = "different".to_string();
        assert!(matches!(
            client.sign_up(&request).await,
            Err(SessionError::Validation(_))
        ));

        request.confirm_password = "secret123".to_string();
        let message = client.sign_up(&request).await.unwrap();
        assert_eq!(message.as_deref(), Some("Check your inbox"));

        let requests = mock_server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(sent.get("confirm_password").is_none());
        assert_eq!(sent["company_id"], Value::Null);
    }

    #[tokio::test]
    async fn test_verify_email_passes_token_as_query() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/auth/verify-email"))
            .and(query_param("token", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&mock_server)
            .await;

        api(&mock_server).verify_email("abc").await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_password() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/reset-password"))
            .and(body_json(json!({ "token": "tok", "new_password": "longenough" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&mock_server)
            .await;

        let client = api(&mock_server);
        assert!(client.reset_password("tok", "short", "short").await.is_err());
        assert!(client
            .reset_password("tok", "longenough", "different")
            .await
            .is_err());

        let message = client
            .reset_password("tok", "longenough", "longenough")
            .await
            .unwrap();
        assert_eq!(message, "Your password has been successfully reset!");
    }
}
