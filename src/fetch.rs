//! Authenticated requests to the OptiExtract API

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::multipart::Form;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::sleep;
use url::Url;

use optiextract_session::api::error_message;
use optiextract_session::{Notice, Notifier, SessionStore};

use crate::error::Error;
use crate::routes::{Navigator, Route};

enum RequestBody {
    Json(Vec<u8>),
    Multipart(Form),
}

/// A request against a path relative to the API base URL
///
/// Paths may contain `{name}` placeholders filled by [`ApiRequest::path_var`].
pub struct ApiRequest {
    method: Method,
    path: String,
    path_vars: HashMap<String, String>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<RequestBody>,
}

impl ApiRequest {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            path_vars: HashMap::new(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Fill a `{name}` placeholder in the path
    pub fn path_var(mut self, name: &str, value: impl ToString) -> Self {
        self.path_vars.insert(name.to_string(), value.to_string());
        self
    }

    /// Append a query parameter
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Add a header to the request; invalid names or values are skipped
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!("Skipping invalid header {}", name),
        }
        self
    }

    /// Add a JSON body to the request
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, Error> {
        self.body = Some(RequestBody::Json(serde_json::to_vec(body)?));
        Ok(self)
    }

    /// Send a multipart form instead of JSON
    pub fn multipart(mut self, form: Form) -> Self {
        self.body = Some(RequestBody::Multipart(form));
        self
    }

    fn resolved_path(&self) -> String {
        self.path_vars
            .iter()
            .fold(self.path.clone(), |acc, (name, value)| {
                acc.replace(&format!("{{{}}}", name), value)
            })
    }

    fn url(&self, base_url: &str) -> Result<Url, Error> {
        let mut url = Url::parse(&format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.resolved_path().trim_start_matches('/')
        ))?;

        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    fn build(self, client: &Client, base_url: &str, token: &str) -> Result<RequestBuilder, Error> {
        let url = self.url(base_url)?;
        let mut req = client
            .request(self.method, url)
            .headers(self.headers)
            .bearer_auth(token);

        match self.body {
            Some(RequestBody::Json(body)) => {
                req = req
                    .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                    .body(body);
            }
            Some(RequestBody::Multipart(form)) => {
                req = req.multipart(form);
            }
            None => {}
        }

        Ok(req)
    }
}

impl std::fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.resolved_path())
            .field("query", &self.query)
            .finish()
    }
}

/// Sends requests with the stored access token attached
///
/// A 401 from any endpoint means the backend no longer accepts the session:
/// the record is cleared, the user is told, and the app is sent to the
/// session-expired view.
#[derive(Clone)]
pub struct AuthedClient {
    base_url: String,
    http_client: Client,
    store: SessionStore,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    redirect_delay: Duration,
    expired_notice_duration: Duration,
}

impl AuthedClient {
    pub fn new(
        base_url: &str,
        http_client: Client,
        store: SessionStore,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            store,
            notifier,
            navigator,
            redirect_delay: Duration::from_secs(3),
            expired_notice_duration: Duration::from_secs(3),
        }
    }

    pub fn with_redirect_delay(mut self, value: Duration) -> Self {
        self.redirect_delay = value;
        self
    }

    pub fn with_expired_notice_duration(mut self, value: Duration) -> Self {
        self.expired_notice_duration = value;
        self
    }

    fn access_token(&self) -> Result<String, Error> {
        let record = self.store.load()?;
        record
            .and_then(|record| record.token)
            .filter(|token| !token.is_empty())
            .ok_or(Error::NotAuthenticated)
    }

    /// Execute the request and parse the response as JSON
    pub async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, Error> {
        let response = self.execute_raw(request).await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        Ok(response.json::<T>().await?)
    }

    /// Execute the request and return the raw response
    ///
    /// Only a 401 is turned into an error here; other statuses are left to
    /// the caller.
    pub async fn execute_raw(&self, request: ApiRequest) -> Result<Response, Error> {
        let token = self.access_token()?;
        debug!("{:?}", request);

        let response = request
            .build(&self.http_client, &self.base_url, &token)?
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.expire_session().await;
            return Err(Error::SessionExpired);
        }

        Ok(response)
    }

    async fn expire_session(&self) {
        warn!("Backend rejected the access token; ending session");
        if let Err(e) = self.store.clear() {
            warn!("Failed to clear session record: {}", e);
        }
        self.notifier
            .notify(Notice::session_expired(self.expired_notice_duration));

        if !self.redirect_delay.is_zero() {
            sleep(self.redirect_delay).await;
        }
        self.navigator.navigate(Route::SessionExpired);
    }
}

impl std::fmt::Debug for AuthedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthedClient")
            .field("base_url", &self.base_url)
            .field("store", &self.store)
            .finish()
    }
}
