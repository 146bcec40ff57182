//! Thin transport over the GitHub REST and GraphQL APIs.
//!
//! Every call is a single outbound request: no retries, no caching. A
//! non-2xx status becomes [`GitHubError::Http`], and a GraphQL payload that
//! carries an `errors` array becomes [`GitHubError::GraphQl`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT as USER_AGENT_HEADER};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;

use crate::error::GitHubError;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_GRAPHQL_URL: &str = "https://api.github.com/graphql";
pub const USER_AGENT: &str = concat!("mcp-github-sub-issues/", env!("CARGO_PKG_VERSION"));

const REST_ACCEPT: &str = "application/vnd.github.v3+json";

/// Projects V2 items attached to an issue, with enough project detail to
/// list them or match one by project node ID.
pub const PROJECT_ITEMS_QUERY: &str = r#"
query($owner: String!, $repo: String!, $issueNumber: Int!) {
  repository(owner: $owner, name: $repo) {
    issue(number: $issueNumber) {
      projectItems(first: 100) {
        nodes {
          id
          project {
            id
            title
            url
            number
          }
        }
      }
    }
  }
}
"#;

/// The operations tool handlers need from GitHub.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Whether calls carry a caller credential.
    fn has_credential(&self) -> bool;

    /// Issue one REST call against `path` (relative to the API base, may
    /// include a query string) and return the decoded JSON body.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, GitHubError>;

    /// Issue one GraphQL query and return its `data` field.
    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, GitHubError>;
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base: String,
    pub graphql_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            graphql_url: DEFAULT_GRAPHQL_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// reqwest-backed client. Cloning is cheap; the connection pool is shared.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    credential: Option<String>,
}

impl GitHubClient {
    pub fn new(config: ClientConfig) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            config: Arc::new(config),
            credential: None,
        })
    }

    /// A view of this client that sends `credential` on every call.
    pub fn with_credential(&self, credential: Option<String>) -> Self {
        Self {
            http: self.http.clone(),
            config: Arc::clone(&self.config),
            credential: credential.filter(|c| !c.is_empty()),
        }
    }

    fn rest_request(&self, method: Method, path: &str, body: Option<&Value>) -> RequestBuilder {
        let url = format!("{}{}", self.config.api_base.trim_end_matches('/'), path);
        let mut request = self
            .http
            .request(method, url)
            .header(USER_AGENT_HEADER, USER_AGENT)
            .header(ACCEPT, REST_ACCEPT);
        // REST accepts the `token` scheme
        if let Some(ref token) = self.credential {
            request = request.header(AUTHORIZATION, format!("token {}", token));
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request
    }

    fn graphql_request(&self, query: &str, variables: &Value) -> RequestBuilder {
        let mut request = self
            .http
            .post(&self.config.graphql_url)
            .header(USER_AGENT_HEADER, USER_AGENT)
            .json(&serde_json::json!({ "query": query, "variables": variables }));
        if let Some(ref token) = self.credential {
            request = request.header(AUTHORIZATION, format!("bearer {}", token));
        }
        request
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, GitHubError> {
        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        tracing::debug!(url = %response.url(), status = status.as_u16(), "GitHub response");

        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!(error = %e, "Failed to read GitHub error body");
                    String::new()
                }
            };
            return Err(GitHubError::Http {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(classify)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| GitHubError::Other(format!("Invalid JSON from GitHub: {}", e)))
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, GitHubError> {
        tracing::debug!(%method, path, "GitHub REST request");
        self.send(self.rest_request(method, path, body.as_ref())).await
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, GitHubError> {
        tracing::debug!("GitHub GraphQL request");
        let payload = self.send(self.graphql_request(query, &variables)).await?;
        graphql_data(payload)
    }
}

fn classify(e: reqwest::Error) -> GitHubError {
    if e.is_timeout() {
        GitHubError::Timeout(e.url().map(|u| u.to_string()).unwrap_or_default())
    } else {
        GitHubError::Request(e)
    }
}

/// Unwrap a GraphQL response envelope into its `data` field.
fn graphql_data(payload: Value) -> Result<Value, GitHubError> {
    if let Some(errors) = payload.get("errors").and_then(|e| e.as_array()) {
        if !errors.is_empty() {
            return Err(GitHubError::GraphQl(errors.clone()));
        }
    }
    match payload {
        Value::Object(mut map) => Ok(map.remove("data").unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    }
}
