use rmcp::model::ErrorData;

#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("GitHub API error: {status} {status_text}{}", body_suffix(.body))]
    Http {
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("GraphQL errors: {}", serde_json::Value::Array(.0.clone()))]
    GraphQl(Vec<serde_json::Value>),

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Other(String),
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" - {}", body)
    }
}

impl GitHubError {
    /// True for the 404-class conditions: HTTP 404, or a GraphQL response
    /// whose errors are all `NOT_FOUND`.
    pub fn is_not_found(&self) -> bool {
        match self {
            GitHubError::Http { status, .. } => *status == 404,
            GitHubError::GraphQl(errors) => {
                !errors.is_empty()
                    && errors.iter().all(|e| {
                        e.get("type").and_then(|t| t.as_str()) == Some("NOT_FOUND")
                    })
            }
            _ => false,
        }
    }

    pub fn to_mcp_error(&self) -> ErrorData {
        match self {
            GitHubError::Validation(_) => ErrorData::invalid_params(self.to_string(), None),
            GitHubError::Http { .. }
            | GitHubError::GraphQl(_)
            | GitHubError::Timeout(_)
            | GitHubError::Request(_)
            | GitHubError::Other(_) => ErrorData::internal_error(self.to_string(), None),
        }
    }
}

/// Render an error as the failure text of a single batch item.
///
/// HTTP failures carry status, status text and the response body verbatim.
pub fn describe_failure(err: &GitHubError) -> String {
    let text = match err {
        GitHubError::Http {
            status,
            status_text,
            body,
        } => format!("{} {}{}", status, status_text, body_suffix(body)),
        other => other.to_string(),
    };
    if text.trim().is_empty() {
        "Unknown error".to_string()
    } else {
        text
    }
}
