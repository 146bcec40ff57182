use axum::http::request::Parts;
use axum::http::HeaderMap;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::service::RequestContext;
use rmcp::{tool, tool_handler, tool_router, RoleServer, ServerHandler};

use crate::error::GitHubError;
use crate::github::GitHubClient;
use crate::tools::{
    self, AddSubIssuesParams, IssueNumbersParams, IssueParams, ListSubIssuesParams,
    ProjectItemParams, RemoveSubIssuesParams, SetMilestoneParams,
};

/// Header carrying the caller's GitHub token on the HTTP transport.
pub const TOKEN_HEADER: &str = "x-github-token";

#[derive(Clone)]
pub struct SubIssuesServer {
    github: GitHubClient,
    default_token: Option<String>,
    batch_concurrency: usize,
    tool_router: ToolRouter<Self>,
}

impl SubIssuesServer {
    pub fn new(
        github: GitHubClient,
        default_token: Option<String>,
        batch_concurrency: usize,
    ) -> Self {
        Self {
            github,
            default_token,
            batch_concurrency,
            tool_router: Self::tool_router(),
        }
    }

    /// Credential for one invocation: the request's `X-GITHUB-TOKEN` header
    /// when served over HTTP, otherwise the configured token.
    fn resolve_credential(&self, headers: Option<&HeaderMap>) -> Option<String> {
        headers
            .and_then(token_from_headers)
            .or_else(|| self.default_token.clone())
    }

    /// Credential from the HTTP request parts rmcp attaches to each call.
    fn credential_from_extensions(&self, extensions: &Extensions) -> Option<String> {
        let headers = extensions.get::<Parts>().map(|parts| &parts.headers);
        self.resolve_credential(headers)
    }

    fn client(&self, context: &RequestContext<RoleServer>) -> GitHubClient {
        self.github
            .with_credential(self.credential_from_extensions(&context.extensions))
    }
}

fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

/// Turn a tool outcome into the MCP response. Validation problems come back
/// as error-flagged text; upstream failures are fatal for the call.
fn render(tool: &str, result: Result<String, GitHubError>) -> Result<CallToolResult, ErrorData> {
    match result {
        Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
        Err(GitHubError::Validation(message)) => {
            Ok(CallToolResult::error(vec![Content::text(message)]))
        }
        Err(e) => {
            tracing::error!(tool, error = %e, "Tool call failed");
            Err(e.to_mcp_error())
        }
    }
}

// -- MCP tool handlers (thin wrappers over crate::tools) --

#[tool_router]
impl SubIssuesServer {
    #[tool(
        name = "get_id_of_issue",
        description = "Get the internal GitHub issue ID from an issue number"
    )]
    async fn get_id_of_issue(
        &self,
        Parameters(params): Parameters<IssueParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let api = self.client(&context);
        render(
            "get_id_of_issue",
            tools::get_id_of_issue(&api, &params).await,
        )
    }

    #[tool(
        name = "get_ids_of_issues",
        description = "Get the internal GitHub issue IDs from multiple issue numbers. Supports batch processing for efficiency."
    )]
    async fn get_ids_of_issues(
        &self,
        Parameters(params): Parameters<IssueNumbersParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let api = self.client(&context);
        render(
            "get_ids_of_issues",
            tools::get_ids_of_issues(&api, &params, self.batch_concurrency).await,
        )
    }

    #[tool(
        name = "get_parent_of_sub_issue",
        description = "Get the parent issue of a sub-issue using GitHub Sub-Issues API"
    )]
    async fn get_parent_of_sub_issue(
        &self,
        Parameters(params): Parameters<IssueParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let api = self.client(&context);
        render(
            "get_parent_of_sub_issue",
            tools::get_parent_of_sub_issue(&api, &params).await,
        )
    }

    #[tool(
        name = "list_sub_issues",
        description = "List sub-issues for a GitHub issue with pagination and filtering support"
    )]
    async fn list_sub_issues(
        &self,
        Parameters(params): Parameters<ListSubIssuesParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let api = self.client(&context);
        render(
            "list_sub_issues",
            tools::list_sub_issues(&api, &params).await,
        )
    }

    #[tool(
        name = "add_sub_issues",
        description = "Add multiple sub-issues to a GitHub issue using GitHub Sub-Issues API. Supports batch processing for efficiency."
    )]
    async fn add_sub_issues(
        &self,
        Parameters(params): Parameters<AddSubIssuesParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let api = self.client(&context);
        render(
            "add_sub_issues",
            tools::add_sub_issues(&api, &params, self.batch_concurrency).await,
        )
    }

    #[tool(
        name = "remove_sub_issues",
        description = "Remove multiple sub-issues from a GitHub issue using GitHub Sub-Issues API. Supports batch processing for efficiency."
    )]
    async fn remove_sub_issues(
        &self,
        Parameters(params): Parameters<RemoveSubIssuesParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let api = self.client(&context);
        render(
            "remove_sub_issues",
            tools::remove_sub_issues(&api, &params, self.batch_concurrency).await,
        )
    }

    #[tool(
        name = "set_milestone_for_issues",
        description = "Set milestone for multiple GitHub issues, or pass null to remove it. Supports batch processing for efficiency."
    )]
    async fn set_milestone_for_issues(
        &self,
        Parameters(params): Parameters<SetMilestoneParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let api = self.client(&context);
        render(
            "set_milestone_for_issues",
            tools::set_milestone_for_issues(&api, &params, self.batch_concurrency).await,
        )
    }

    #[tool(
        name = "list_projects_for_issue",
        description = "List all GitHub Projects V2 associated with an issue. Requires a GitHub token."
    )]
    async fn list_projects_for_issue(
        &self,
        Parameters(params): Parameters<IssueParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let api = self.client(&context);
        render(
            "list_projects_for_issue",
            tools::list_projects_for_issue(&api, &params).await,
        )
    }

    #[tool(
        name = "get_project_item_id",
        description = "Get the Project V2 item ID for an issue in a specific project. Requires a GitHub token."
    )]
    async fn get_project_item_id(
        &self,
        Parameters(params): Parameters<ProjectItemParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let api = self.client(&context);
        render(
            "get_project_item_id",
            tools::get_project_item_id(&api, &params).await,
        )
    }
}

#[tool_handler]
impl ServerHandler for SubIssuesServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "mcp-github-sub-issues".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "GitHub sub-issues server. Use get_id_of_issue/get_ids_of_issues to turn issue \
                 numbers into the internal IDs that add_sub_issues and remove_sub_issues expect, \
                 list_sub_issues and get_parent_of_sub_issue to inspect the hierarchy, \
                 set_milestone_for_issues to set or clear milestones, and \
                 list_projects_for_issue/get_project_item_id for Projects V2 (token required)."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::ClientConfig;
    use axum::http::HeaderValue;

    fn make_server(default_token: Option<&str>) -> SubIssuesServer {
        let github = GitHubClient::new(ClientConfig::default()).unwrap();
        SubIssuesServer::new(github, default_token.map(String::from), 1)
    }

    fn headers_with_token(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, HeaderValue::from_str(token).unwrap());
        headers
    }

    #[test]
    fn test_credential_from_header() {
        let server = make_server(None);
        let headers = headers_with_token("ghp_header");
        assert_eq!(
            server.resolve_credential(Some(&headers)).as_deref(),
            Some("ghp_header")
        );
    }

    #[test]
    fn test_header_overrides_default_token() {
        let server = make_server(Some("ghp_default"));
        let headers = headers_with_token("ghp_header");
        assert_eq!(
            server.resolve_credential(Some(&headers)).as_deref(),
            Some("ghp_header")
        );
    }

    #[test]
    fn test_default_token_without_header() {
        let server = make_server(Some("ghp_default"));
        assert_eq!(server.resolve_credential(None).as_deref(), Some("ghp_default"));
        let empty = HeaderMap::new();
        assert_eq!(
            server.resolve_credential(Some(&empty)).as_deref(),
            Some("ghp_default")
        );
    }

    #[test]
    fn test_blank_header_is_ignored() {
        let server = make_server(None);
        let headers = headers_with_token("   ");
        assert_eq!(server.resolve_credential(Some(&headers)), None);
    }

    fn request_parts(token: Option<&str>) -> Parts {
        let mut builder = axum::http::Request::builder().uri("/mcp");
        if let Some(token) = token {
            builder = builder.header("X-GITHUB-TOKEN", token);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_credential_from_request_parts() {
        let server = make_server(Some("ghp_default"));

        let mut extensions = Extensions::new();
        extensions.insert(request_parts(Some("ghp_header")));
        assert_eq!(
            server.credential_from_extensions(&extensions).as_deref(),
            Some("ghp_header")
        );

        let mut extensions = Extensions::new();
        extensions.insert(request_parts(None));
        assert_eq!(
            server.credential_from_extensions(&extensions).as_deref(),
            Some("ghp_default")
        );
    }

    #[test]
    fn test_stdio_call_without_parts_uses_default_token() {
        let server = make_server(Some("ghp_default"));
        assert_eq!(
            server.credential_from_extensions(&Extensions::new()).as_deref(),
            Some("ghp_default")
        );
        let anonymous = make_server(None);
        assert_eq!(anonymous.credential_from_extensions(&Extensions::new()), None);
    }

    #[test]
    fn test_render_success_and_validation() {
        let ok = render("t", Ok("done".to_string())).unwrap();
        assert_ne!(ok.is_error, Some(true));

        let invalid = render(
            "t",
            Err(GitHubError::Validation("Error: owner must not be empty".to_string())),
        )
        .unwrap();
        assert_eq!(invalid.is_error, Some(true));
    }

    #[test]
    fn test_render_upstream_failure_is_fatal() {
        let err = render(
            "t",
            Err(GitHubError::Http {
                status: 500,
                status_text: "Internal Server Error".to_string(),
                body: String::new(),
            }),
        )
        .unwrap_err();
        assert!(err.message.contains("500"));
    }

    #[test]
    fn test_server_info() {
        let server = make_server(None);
        let info = server.get_info();
        assert_eq!(info.server_info.name, "mcp-github-sub-issues");
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.is_some());
    }

    #[test]
    fn test_all_tools_registered() {
        let server = make_server(None);
        let names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        for name in [
            "get_id_of_issue",
            "get_ids_of_issues",
            "get_parent_of_sub_issue",
            "list_sub_issues",
            "add_sub_issues",
            "remove_sub_issues",
            "set_milestone_for_issues",
            "list_projects_for_issue",
            "get_project_item_id",
        ] {
            assert!(names.iter().any(|n| n == name), "missing tool {}", name);
        }
        assert_eq!(names.len(), 9);
    }
}
