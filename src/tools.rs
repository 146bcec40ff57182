//! Tool argument types and the operations behind each tool.
//!
//! Every operation is generic over [`GitHubApi`] and returns the text that
//! goes back to the caller. Only 404-class failures of single-item lookups
//! are turned into text here; everything else propagates.

use reqwest::Method;
use rmcp::schemars;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::batch::{run_batch, summarize, SummaryContext};
use crate::error::GitHubError;
use crate::github::{GitHubApi, PROJECT_ITEMS_QUERY};

pub const NO_ISSUE_NUMBERS: &str =
    "Error: No issue numbers provided. Please provide at least one issue number.";
pub const NO_SUB_ISSUE_IDS: &str =
    "Error: No sub-issue IDs provided. Please provide at least one sub-issue ID.";
pub const TOKEN_REQUIRED: &str = "Error: GitHub token is required for Projects V2 API access. \
                                  Please provide X-GITHUB-TOKEN header.";

const BATCH_OPERATION: &str = "Batch operation";

// -- Tool parameter types --

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct IssueParams {
    #[schemars(description = "Repository owner (username or organization)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Issue number")]
    pub issue_number: u64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct IssueNumbersParams {
    #[schemars(description = "Repository owner (username or organization)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Array of issue numbers")]
    #[serde(default)]
    pub issue_numbers: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SubIssueState {
    Open,
    Closed,
    All,
}

impl SubIssueState {
    fn as_str(self) -> &'static str {
        match self {
            SubIssueState::Open => "open",
            SubIssueState::Closed => "closed",
            SubIssueState::All => "all",
        }
    }
}

fn default_per_page() -> u32 {
    30
}

fn default_page() -> u32 {
    1
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListSubIssuesParams {
    #[schemars(description = "Repository owner (username or organization)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Parent issue number to list sub-issues for")]
    pub issue_number: u64,

    #[schemars(description = "Number of results per page (max 100, default 30)")]
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    #[schemars(description = "Page number of results to fetch (default 1)")]
    #[serde(default = "default_page")]
    pub page: u32,

    #[schemars(description = "Filter sub-issues by state: open, closed, or all")]
    #[serde(default)]
    pub state: Option<SubIssueState>,

    #[schemars(description = "Comma-separated list of label names to filter by")]
    #[serde(default)]
    pub labels: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AddSubIssuesParams {
    #[schemars(description = "Repository owner (username or organization)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Parent issue number to add sub-issues to")]
    pub issue_number: u64,

    #[schemars(
        description = "Array of sub-issue IDs to add. These must be internal GitHub issue IDs, not issue numbers."
    )]
    #[serde(default)]
    pub sub_issue_ids: Vec<u64>,

    #[schemars(description = "When true, replaces the current parent issue for each sub-issue")]
    #[serde(default)]
    pub replace_parent: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RemoveSubIssuesParams {
    #[schemars(description = "Repository owner (username or organization)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Parent issue number to remove sub-issues from")]
    pub issue_number: u64,

    #[schemars(
        description = "Array of sub-issue IDs to remove. These must be internal GitHub issue IDs, not issue numbers."
    )]
    #[serde(default)]
    pub sub_issue_ids: Vec<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SetMilestoneParams {
    #[schemars(description = "Repository owner (username or organization)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Array of issue numbers to update")]
    #[serde(default)]
    pub issue_numbers: Vec<u64>,

    #[schemars(description = "Milestone number to set, or null to remove the milestone")]
    pub milestone_number: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ProjectItemParams {
    #[schemars(description = "Repository owner (username or organization)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Issue number")]
    pub issue_number: u64,

    #[schemars(
        description = "Project node ID (e.g. 'PVT_kwDOAbc123'); use list_projects_for_issue to find it"
    )]
    pub project_id: String,
}

// -- Validation helpers --

/// Validate that a GitHub owner/repo name doesn't contain characters that
/// could be used for URL injection in API routes.
fn sanitize_github_name(name: &str, field: &str) -> Result<(), GitHubError> {
    if name.is_empty() {
        return Err(GitHubError::Validation(format!(
            "Error: {} must not be empty",
            field
        )));
    }
    for ch in ['/', '?', '#', '%', '\0', ' ', '\n', '\t'] {
        if name.contains(ch) {
            return Err(GitHubError::Validation(format!(
                "Error: {} contains invalid character '{}'",
                field,
                ch.escape_default()
            )));
        }
    }
    Ok(())
}

fn check_repo(owner: &str, repo: &str) -> Result<(), GitHubError> {
    sanitize_github_name(owner, "owner")?;
    sanitize_github_name(repo, "repo")
}

/// Render a JSON field for display: strings unquoted, missing as empty.
fn field(value: &Value, pointer: &str) -> String {
    match value.pointer(pointer) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn issue_path(owner: &str, repo: &str, issue_number: u64) -> String {
    format!("/repos/{}/{}/issues/{}", owner, repo, issue_number)
}

// -- Single-item operations --

pub async fn get_id_of_issue<A: GitHubApi + ?Sized>(
    api: &A,
    params: &IssueParams,
) -> Result<String, GitHubError> {
    let IssueParams {
        owner,
        repo,
        issue_number,
    } = params;
    check_repo(owner, repo)?;

    match api
        .request(Method::GET, &issue_path(owner, repo, *issue_number), None)
        .await
    {
        Ok(issue) => Ok(format!(
            "Issue #{} in {}/{} has ID: {}",
            issue_number,
            owner,
            repo,
            field(&issue, "/id")
        )),
        Err(e) if e.is_not_found() => Ok(format!(
            "Issue #{} not found in {}/{}.",
            issue_number, owner, repo
        )),
        Err(e) => Err(e),
    }
}

pub async fn get_parent_of_sub_issue<A: GitHubApi + ?Sized>(
    api: &A,
    params: &IssueParams,
) -> Result<String, GitHubError> {
    let IssueParams {
        owner,
        repo,
        issue_number,
    } = params;
    check_repo(owner, repo)?;

    let path = format!("{}/parent", issue_path(owner, repo, *issue_number));
    let parent = match api.request(Method::GET, &path, None).await {
        Ok(parent) => parent,
        Err(e) if e.is_not_found() => {
            return Ok(format!(
                "Issue #{} in {}/{} does not have a parent issue or does not exist.",
                issue_number, owner, repo
            ))
        }
        Err(e) => return Err(e),
    };

    let body = field(&parent, "/body");
    Ok(format!(
        "Parent Issue for #{}:\n\
         Issue #{}: {}\n\
         State: {}\n\
         Author: {}\n\
         Created: {}\n\
         Updated: {}\n\
         URL: {}\n\n\
         Description:\n{}",
        issue_number,
        field(&parent, "/number"),
        field(&parent, "/title"),
        field(&parent, "/state"),
        field(&parent, "/user/login"),
        field(&parent, "/created_at"),
        field(&parent, "/updated_at"),
        field(&parent, "/html_url"),
        if body.is_empty() {
            "No description"
        } else {
            body.as_str()
        }
    ))
}

pub async fn list_sub_issues<A: GitHubApi + ?Sized>(
    api: &A,
    params: &ListSubIssuesParams,
) -> Result<String, GitHubError> {
    let ListSubIssuesParams {
        owner,
        repo,
        issue_number,
        ..
    } = params;
    check_repo(owner, repo)?;

    let per_page = params.per_page.clamp(1, 100);
    // The serializer is not Send, so it must not live across the await below.
    let query = {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("per_page", &per_page.to_string());
        query.append_pair("page", &params.page.to_string());
        if let Some(state) = params.state {
            query.append_pair("state", state.as_str());
        }
        if let Some(labels) = params.labels.as_deref().filter(|l| !l.is_empty()) {
            query.append_pair("labels", labels);
        }
        query.finish()
    };
    let path = format!(
        "{}/sub_issues?{}",
        issue_path(owner, repo, *issue_number),
        query
    );

    let listing = match api.request(Method::GET, &path, None).await {
        Ok(listing) => listing,
        Err(e) if e.is_not_found() => {
            return Ok(format!(
                "Issue #{} in {}/{} does not exist or has no sub-issues.",
                issue_number, owner, repo
            ))
        }
        Err(e) => return Err(e),
    };

    let sub_issues = match listing.as_array() {
        Some(items) if !items.is_empty() => items,
        _ => {
            return Ok(format!(
                "No sub-issues found for issue #{} in {}/{}.",
                issue_number, owner, repo
            ))
        }
    };

    let lines: Vec<String> = sub_issues
        .iter()
        .map(|i| {
            format!(
                "#{}: {} ({}) - {}",
                field(i, "/number"),
                field(i, "/title"),
                field(i, "/state"),
                field(i, "/html_url")
            )
        })
        .collect();

    // A full page is the only hint that more pages may exist.
    let page_note = if sub_issues.len() == per_page as usize {
        format!(" (showing page {})", params.page)
    } else {
        String::new()
    };

    Ok(format!(
        "Sub-issues for #{} in {}/{}{}:\n\n{}",
        issue_number,
        owner,
        repo,
        page_note,
        lines.join("\n")
    ))
}

/// Fetch the Projects V2 items of an issue. `Ok(None)` means the issue does
/// not exist.
async fn fetch_project_items<A: GitHubApi + ?Sized>(
    api: &A,
    owner: &str,
    repo: &str,
    issue_number: u64,
) -> Result<Option<Vec<Value>>, GitHubError> {
    let variables = json!({
        "owner": owner,
        "repo": repo,
        "issueNumber": issue_number,
    });
    let data = match api.graphql(PROJECT_ITEMS_QUERY, variables).await {
        Ok(data) => data,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e),
    };

    match data.pointer("/repository/issue") {
        Some(issue) if !issue.is_null() => Ok(Some(
            issue
                .pointer("/projectItems/nodes")
                .and_then(|n| n.as_array())
                .cloned()
                .unwrap_or_default(),
        )),
        _ => Ok(None),
    }
}

pub async fn list_projects_for_issue<A: GitHubApi + ?Sized>(
    api: &A,
    params: &IssueParams,
) -> Result<String, GitHubError> {
    if !api.has_credential() {
        return Ok(TOKEN_REQUIRED.to_string());
    }
    let IssueParams {
        owner,
        repo,
        issue_number,
    } = params;
    check_repo(owner, repo)?;

    let Some(items) = fetch_project_items(api, owner, repo, *issue_number).await? else {
        return Ok(format!(
            "Issue #{} not found in {}/{}.",
            issue_number, owner, repo
        ));
    };

    if items.is_empty() {
        return Ok(format!(
            "Issue #{} in {}/{} is not associated with any Projects.",
            issue_number, owner, repo
        ));
    }

    let blocks: Vec<String> = items
        .iter()
        .map(|item| {
            format!(
                "- **{}** (Project #{})\n  - Project ID: {}\n  - Project Item ID: {}\n  - URL: {}",
                field(item, "/project/title"),
                field(item, "/project/number"),
                field(item, "/project/id"),
                field(item, "/id"),
                field(item, "/project/url")
            )
        })
        .collect();

    Ok(format!(
        "Issue #{} in {}/{} is associated with {} project(s):\n\n{}",
        issue_number,
        owner,
        repo,
        items.len(),
        blocks.join("\n\n")
    ))
}

pub async fn get_project_item_id<A: GitHubApi + ?Sized>(
    api: &A,
    params: &ProjectItemParams,
) -> Result<String, GitHubError> {
    if !api.has_credential() {
        return Ok(TOKEN_REQUIRED.to_string());
    }
    let ProjectItemParams {
        owner,
        repo,
        issue_number,
        project_id,
    } = params;
    check_repo(owner, repo)?;

    let Some(items) = fetch_project_items(api, owner, repo, *issue_number).await? else {
        return Ok(format!(
            "Issue #{} not found in {}/{}.",
            issue_number, owner, repo
        ));
    };

    let Some(item) = items
        .iter()
        .find(|item| item.pointer("/project/id").and_then(|id| id.as_str()) == Some(project_id.as_str()))
    else {
        return Ok(format!(
            "Issue #{} in {}/{} is not associated with project {}.\n\n\
             Tip: Use list_projects_for_issue to see all projects this issue is associated with.",
            issue_number, owner, repo, project_id
        ));
    };

    Ok(format!(
        "Issue #{} in {}/{} has the following item in project \"{}\":\n\n\
         - Project Item ID: {}\n\
         - Project ID: {}\n\
         - Project URL: {}",
        issue_number,
        owner,
        repo,
        field(item, "/project/title"),
        field(item, "/id"),
        field(item, "/project/id"),
        field(item, "/project/url")
    ))
}

// -- Batch operations --

pub async fn get_ids_of_issues<A: GitHubApi + ?Sized>(
    api: &A,
    params: &IssueNumbersParams,
    concurrency: usize,
) -> Result<String, GitHubError> {
    let IssueNumbersParams {
        owner,
        repo,
        issue_numbers,
    } = params;
    if issue_numbers.is_empty() {
        return Ok(NO_ISSUE_NUMBERS.to_string());
    }
    check_repo(owner, repo)?;

    let report = run_batch(
        issue_numbers.clone(),
        concurrency,
        |n| format!("Issue #{}", n),
        move |n| async move {
            match api.request(Method::GET, &issue_path(owner, repo, n), None).await {
                Ok(issue) => Ok(format!("Issue #{}: ID {}", n, field(&issue, "/id"))),
                Err(e) if e.is_not_found() => Err(GitHubError::Other("Not found".to_string())),
                Err(e) => Err(e),
            }
        },
    )
    .await;

    Ok(summarize(
        &report,
        &SummaryContext {
            operation: BATCH_OPERATION,
            item_kind: "issue IDs",
            verb: "retrieved",
            target: format!("from {}/{}", owner, repo),
            success_heading: "Successful retrievals",
        },
    ))
}

pub async fn add_sub_issues<A: GitHubApi + ?Sized>(
    api: &A,
    params: &AddSubIssuesParams,
    concurrency: usize,
) -> Result<String, GitHubError> {
    let AddSubIssuesParams {
        owner,
        repo,
        issue_number,
        sub_issue_ids,
        replace_parent,
    } = params;
    if sub_issue_ids.is_empty() {
        return Ok(NO_SUB_ISSUE_IDS.to_string());
    }
    check_repo(owner, repo)?;

    let path = format!("{}/sub_issues", issue_path(owner, repo, *issue_number));
    let path = path.as_str();
    let report = run_batch(
        sub_issue_ids.clone(),
        concurrency,
        |id| format!("Sub-issue ID {}", id),
        move |id| async move {
            let mut body = json!({ "sub_issue_id": id });
            if *replace_parent {
                body["replace_parent"] = json!(true);
            }
            api.request(Method::POST, path, Some(body)).await.map(|_| {
                format!(
                    "Successfully added sub-issue ID {} to issue #{}",
                    id, issue_number
                )
            })
        },
    )
    .await;

    Ok(summarize(
        &report,
        &SummaryContext {
            operation: BATCH_OPERATION,
            item_kind: "sub-issues",
            verb: "added",
            target: format!("to issue #{} in {}/{}", issue_number, owner, repo),
            success_heading: "Successful additions",
        },
    ))
}

pub async fn remove_sub_issues<A: GitHubApi + ?Sized>(
    api: &A,
    params: &RemoveSubIssuesParams,
    concurrency: usize,
) -> Result<String, GitHubError> {
    let RemoveSubIssuesParams {
        owner,
        repo,
        issue_number,
        sub_issue_ids,
    } = params;
    if sub_issue_ids.is_empty() {
        return Ok(NO_SUB_ISSUE_IDS.to_string());
    }
    check_repo(owner, repo)?;

    let path = format!("{}/sub_issue", issue_path(owner, repo, *issue_number));
    let path = path.as_str();
    let report = run_batch(
        sub_issue_ids.clone(),
        concurrency,
        |id| format!("Sub-issue ID {}", id),
        move |id| async move {
            api.request(Method::DELETE, path, Some(json!({ "sub_issue_id": id })))
                .await
                .map(|_| {
                    format!(
                        "Successfully removed sub-issue ID {} from issue #{}",
                        id, issue_number
                    )
                })
        },
    )
    .await;

    Ok(summarize(
        &report,
        &SummaryContext {
            operation: BATCH_OPERATION,
            item_kind: "sub-issues",
            verb: "removed",
            target: format!("from issue #{} in {}/{}", issue_number, owner, repo),
            success_heading: "Successful removals",
        },
    ))
}

pub async fn set_milestone_for_issues<A: GitHubApi + ?Sized>(
    api: &A,
    params: &SetMilestoneParams,
    concurrency: usize,
) -> Result<String, GitHubError> {
    let SetMilestoneParams {
        owner,
        repo,
        issue_numbers,
        milestone_number,
    } = params;
    if issue_numbers.is_empty() {
        return Ok(NO_ISSUE_NUMBERS.to_string());
    }
    check_repo(owner, repo)?;

    let report = run_batch(
        issue_numbers.clone(),
        concurrency,
        |n| format!("Issue #{}", n),
        move |n| async move {
            let updated = api
                .request(
                    Method::PATCH,
                    &issue_path(owner, repo, n),
                    Some(json!({ "milestone": milestone_number })),
                )
                .await;
            updated.map(|updated| {
                let change = match milestone_number {
                    None => "Removed milestone".to_string(),
                    Some(m) => match updated.pointer("/milestone/title").and_then(|t| t.as_str()) {
                        Some(title) => format!("Set milestone to \"{}\" (milestone #{})", title, m),
                        None => format!("Set milestone #{}", m),
                    },
                };
                format!("Issue #{}: {}", n, change)
            })
        },
    )
    .await;

    Ok(summarize(
        &report,
        &SummaryContext {
            operation: BATCH_OPERATION,
            item_kind: "issues",
            verb: "updated",
            target: format!("in {}/{}", owner, repo),
            success_heading: "Successful updates",
        },
    ))
}
