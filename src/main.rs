use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use mcp_github_sub_issues::batch::MAX_CONCURRENCY;
use mcp_github_sub_issues::github::{
    ClientConfig, GitHubClient, DEFAULT_API_BASE, DEFAULT_GRAPHQL_URL,
};
use mcp_github_sub_issues::server::SubIssuesServer;
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// JSON-RPC over stdin/stdout
    Stdio,
    /// Streamable HTTP at /mcp; callers may send X-GITHUB-TOKEN per request
    Http,
}

/// MCP server for GitHub sub-issues, milestones, and Projects V2 associations
#[derive(Parser)]
#[command(name = "mcp-github-sub-issues", version, about)]
struct Cli {
    /// GitHub personal access token.
    /// Used whenever a request does not carry its own X-GITHUB-TOKEN header.
    #[arg(long)]
    token: Option<String>,

    /// Read GitHub token from an environment variable.
    /// Default: GITHUB_TOKEN
    #[arg(long = "token-env")]
    token_env: Option<String>,

    /// Transport to serve MCP over
    #[arg(long, value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    /// Listen address for the HTTP transport
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// GitHub REST API base URL
    #[arg(long, default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// GitHub GraphQL endpoint
    #[arg(long, default_value = DEFAULT_GRAPHQL_URL)]
    graphql_url: String,

    /// Per-call timeout for GitHub requests, in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Maximum in-flight GitHub calls per batch tool (1 = sequential, max 8)
    #[arg(long, default_value = "1")]
    batch_concurrency: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Resolve token: --token > --token-env > GITHUB_TOKEN
    let token = if let Some(t) = cli.token {
        Some(t)
    } else {
        let env_name = cli.token_env.as_deref().unwrap_or("GITHUB_TOKEN");
        match std::env::var(env_name) {
            Ok(t) if !t.is_empty() => {
                tracing::info!(env = env_name, "Read GitHub token from environment variable");
                Some(t)
            }
            _ => None,
        }
    };

    if token.is_none() && cli.transport == Transport::Stdio {
        tracing::warn!(
            "No GitHub token provided — API rate limits will be very restrictive and Projects tools are unavailable"
        );
    }

    let github = GitHubClient::new(ClientConfig {
        api_base: cli.api_base,
        graphql_url: cli.graphql_url,
        timeout: Duration::from_secs(cli.timeout_secs.max(1)),
    })
    .map_err(|e| anyhow::anyhow!("Failed to create GitHub client: {}", e))?;

    let batch_concurrency = cli.batch_concurrency.clamp(1, MAX_CONCURRENCY);

    tracing::info!(
        authenticated = token.is_some(),
        transport = ?cli.transport,
        batch_concurrency,
        "Starting mcp-github-sub-issues server"
    );

    let service = SubIssuesServer::new(github, token, batch_concurrency);
    match cli.transport {
        Transport::Stdio => {
            let running = service.serve(stdio()).await?;
            running.waiting().await?;
        }
        Transport::Http => serve_http(service, cli.bind).await?,
    }

    Ok(())
}

async fn serve_http(service: SubIssuesServer, bind: SocketAddr) -> Result<()> {
    use rmcp::transport::streamable_http_server::{
        session::local::LocalSessionManager,
        tower::{StreamableHttpServerConfig, StreamableHttpService},
    };

    let http_service = StreamableHttpService::new(
        move || Ok(service.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", http_service);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "Listening on http://{}/mcp", bind);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
