//! Per-item batch execution and report rendering shared by the batch tools.

use std::future::Future;

use futures::stream::{self, StreamExt};

use crate::error::{describe_failure, GitHubError};

/// Upper bound on in-flight upstream calls for one batch.
pub const MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Success(String),
    Failure(String),
}

/// Collected outcomes of one batch, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub total: usize,
    pub successes: Vec<String>,
    pub failures: Vec<String>,
}

impl BatchReport {
    pub fn from_outcomes(outcomes: Vec<BatchOutcome>) -> Self {
        let mut report = BatchReport {
            total: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                BatchOutcome::Success(msg) => report.successes.push(msg),
                BatchOutcome::Failure(msg) => report.failures.push(msg),
            }
        }
        report
    }

    pub fn succeeded(&self) -> usize {
        self.successes.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Run `op` once per item and collect one outcome per item.
///
/// `subject` names an item in failure lines (e.g. `Sub-issue ID 102`). An
/// item's error never stops the batch. With `concurrency > 1` up to that many
/// calls are in flight at once, but outcomes keep the input order.
pub async fn run_batch<I, S, F, Fut>(
    items: Vec<I>,
    concurrency: usize,
    subject: S,
    op: F,
) -> BatchReport
where
    I: Copy,
    S: Fn(I) -> String,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<String, GitHubError>>,
{
    let outcomes: Vec<BatchOutcome> = stream::iter(items)
        .map(|item| {
            let label = subject(item);
            let call = op(item);
            async move {
                match call.await {
                    Ok(message) => BatchOutcome::Success(message),
                    Err(err) => {
                        tracing::warn!(item = %label, error = %err, "Batch item failed");
                        BatchOutcome::Failure(format!("{}: {}", label, describe_failure(&err)))
                    }
                }
            }
        })
        .buffered(concurrency.clamp(1, MAX_CONCURRENCY))
        .collect()
        .await;

    let report = BatchReport::from_outcomes(outcomes);
    tracing::debug!(
        total = report.total,
        succeeded = report.succeeded(),
        failed = report.failed(),
        "Batch finished"
    );
    report
}

/// Wording for the report of one kind of batch.
#[derive(Debug, Clone)]
pub struct SummaryContext<'a> {
    /// e.g. `Batch operation`
    pub operation: &'a str,
    /// e.g. `sub-issues`
    pub item_kind: &'a str,
    /// e.g. `added`
    pub verb: &'a str,
    /// e.g. `to issue #10 in acme/widgets`
    pub target: String,
    /// Heading of the success block, e.g. `Successful additions`
    pub success_heading: &'a str,
}

pub fn summarize(report: &BatchReport, ctx: &SummaryContext<'_>) -> String {
    let mut text = format!(
        "{} completed: {}/{} {} {} successfully {}",
        ctx.operation,
        report.succeeded(),
        report.total,
        ctx.item_kind,
        ctx.verb,
        ctx.target
    );

    if !report.successes.is_empty() {
        text.push_str(&format!("\n\n{}:", ctx.success_heading));
        for line in &report.successes {
            text.push_str(&format!("\n✓ {}", line));
        }
    }

    if !report.failures.is_empty() {
        text.push_str("\n\nErrors encountered:");
        for line in &report.failures {
            text.push('\n');
            text.push_str(line);
        }
    }

    text
}
