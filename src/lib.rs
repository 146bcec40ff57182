//! MCP server that lets LLMs manage GitHub sub-issues.
//!
//! Provides tools for resolving issue numbers to internal IDs, attaching and
//! detaching sub-issues in batches, setting milestones on many issues at once,
//! and inspecting Projects V2 associations.

pub mod batch;
pub mod error;
pub mod github;
pub mod server;
pub mod tools;
