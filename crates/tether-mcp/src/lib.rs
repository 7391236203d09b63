//! # tether-mcp
//!
//! MCP (Model Context Protocol) server implementation for Tether.
//!
//! This crate exposes a CRM's records — contacts, companies, deals, leads and
//! their notes/associations — as typed tools for AI agents to consume. It
//! supports:
//!
//! - **Adaptive writes**: inserts probe the schema and retry with adjusted
//!   payloads instead of failing on column drift
//! - **Field whitelisting**: update payloads are sanitized against per-entity
//!   allow-lists with a fixed immutable block-list
//! - **Association tolerance**: junction tables and owner columns may be
//!   absent; tools degrade to the schema that is actually there
//! - **Multiple transports**: stdio and HTTP
//!
//! ## Architecture
//!
//! ```text
//! AI Agent (Claude, GPT, etc.)
//!       │
//!       │ MCP protocol (list tools / call tool)
//!       ▼
//! ┌───────────────────┐
//! │ Tether MCP Server │
//! │  1. Validate input│  ← catalog schemas
//! │  2. Resolve owner │  ← resolve
//! │  3. Sanitize patch│  ← sanitize
//! │  4. Write / retry │  ← adaptive
//! │  5. Classify error│  ← error
//! │  6. Return summary│
//! └─────────┬─────────┘
//!           │ generic select/insert/update/delete
//!           ▼
//!     Upstream Postgres
//! ```

pub mod adaptive;
pub mod associations;
pub mod catalog;
pub mod error;
pub mod executor;
pub mod http_transport;
pub mod notes;
pub mod protocol;
pub mod resolve;
pub mod sanitize;
pub mod search;
pub mod server;
pub mod tools;
pub mod validate;

// Re-export main types
pub use adaptive::{AdaptiveInserter, MAX_INSERT_ATTEMPTS};
pub use catalog::build_catalog;
pub use error::{McpError, ToolError, classify};
pub use executor::{ToolOutcome, Toolbox};
pub use protocol::{
    CallToolParams, JsonRpcRequest, JsonRpcResponse, ToolContent, ToolDefinition,
};
pub use sanitize::sanitize_updates;
pub use server::McpServer;
pub use tools::ToolRegistry;
