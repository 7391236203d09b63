//! Configuration types shared across Tether crates.

mod crm;
mod mcp;
mod storage;

pub use crm::CrmConfig;
pub use mcp::{McpConfig, Transport};
pub use storage::StorageConfig;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Tether server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TetherConfig {
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub crm: CrmConfig,
}
