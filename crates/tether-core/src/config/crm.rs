//! CRM deployment constants.
//!
//! Values that vary per deployment but are fixed per process: they are
//! threaded into tool construction rather than embedded as literals.

use serde::{Deserialize, Serialize};

/// Deployment-level CRM settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    /// Author recorded on notes when the caller supplies none.
    #[serde(default = "default_author")]
    pub default_author: String,

    /// Column holding the owning-company reference on entity tables.
    #[serde(default = "default_owner_column")]
    pub owner_column: String,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            default_author: default_author(),
            owner_column: default_owner_column(),
        }
    }
}

fn default_author() -> String {
    "mcp".to_string()
}

fn default_owner_column() -> String {
    "company_id".to_string()
}
