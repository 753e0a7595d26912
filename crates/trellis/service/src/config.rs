//! Service configuration.

use serde::{Deserialize, Serialize};

/// Tunables for the run lifecycle service. Every field has a default
/// so a partial config document deserializes cleanly.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Queue assigned to runs created without one.
    pub default_queue: String,
    /// Hard cap on `list_runs` page sizes.
    pub max_list_limit: usize,
    /// Retry budget handed to the retry rule when the caller supplies
    /// no parameters.
    pub default_max_retries: u64,
    /// Delay before a substituted retry becomes eligible.
    pub default_retry_delay_seconds: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_queue: "default".to_string(),
            max_list_limit: 200,
            default_max_retries: 0,
            default_retry_delay_seconds: 0,
        }
    }
}
