//! `[on_demand]` section configuration.
//!
//! Retention policy for compiled pages.
//!
//! # Example
//!
//! ```toml
//! [on_demand]
//! max_inactive_age = 60000    # ms a built page may go unpinged
//! pages_buffer_length = 5     # recently pinged pages that are never evicted
//! dispose_interval = 5000     # ms between eviction sweeps
//! ```

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnDemandConfig {
    pub max_inactive_age: u64,
    pub pages_buffer_length: usize,
    pub dispose_interval: u64,
}

impl Default for OnDemandConfig {
    fn default() -> Self {
        Self {
            max_inactive_age: 60_000,
            pages_buffer_length: 5,
            dispose_interval: 5_000,
        }
    }
}

impl OnDemandConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.pages_buffer_length == 0 {
            diag.error_with_hint(
                FieldPath::new("on_demand.pages_buffer_length"),
                "must be at least 1",
                "the page a client is viewing must always stay built",
            );
        }
        if self.max_inactive_age == 0 {
            diag.error(
                FieldPath::new("on_demand.max_inactive_age"),
                "must be greater than 0",
            );
        }
        if self.dispose_interval == 0 {
            diag.error(
                FieldPath::new("on_demand.dispose_interval"),
                "must be greater than 0",
            );
        }
    }
}
