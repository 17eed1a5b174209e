//! Persistent queue connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where jobs are stored and how long a claim is leased.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue backend URL. Only `memory://` is built in.
    #[serde(default = "default_url")]
    pub url: String,
    /// How long a claimed job stays owned before it is handed out again.
    #[serde(default = "default_lease")]
    pub lease_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            lease_seconds: default_lease(),
        }
    }
}

impl QueueConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_seconds)
    }
}

fn default_url() -> String {
    "memory://".to_string()
}

fn default_lease() -> u64 {
    600
}
