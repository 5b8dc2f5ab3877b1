use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

/// Result of [`Probe::ensure_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    /// The session landed on the login boundary.
    pub needs_login: bool,
}

impl Readiness {
    pub fn ready() -> Self {
        Self {
            ready: true,
            needs_login: false,
        }
    }

    pub fn not_ready() -> Self {
        Self::default()
    }

    pub fn login_required() -> Self {
        Self {
            ready: false,
            needs_login: true,
        }
    }
}

/// One look at the page. `count: None` means the signal was not on it,
/// which is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reading {
    pub count: Option<u32>,
    /// Leading page text, for diagnosing misses.
    pub excerpt: Option<String>,
}

impl Reading {
    pub fn found(count: u32) -> Self {
        Self {
            count: Some(count),
            excerpt: None,
        }
    }

    pub fn missing(excerpt: Option<String>) -> Self {
        Self {
            count: None,
            excerpt,
        }
    }
}

/// Source of listener counts. Implementations own whatever session they
/// need (HTTP client, browser page) and are only ever driven by one tick
/// at a time.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Make the session usable, reloading it if needed. Idempotent.
    async fn ensure_ready(&mut self) -> Result<Readiness, ProbeError>;

    /// Read the current listener count.
    async fn sample(&mut self) -> Result<Reading, ProbeError>;
}
