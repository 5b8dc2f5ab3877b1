use async_trait::async_trait;

use crate::error::NotifyError;

/// Every mail transport implements this trait.
/// Notifiers are stateless between calls; callers own cooldowns.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Unique identifier (e.g. "resend", "smtp").
    fn name(&self) -> &'static str;

    /// Deliver one HTML message.
    async fn send(&self, subject: &str, body_html: &str) -> Result<(), NotifyError>;
}
