//! Operator notifications: alert and report mail.

mod center;
mod resend;
mod smtp;
pub mod templates;
mod traits;

pub use center::{AlertCategory, NotificationCenter};
pub use resend::ResendNotifier;
pub use smtp::SmtpNotifier;
pub use traits::Notifier;

use std::sync::Arc;

use crate::error::NotifyError;
use crate::storage::{NotificationConfig, NotifyProvider};

/// Build the configured transport.
///
/// # Errors
/// Returns `NotConfigured` when a setting the provider needs is empty.
pub fn build_notifier(config: &NotificationConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    if config.to.trim().is_empty() {
        return Err(NotifyError::NotConfigured("notifications.to is empty".into()));
    }
    match config.provider {
        NotifyProvider::Resend => {
            if config.resend_api_key.is_empty() {
                return Err(NotifyError::NotConfigured(
                    "notifications.resend_api_key is empty".into(),
                ));
            }
            Ok(Arc::new(ResendNotifier::new(
                &config.resend_endpoint,
                &config.resend_api_key,
                &config.from,
                &config.to,
            )?))
        }
        NotifyProvider::Smtp => {
            if config.smtp.user.is_empty() {
                return Err(NotifyError::NotConfigured(
                    "notifications.smtp.user is empty".into(),
                ));
            }
            Ok(Arc::new(SmtpNotifier::new(
                &config.smtp,
                &config.from,
                &config.to,
            )?))
        }
    }
}
