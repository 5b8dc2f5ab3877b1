//! SMTP integration via lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::resend::SEND_TIMEOUT;
use super::traits::Notifier;
use crate::error::NotifyError;
use crate::storage::SmtpConfig;

const PROVIDER: &str = "smtp";

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpNotifier {
    /// # Errors
    /// Returns `NotConfigured` for an unusable host or address.
    pub fn new(config: &SmtpConfig, from: &str, to: &str) -> Result<Self, NotifyError> {
        let not_configured = |what: &str, e: &dyn std::fmt::Display| {
            NotifyError::NotConfigured(format!("{what}: {e}"))
        };

        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| not_configured("notifications.smtp.host", &e))?;

        let transport = builder
            .port(config.port)
            .timeout(Some(SEND_TIMEOUT))
            .credentials(Credentials::new(config.user.clone(), config.pass.clone()))
            .build();

        Ok(Self {
            transport,
            from: from
                .parse()
                .map_err(|e| not_configured("notifications.from", &e))?,
            to: to.parse().map_err(|e| not_configured("notifications.to", &e))?,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, subject: &str, body_html: &str) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body_html.to_string())
            .map_err(|e| NotifyError::Transport {
                provider: PROVIDER,
                message: e.to_string(),
            })?;

        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| NotifyError::Transport {
                provider: PROVIDER,
                message: e.to_string(),
            })
    }
}
