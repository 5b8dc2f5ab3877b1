//! Resend integration: post mail through the Resend HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::traits::Notifier;
use crate::error::NotifyError;

const PROVIDER: &str = "resend";

/// Upper bound on one API call, connect included.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ResendNotifier {
    client: Client,
    endpoint: String,
    api_key: String,
    from: String,
    to: String,
}

impl ResendNotifier {
    /// # Errors
    /// Returns `NotConfigured` if the HTTP client cannot be built.
    pub fn new(endpoint: &str, api_key: &str, from: &str, to: &str) -> Result<Self, NotifyError> {
        Ok(Self {
            client: Self::client(SEND_TIMEOUT)?,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// Replace the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, NotifyError> {
        self.client = Self::client(timeout)?;
        Ok(self)
    }

    fn client(timeout: Duration) -> Result<Client, NotifyError> {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::NotConfigured(format!("resend client: {e}")))
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, subject: &str, body_html: &str) -> Result<(), NotifyError> {
        let body = json!({
            "from": self.from,
            "to": [self.to],
            "subject": subject,
            "html": body_html,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport {
                provider: PROVIDER,
                message: e.to_string(),
            })?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(NotifyError::Rejected {
                provider: PROVIDER,
                status: status.as_u16(),
                body: text,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn posts_message_with_bearer_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/emails")
            .match_header("authorization", "Bearer re_test")
            .match_body(Matcher::PartialJson(json!({
                "to": ["ops@example.com"],
                "subject": "[listentrack] hello",
            })))
            .with_status(200)
            .with_body(r#"{"id":"abc"}"#)
            .create_async()
            .await;

        let notifier = ResendNotifier::new(
            &format!("{}/emails", server.url()),
            "re_test",
            "Tracker <bot@example.com>",
            "ops@example.com",
        )
        .unwrap();
        notifier.send("[listentrack] hello", "<p>hi</p>").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejection_carries_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/emails")
            .with_status(422)
            .with_body("invalid from")
            .create_async()
            .await;

        let notifier = ResendNotifier::new(
            &format!("{}/emails", server.url()),
            "re_test",
            "bad",
            "ops@example.com",
        )
        .unwrap();
        let err = notifier.send("s", "b").await.unwrap_err();
        match err {
            NotifyError::Rejected { status, body, .. } => {
                assert_eq!(status, 422);
                assert_eq!(body, "invalid from");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        // Accepts the connection and never answers.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let _held = listener.accept();
            std::thread::sleep(std::time::Duration::from_secs(5));
        });

        let notifier = ResendNotifier::new(
            &format!("http://{addr}/emails"),
            "re_test",
            "Tracker <bot@example.com>",
            "ops@example.com",
        )
        .unwrap()
        .with_timeout(Duration::from_millis(200))
        .unwrap();
        let result = tokio::time::timeout(Duration::from_secs(3), notifier.send("s", "b"))
            .await
            .expect("send should give up on its own");
        assert!(matches!(result, Err(NotifyError::Transport { .. })));
    }
}
