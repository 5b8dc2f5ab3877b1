//! Plain-HTTP probe: fetch the artist page with the operator's cookies and
//! read the "people listening now" figure out of the returned text.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::probe::{Probe, Reading, Readiness};
use crate::error::ProbeError;
use crate::storage::SamplingConfig;

const EXCERPT_CHARS: usize = 500;

static LISTENING_NOW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([\d,]+)\s*people\s*listening\s*now").unwrap());
static LISTENING_NOW_SINGULAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([\d,]+)\s*person\s*listening\s*now").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<script.*?</script>|<style.*?</style>|<[^>]+>").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Extract the live listener count from page text.
pub fn extract_listener_count(text: &str) -> Option<u32> {
    [&*LISTENING_NOW, &*LISTENING_NOW_SINGULAR]
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps[1].replace(',', "").parse().ok())
}

/// Visible text of an HTML document, whitespace collapsed.
pub fn page_text(html: &str) -> String {
    let stripped = TAG.replace_all(html, " ");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

pub struct HttpProbe {
    client: Client,
    target: Url,
    login_markers: Vec<String>,
    timeout_secs: u64,
}

impl HttpProbe {
    /// Build a probe from the `[sampling]` section.
    ///
    /// # Errors
    /// Returns `Misconfigured` for an unparsable URL or cookie header.
    pub fn new(config: &SamplingConfig) -> Result<Self, ProbeError> {
        let target = Url::parse(&config.target_url)
            .map_err(|e| ProbeError::Misconfigured(format!("target_url: {e}")))?;

        let mut headers = HeaderMap::new();
        if let Some(cookie) = config.cookie_header.as_deref().filter(|c| !c.is_empty()) {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| ProbeError::Misconfigured(format!("cookie_header: {e}")))?;
            headers.insert(COOKIE, value);
        }

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ProbeError::Misconfigured(e.to_string()))?;

        Ok(Self {
            client,
            target,
            login_markers: config.login_markers.clone(),
            timeout_secs: config.request_timeout_secs,
        })
    }

    fn is_login_url(&self, url: &Url) -> bool {
        let url = url.as_str();
        self.login_markers
            .iter()
            .any(|marker| !marker.is_empty() && url.contains(marker.as_str()))
    }

    fn map_error(&self, err: reqwest::Error) -> ProbeError {
        if err.is_timeout() {
            ProbeError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            ProbeError::Transport(err.to_string())
        }
    }

    /// GET the target. Returns the final URL, status and body.
    async fn fetch(&self) -> Result<(Url, reqwest::StatusCode, String), ProbeError> {
        let resp = self
            .client
            .get(self.target.clone())
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        let final_url = resp.url().clone();
        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.map_error(e))?;
        Ok((final_url, status, body))
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn name(&self) -> &str {
        "http"
    }

    async fn ensure_ready(&mut self) -> Result<Readiness, ProbeError> {
        let (final_url, status, _) = self.fetch().await?;
        if self.is_login_url(&final_url) {
            debug!(url = %final_url, "redirected to login");
            return Ok(Readiness::login_required());
        }
        if status.is_success() {
            Ok(Readiness::ready())
        } else {
            debug!(%status, "target not ready");
            Ok(Readiness::not_ready())
        }
    }

    async fn sample(&mut self) -> Result<Reading, ProbeError> {
        let (final_url, status, body) = self.fetch().await?;
        if self.is_login_url(&final_url) {
            return Err(ProbeError::Transport(format!(
                "redirected to login page {final_url}"
            )));
        }
        if !status.is_success() {
            return Err(ProbeError::Transport(format!("HTTP {status}")));
        }

        let text = page_text(&body);
        Ok(match extract_listener_count(&text) {
            Some(count) => Reading::found(count),
            None => Reading::missing(Some(excerpt(&text))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(url: String) -> SamplingConfig {
        SamplingConfig {
            target_url: url,
            cookie_header: Some("sp_dc=test".into()),
            ..SamplingConfig::default()
        }
    }

    #[test]
    fn extracts_plural_and_singular_counts() {
        assert_eq!(extract_listener_count("1,234 people listening now"), Some(1234));
        assert_eq!(extract_listener_count("12 People Listening Now"), Some(12));
        assert_eq!(extract_listener_count("1 person listening now"), Some(1));
        assert_eq!(extract_listener_count("nobody here"), None);
    }

    #[test]
    fn page_text_strips_markup() {
        let html = "<html><script>var x = 1;</script><div><span>42</span> people\n listening now</div></html>";
        let text = page_text(html);
        assert_eq!(text, "42 people listening now");
        assert_eq!(extract_listener_count(&text), Some(42));
    }

    #[test]
    fn rejects_bad_target_url() {
        let result = HttpProbe::new(&config_for("not a url".into()));
        assert!(matches!(result, Err(ProbeError::Misconfigured(_))));
    }

    #[tokio::test]
    async fn samples_count_from_page() {
        let mut server = mockito::Server::new_async().await;
        let page = server
            .mock("GET", "/home")
            .match_header("cookie", "sp_dc=test")
            .with_status(200)
            .with_body("<div><b>3,050</b> people listening now</div>")
            .expect(2)
            .create_async()
            .await;

        let mut probe = HttpProbe::new(&config_for(format!("{}/home", server.url()))).unwrap();
        assert_eq!(probe.ensure_ready().await.unwrap(), Readiness::ready());
        assert_eq!(probe.sample().await.unwrap(), Reading::found(3050));
        page.assert_async().await;
    }

    #[tokio::test]
    async fn missing_count_returns_excerpt() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/home")
            .with_status(200)
            .with_body("<p>Loading dashboard</p>")
            .create_async()
            .await;

        let mut probe = HttpProbe::new(&config_for(format!("{}/home", server.url()))).unwrap();
        let reading = probe.sample().await.unwrap();
        assert_eq!(reading.count, None);
        assert_eq!(reading.excerpt.as_deref(), Some("Loading dashboard"));
    }

    #[tokio::test]
    async fn login_redirect_means_needs_login() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/home")
            .with_status(302)
            .with_header("location", "/login")
            .create_async()
            .await;
        server
            .mock("GET", "/login")
            .with_status(200)
            .with_body("sign in")
            .create_async()
            .await;

        let mut probe = HttpProbe::new(&config_for(format!("{}/home", server.url()))).unwrap();
        assert_eq!(probe.ensure_ready().await.unwrap(), Readiness::login_required());
        assert!(probe.sample().await.is_err());
    }
}
