use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;

use super::models::SourceKind;
use crate::config::NewsConfig;
use crate::{Error, Result};

const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Network access used by the fetch chain
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch the body of `url` as text. Any non-success outcome is an error.
    async fn get_text(&self, url: &str, kind: SourceKind) -> Result<String>;
}

/// `reqwest` backed client with a bounded timeout and identifying headers
pub struct HttpSourceClient {
    client: Client,
    user_agent: String,
    accept_language: String,
}

impl HttpSourceClient {
    pub fn new(config: &NewsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
        })
    }

    fn build_headers(&self, kind: SourceKind) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(kind.accept_header()));
        if let Ok(lang) = HeaderValue::from_str(&self.accept_language) {
            headers.insert(ACCEPT_LANGUAGE, lang);
        }
        if let Ok(ua) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        headers
    }

    /// Check if content is an anti-bot challenge page instead of the payload
    fn is_challenge_page(content: &[u8]) -> bool {
        let check_len = content.len().min(2048);
        let preview = String::from_utf8_lossy(&content[..check_len]);

        preview.contains("Just a moment...")
            || preview.contains("cf-browser-verification")
            || preview.contains("_cf_chl_opt")
            || preview.contains("challenge-platform")
    }

    fn check_body(url: &str, body: &Bytes) -> Result<()> {
        if body.len() > MAX_BODY_BYTES {
            return Err(Error::Source(format!(
                "Response too large ({} bytes) for URL: {}",
                body.len(),
                url
            )));
        }
        if Self::is_challenge_page(body) {
            return Err(Error::Source(format!(
                "Challenge page returned instead of content for URL: {}",
                url
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn get_text(&self, url: &str, kind: SourceKind) -> Result<String> {
        let response = self
            .client
            .get(url)
            .headers(self.build_headers(kind))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Source(format!("HTTP {} for URL: {}", status, url)));
        }

        let body = response.bytes().await?;
        Self::check_body(url, &body)?;

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
