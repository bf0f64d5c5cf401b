use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

/// Per-attempt timeout. A page slower than this is treated as unreachable.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Pause before retrying with the alternate identity after a block-like status.
const BLOCK_BACKOFF: Duration = Duration::from_secs(3);

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";
const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(StatusCode),

    #[error("blocked on all attempts (403/429/503)")]
    Blocked,

    #[error(transparent)]
    Network(#[from] reqwest::Error),
}

/// Request header profiles. Some retailers serve bot-blocking status codes
/// to the desktop profile but let the mobile one through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityProfile {
    Desktop,
    Mobile,
}

impl IdentityProfile {
    pub fn user_agent(self) -> &'static str {
        match self {
            IdentityProfile::Desktop => DESKTOP_USER_AGENT,
            IdentityProfile::Mobile => MOBILE_USER_AGENT,
        }
    }

    fn headers(self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(self.user_agent()));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        if self == IdentityProfile::Mobile {
            headers.insert(
                ACCEPT,
                HeaderValue::from_static(
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                ),
            );
        }
        headers
    }
}

fn is_block_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 403 | 429 | 503)
}

pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Fetcher { client })
    }

    /// Fetches a product page, retrying once with the mobile identity when
    /// the desktop one gets a block-like status. At most two attempts; any
    /// other failure is returned immediately.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let profiles = [IdentityProfile::Desktop, IdentityProfile::Mobile];
        let last = profiles.len() - 1;

        for (i, profile) in profiles.into_iter().enumerate() {
            let response = self
                .client
                .get(url)
                .headers(profile.headers())
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::OK {
                return Ok(response.text().await?);
            }
            if is_block_status(status) && i < last {
                warn!("HTTP {} from {}, retrying with alternate identity...", status.as_u16(), url);
                sleep(BLOCK_BACKOFF).await;
                continue;
            }
            if is_block_status(status) {
                return Err(FetchError::Blocked);
            }
            return Err(FetchError::Status(status));
        }

        Err(FetchError::Blocked)
    }
}
