//! Favicon downloads over HTTP.

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::api::{FaviconFetcher, FetchedIcon};
use crate::error::{PlatformError, PlatformResult};

/// Refuse anything bigger than this; favicons are a few KiB.
const MAX_ICON_BYTES: usize = 512 * 1024;

pub struct HttpFaviconFetcher {
    client: reqwest::Client,
}

impl HttpFaviconFetcher {
    pub fn new(timeout: Duration) -> PlatformResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dockd/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl FaviconFetcher for HttpFaviconFetcher {
    fn fetch(&self, url: String) -> BoxFuture<'_, PlatformResult<FetchedIcon>> {
        Box::pin(async move {
            let response = self.client.get(&url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(PlatformError::Fetch(format!("{} returned {}", url, status)));
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
                .unwrap_or_else(|| "image/png".to_string());
            if !content_type.starts_with("image/") {
                return Err(PlatformError::Fetch(format!(
                    "{} is {}, not an image",
                    url, content_type
                )));
            }

            let bytes = response.bytes().await?;
            if bytes.is_empty() || bytes.len() > MAX_ICON_BYTES {
                return Err(PlatformError::Fetch(format!(
                    "{} returned {} bytes",
                    url,
                    bytes.len()
                )));
            }
            debug!("Fetched {} bytes of {} from {}", bytes.len(), content_type, url);
            Ok(FetchedIcon {
                bytes: bytes.to_vec(),
                content_type,
            })
        })
    }
}
