use crate::error::ProviderFetchError;
use futures::TryStreamExt;
use reqwest::Client;
use std::borrow::Cow;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::io::StreamReader;
use tracing::{debug, info};

/// Retrieves the raw lines of a provider block-list.
#[async_trait::async_trait]
pub trait ListFetcher: Send + Sync {
    async fn fetch_lines(&self, url: &str) -> Result<Vec<String>, ProviderFetchError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl ListFetcher for HttpFetcher {
    async fn fetch_lines(&self, url: &str) -> Result<Vec<String>, ProviderFetchError> {
        info!("Fetching block-list from {}", url);
        let http_err = |source| ProviderFetchError::Http {
            url: url.to_string(),
            source,
        };

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http_err)?;

        let stream = resp.bytes_stream().map_err(std::io::Error::other);
        let out = read_lines(BufReader::new(StreamReader::new(stream)))
            .await
            .map_err(|source| ProviderFetchError::Body {
                url: url.to_string(),
                source,
            })?;

        info!("Received {} lines from {}", out.len(), url);
        Ok(out)
    }
}

/// Splits a body into lines without requiring it to be valid UTF-8.
///
/// Undecodable bytes become U+FFFD, which `normalize` rejects, so a bad line
/// is counted as one malformed entry instead of failing the whole list.
pub async fn read_lines<R>(mut reader: R) -> std::io::Result<Vec<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut out = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(out);
        }
        let raw = buf.strip_suffix(b"\n").unwrap_or(&buf);
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);
        if matches!(line, Cow::Owned(_)) {
            debug!("Line {} is not valid UTF-8", out.len() + 1);
        }
        out.push(line.into_owned());
    }
}
