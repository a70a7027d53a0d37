//! Downloading the photos linked from survey rows.

use std::time::Duration;

use reqwest::Url;

const DRIVE_DOWNLOAD_URL: &str = "https://drive.google.com/uc";

#[derive(thiserror::Error, Debug)]
pub enum PhotoFetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("invalid photo link '{0}'")]
    InvalidLink(String),
    #[error("photo request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("photo request to {url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("photo at {0} is empty")]
    Empty(String),
}

#[async_trait::async_trait]
pub trait PhotoFetcher: Send + Sync {
    /// Bytes of the photo behind `link`, or `None` when photos are not stored.
    async fn fetch(&self, link: &str) -> Result<Option<Vec<u8>>, PhotoFetchError>;
}

/// Stores measurements without their photos.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPhotoFetcher;

#[async_trait::async_trait]
impl PhotoFetcher for NoPhotoFetcher {
    async fn fetch(&self, _link: &str) -> Result<Option<Vec<u8>>, PhotoFetchError> {
        Ok(None)
    }
}

pub struct HttpPhotoFetcher {
    client: reqwest::Client,
}

impl HttpPhotoFetcher {
    pub fn new(timeout: Duration) -> Result<Self, PhotoFetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PhotoFetchError::Client)?;
        Ok(Self { client })
    }
}

/// Rewrite a Google Drive share link into its direct-download form. Links that
/// are not Drive share links are returned unchanged.
pub fn drive_download_url(link: &str) -> Result<Url, PhotoFetchError> {
    let url = Url::parse(link.trim()).map_err(|_| PhotoFetchError::InvalidLink(link.to_string()))?;
    if url.host_str() != Some("drive.google.com") {
        return Ok(url);
    }

    let from_query = url
        .query_pairs()
        .find(|(k, _)| k == "id")
        .map(|(_, v)| v.into_owned());
    let from_path = || {
        let segments: Vec<&str> = url.path_segments()?.collect();
        segments
            .windows(2)
            .find(|w| w[0] == "d")
            .map(|w| w[1].to_string())
    };

    match from_query.or_else(from_path).filter(|id| !id.is_empty()) {
        Some(id) => {
            let mut direct = Url::parse(DRIVE_DOWNLOAD_URL)
                .map_err(|_| PhotoFetchError::InvalidLink(link.to_string()))?;
            direct
                .query_pairs_mut()
                .append_pair("export", "download")
                .append_pair("id", &id);
            Ok(direct)
        }
        None => Ok(url),
    }
}

#[async_trait::async_trait]
impl PhotoFetcher for HttpPhotoFetcher {
    async fn fetch(&self, link: &str) -> Result<Option<Vec<u8>>, PhotoFetchError> {
        let url = drive_download_url(link)?;
        let shown = url.to_string();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| PhotoFetchError::Request {
                url: shown.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(PhotoFetchError::Status { url: shown, status });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| PhotoFetchError::Request {
                url: shown.clone(),
                source,
            })?;
        if bytes.is_empty() {
            return Err(PhotoFetchError::Empty(shown));
        }
        tracing::debug!(url = %shown, bytes = bytes.len(), "downloaded photo");
        Ok(Some(bytes.to_vec()))
    }
}
