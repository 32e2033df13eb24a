use crate::errors::OriginResult;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use std::fmt::Debug;

/// Downloads files announced by the image server.
#[async_trait]
pub trait ImageFetcher: Debug + Send + Sync {
    /// GET `url` and return the body.
    async fn fetch(&self, url: &str) -> OriginResult<Bytes>;
}

/// [`ImageFetcher`] over plain HTTP.
///
/// No timeout is applied: a download that was started always runs to
/// completion or failure.
#[derive(Debug, Clone, Default)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    /// Use an existing `reqwest` client.
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> OriginResult<Bytes> {
        let response = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-cache")
            .header(ACCEPT, "*/*")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?)
    }
}
