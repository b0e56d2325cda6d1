use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RemoteConfig;
use crate::domain::{self, AlbumMetadata, ComicId, RelatedWork};
use crate::error::ShelfError;

/// Album detail as reported by the remote source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteAlbum {
    #[serde(alias = "id", deserialize_with = "domain::string_or_number")]
    pub album_id: String,
    #[serde(default, alias = "name")]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "domain::lenient_count")]
    pub comment_count: u64,
    #[serde(default, deserialize_with = "domain::lenient_count")]
    pub likes: u64,
    #[serde(default)]
    pub works: Value,
    #[serde(default)]
    pub related_list: Vec<RelatedWork>,
}

impl From<&RemoteAlbum> for AlbumMetadata {
    fn from(value: &RemoteAlbum) -> Self {
        Self {
            id: value.album_id.clone(),
            title: value.title.clone(),
            author: value.author.clone(),
            description: value.description.clone(),
            tags: value.tags.clone(),
            comment_count: value.comment_count,
            likes: value.likes,
            works: value.works.clone(),
            related_list: value.related_list.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    #[serde(default)]
    pub filename: Option<String>,
}

impl ImageRef {
    /// File extension taken from the explicit filename or the URL path,
    /// defaulting to `png`.
    pub fn extension(&self) -> &str {
        let name = self
            .filename
            .as_deref()
            .unwrap_or_else(|| self.url.split(['?', '#']).next().unwrap_or_default());
        name.rsplit('/')
            .next()
            .and_then(|file| file.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.len() <= 5)
            .unwrap_or("png")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhotoDetail {
    #[serde(default)]
    pub photo_id: String,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

impl PhotoDetail {
    pub fn first(&self) -> Option<&ImageRef> {
        self.images.first()
    }
}

/// The narrow capability surface required from a content source.
pub trait ContentClient: Send {
    fn album_detail(&self, id: &ComicId) -> Result<RemoteAlbum, ShelfError>;
    fn photo_detail(&self, id: &ComicId) -> Result<PhotoDetail, ShelfError>;
    fn download_image(&self, image: &ImageRef, destination: &Path) -> Result<(), ShelfError>;
}

/// Produces independent clients; clients are never shared between tasks.
pub trait ClientFactory: Send + Sync {
    type Client: ContentClient;

    fn create(&self) -> Result<Self::Client, ShelfError>;
}

#[derive(Clone)]
pub struct HttpContentClient {
    client: Client,
    base_url: String,
}

impl HttpContentClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, ShelfError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("comic-shelf/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ShelfError::Remote(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| ShelfError::Remote(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    pub fn album_url(&self, id: &ComicId) -> String {
        format!("{}/album/{}", self.base_url, id.as_str())
    }

    pub fn photo_url(&self, id: &ComicId) -> String {
        format!("{}/photo/{}", self.base_url, id.as_str())
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, ShelfError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "remote request failed".to_string());
        Err(ShelfError::RemoteStatus { status, message })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, ShelfError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        tracing::debug!(status, attempt, "retrying remote request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        tracing::debug!(error = %err, attempt, "retrying remote request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(ShelfError::Remote(err.to_string()));
                }
            }
        }
    }
}

impl ContentClient for HttpContentClient {
    fn album_detail(&self, id: &ComicId) -> Result<RemoteAlbum, ShelfError> {
        let url = self.album_url(id);
        let response = self.send_with_retries(|| self.client.get(&url))?;
        let response = Self::handle_status(response)?;
        response
            .json::<RemoteAlbum>()
            .map_err(|err| ShelfError::Remote(err.to_string()))
    }

    fn photo_detail(&self, id: &ComicId) -> Result<PhotoDetail, ShelfError> {
        let url = self.photo_url(id);
        let response = self.send_with_retries(|| self.client.get(&url))?;
        let response = Self::handle_status(response)?;
        response
            .json::<PhotoDetail>()
            .map_err(|err| ShelfError::Remote(err.to_string()))
    }

    fn download_image(&self, image: &ImageRef, destination: &Path) -> Result<(), ShelfError> {
        let response = self.send_with_retries(|| self.client.get(&image.url))?;
        let mut response = Self::handle_status(response)?;
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| ShelfError::Filesystem(err.to_string()))?;
        }
        let mut file =
            File::create(destination).map_err(|err| ShelfError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| ShelfError::Remote(err.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    config: RemoteConfig,
}

impl HttpClientFactory {
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }
}

impl ClientFactory for HttpClientFactory {
    type Client = HttpContentClient;

    fn create(&self) -> Result<Self::Client, ShelfError> {
        HttpContentClient::new(&self.config)
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
