//! Job intake: which images exist and how they are loaded.
//!
//! Discovering providers (walking the published result pages) happens
//! outside this crate. What arrives here is a [`ProviderNode`] tree per net
//! provider; it is flattened into [`ImageEntry`] triples and each entry is
//! fetched and decoded into a [`Job`].
//!
//! ## Why decode off the runtime?
//!
//! Decoding a multi-megapixel PNG takes tens of milliseconds of pure CPU.
//! Doing it on a runtime thread would stall every other task scheduled there,
//! so it runs inside `spawn_blocking` like every other CPU-bound stage.

use crate::config::PipelineConfig;
use crate::error::{JobError, PipelineError};
use crate::job::{DedupKey, Job};
use futures::stream::{self, BoxStream, StreamExt};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A provider as listed by the directory: either one image, or a named set
/// of subgroups that each carry their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderNode {
    Leaf { name: String, image_url: String },
    Group { name: String, children: Vec<ProviderNode> },
}

impl ProviderNode {
    pub fn name(&self) -> &str {
        match self {
            ProviderNode::Leaf { name, .. } | ProviderNode::Group { name, .. } => name,
        }
    }

    /// Every image below this node, depth first.
    ///
    /// Subgroup images keep the name of the subgroup that carries them.
    pub fn flatten(&self, net_provider: &str) -> Vec<ImageEntry> {
        let mut out = Vec::new();
        self.collect(net_provider, &mut out);
        out
    }

    fn collect(&self, net_provider: &str, out: &mut Vec<ImageEntry>) {
        match self {
            ProviderNode::Leaf { name, image_url } => out.push(ImageEntry {
                net_provider: net_provider.to_string(),
                provider: name.clone(),
                image_url: image_url.clone(),
            }),
            ProviderNode::Group { children, .. } => {
                for child in children {
                    child.collect(net_provider, out);
                }
            }
        }
    }
}

/// One image to extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub net_provider: String,
    pub provider: String,
    pub image_url: String,
}

impl ImageEntry {
    pub fn key(&self) -> DedupKey {
        DedupKey::new(&self.net_provider, &self.provider)
    }
}

/// Loads and decodes the image behind an [`ImageEntry`].
pub trait ImageFetcher: Send + Sync + 'static {
    /// # Errors
    /// [`JobError::Transport`] when the bytes cannot be obtained,
    /// [`JobError::Decode`] when they are not an image.
    fn fetch(&self, entry: &ImageEntry)
        -> impl Future<Output = Result<DynamicImage, JobError>> + Send;
}

/// Check if the location looks like a URL.
pub fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Downloads `http(s)://` locations; anything else is read as a local path.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PipelineError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        Self::new(config.fetch_timeout_secs)
    }

    async fn download(&self, entry: &ImageEntry) -> Result<Vec<u8>, JobError> {
        let url = &entry.image_url;
        let transport = |reason: String| JobError::Transport {
            key: entry.key(),
            url: url.clone(),
            reason,
        };

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                transport(format!("timed out after {}s", self.timeout_secs))
            } else {
                transport(e.to_string())
            }
        })?;
        if !response.status().is_success() {
            return Err(transport(format!("HTTP {}", response.status())));
        }
        let bytes = response.bytes().await.map_err(|e| transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn read_local(&self, entry: &ImageEntry) -> Result<Vec<u8>, JobError> {
        tokio::fs::read(&entry.image_url)
            .await
            .map_err(|e| JobError::Transport {
                key: entry.key(),
                url: entry.image_url.clone(),
                reason: e.to_string(),
            })
    }
}

impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, entry: &ImageEntry) -> Result<DynamicImage, JobError> {
        let bytes = if is_url(&entry.image_url) {
            info!("Downloading {} from {}", entry.key(), entry.image_url);
            self.download(entry).await?
        } else {
            self.read_local(entry).await?
        };
        debug!("{}: {} bytes", entry.key(), bytes.len());
        decode(entry, bytes).await
    }
}

/// Decode image bytes on the blocking pool.
pub async fn decode(entry: &ImageEntry, bytes: Vec<u8>) -> Result<DynamicImage, JobError> {
    let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await
        .map_err(|e| JobError::Internal {
            key: entry.key(),
            detail: format!("decode task panicked: {e}"),
        })?;
    decoded.map_err(|e| JobError::Decode {
        key: entry.key(),
        url: entry.image_url.clone(),
        detail: e.to_string(),
    })
}

/// Fetch every entry in order, yielding a [`Job`] or the failure for it.
///
/// Images are loaded lazily as the stream is polled, so a bounded consumer
/// also bounds how many decoded bitmaps exist at once.
pub fn job_stream<F: ImageFetcher>(
    entries: Vec<ImageEntry>,
    fetcher: Arc<F>,
) -> BoxStream<'static, Result<Job, JobError>> {
    stream::iter(entries)
        .then(move |entry| {
            let fetcher = Arc::clone(&fetcher);
            async move {
                let image = fetcher.fetch(&entry).await?;
                Ok::<_, JobError>(Job::new(entry.net_provider, entry.provider, image))
            }
        })
        .boxed()
}
