//! Units of work flowing through the pipeline.

use chrono::NaiveDateTime;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generation time printed at the bottom of each table image.
pub type Timestamp = NaiveDateTime;

/// The value used when no timestamp is known (nothing stored yet, or the
/// footer could not be read). Sorts before every real timestamp.
pub fn zero_timestamp() -> Timestamp {
    NaiveDateTime::MIN
}

/// Identifies the last-known timestamp boundary held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey {
    pub net_provider: String,
    pub provider: String,
}

impl DedupKey {
    pub fn new(net_provider: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            net_provider: net_provider.into(),
            provider: provider.into(),
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.net_provider, self.provider)
    }
}

/// One decoded table image waiting for extraction.
///
/// Created by the producer, consumed exactly once by one worker.
pub struct Job {
    pub net_provider: String,
    pub provider: String,
    pub image: DynamicImage,
}

impl Job {
    pub fn new(
        net_provider: impl Into<String>,
        provider: impl Into<String>,
        image: DynamicImage,
    ) -> Self {
        Self {
            net_provider: net_provider.into(),
            provider: provider.into(),
            image,
        }
    }

    pub fn key(&self) -> DedupKey {
        DedupKey::new(&self.net_provider, &self.provider)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("net_provider", &self.net_provider)
            .field("provider", &self.provider)
            .field("image", &format_args!("{}x{}", self.image.width(), self.image.height()))
            .finish()
    }
}
