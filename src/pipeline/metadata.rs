//! Single-region reads that do not need the grid.
//!
//! The footer timestamp is read for every job, including the ones the dedup
//! gate is about to drop, so it must stay one small crop and one engine call.

use crate::engine::OcrEngine;
use crate::error::RecognitionError;
use crate::job::Timestamp;
use crate::pipeline::cells::crop;
use crate::pipeline::normalize::{extract_version, normalize_timestamp};
use crate::recognition::RecognitionRegistry;
use image::GrayImage;
use tracing::{debug, warn};

pub struct MetadataReader<'a> {
    registry: &'a RecognitionRegistry,
    row_height: u32,
    inset: u32,
}

impl<'a> MetadataReader<'a> {
    pub fn new(registry: &'a RecognitionRegistry, row_height: u32, inset: u32) -> Self {
        Self {
            registry,
            row_height,
            inset,
        }
    }

    /// Generation time from the bottom band (left half, one row tall).
    ///
    /// Unparseable text yields the zero timestamp; only an engine failure is
    /// an error.
    pub fn read_timestamp<E: OcrEngine + ?Sized>(
        &self,
        engine: &mut E,
        gray: &GrayImage,
    ) -> Result<Timestamp, RecognitionError> {
        let (w, h) = gray.dimensions();
        let region = crop(gray, 0, w / 2, h.saturating_sub(self.row_height), h, self.inset);
        let text = engine.recognize(&region, self.registry.timestamp())?;
        let ts = normalize_timestamp(&text);
        debug!("footer {:?} -> {}", text.trim(), ts);
        Ok(ts)
    }

    /// Generator version from the title band (full width, one row tall).
    pub fn read_version<E: OcrEngine + ?Sized>(
        &self,
        engine: &mut E,
        gray: &GrayImage,
    ) -> Option<String> {
        let region = crop(gray, 0, gray.width(), 0, self.row_height, self.inset);
        match engine.recognize(&region, self.registry.version()) {
            Ok(text) => extract_version(&text),
            Err(e) => {
                warn!("title read failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::zero_timestamp;
    use crate::recognition::RecognitionConfig;
    use chrono::NaiveDate;

    struct Scripted {
        reply: Result<&'static str, ()>,
        seen: Vec<(u32, u32, Option<String>)>,
    }

    impl OcrEngine for Scripted {
        fn recognize(
            &mut self,
            image: &GrayImage,
            config: &RecognitionConfig,
        ) -> Result<String, RecognitionError> {
            self.seen
                .push((image.width(), image.height(), config.whitelist.clone()));
            self.reply
                .map(str::to_string)
                .map_err(|_| RecognitionError::EngineFailed {
                    detail: "scripted".into(),
                })
        }
    }

    #[test]
    fn timestamp_comes_from_bottom_left_band() {
        let registry = RecognitionRegistry::default();
        let reader = MetadataReader::new(&registry, 30, 1);
        let mut engine = Scripted {
            reply: Ok("Generated at 2020-12-11 20:30:03\n"),
            seen: Vec::new(),
        };
        let ts = reader
            .read_timestamp(&mut engine, &GrayImage::new(800, 1471))
            .unwrap();
        assert_eq!(
            ts,
            NaiveDate::from_ymd_opt(2020, 12, 11)
                .unwrap()
                .and_hms_opt(20, 30, 3)
                .unwrap()
        );
        assert_eq!(engine.seen.len(), 1);
        let (w, h, wl) = &engine.seen[0];
        assert_eq!((*w, *h), (398, 28));
        assert_eq!(wl.as_deref(), registry.timestamp().whitelist.as_deref());
    }

    #[test]
    fn garbled_footer_is_zero_timestamp() {
        let registry = RecognitionRegistry::default();
        let reader = MetadataReader::new(&registry, 30, 1);
        let mut engine = Scripted {
            reply: Ok("Gen rated at"),
            seen: Vec::new(),
        };
        let ts = reader
            .read_timestamp(&mut engine, &GrayImage::new(100, 100))
            .unwrap();
        assert_eq!(ts, zero_timestamp());
    }

    #[test]
    fn engine_failure_is_propagated_for_timestamp() {
        let registry = RecognitionRegistry::default();
        let reader = MetadataReader::new(&registry, 30, 1);
        let mut engine = Scripted {
            reply: Err(()),
            seen: Vec::new(),
        };
        assert!(reader
            .read_timestamp(&mut engine, &GrayImage::new(100, 100))
            .is_err());
    }

    #[test]
    fn version_comes_from_title_band() {
        let registry = RecognitionRegistry::default();
        let reader = MetadataReader::new(&registry, 30, 1);
        let mut engine = Scripted {
            reply: Ok("SSRSpeed Result Table ( v2.7.1 )"),
            seen: Vec::new(),
        };
        let v = reader.read_version(&mut engine, &GrayImage::new(800, 1471));
        assert_eq!(v.as_deref(), Some("2.7.1"));
        assert_eq!((engine.seen[0].0, engine.seen[0].1), (798, 28));

        engine.reply = Err(());
        assert_eq!(reader.read_version(&mut engine, &GrayImage::new(800, 1471)), None);
    }
}
