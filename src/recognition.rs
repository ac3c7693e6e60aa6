//! Per-column recognition policy.
//!
//! Centralising every engine setting here serves two purposes:
//!
//! 1. **Single source of truth**: changing how a column is read (a new
//!    glyph in the NAT vocabulary, a different local script) means editing
//!    exactly one place.
//!
//! 2. **Testability**: the registry is an immutable value built once at
//!    startup and passed by reference, so the policy for any column can be
//!    inspected without an engine.
//!
//! Short structured fields are read far more accurately when the engine is
//! restricted to the alphabet the field can actually contain, which is why
//! the whitelist is chosen per column rather than globally.

use crate::pipeline::schema::ColumnTag;

const LATIN: &str = "eng";

const WHITELIST_LOSS: &str = "0123456789%.";
const WHITELIST_PING: &str = "0123456789.";
const WHITELIST_SPEED: &str = "0123456789.KMGBNA";
/// Every glyph of the NAT type vocabulary ("Full Cone", "Symmetric UDP
/// Firewall", "Port Restricted Cone", "Blocked", ...).
const WHITELIST_NAT_TYPE: &str = "- ABDFNOPRSTUacdeiklmnoprstuwy";
const WHITELIST_TIMESTAMP: &str = "0123456789-: Generatd";

/// How the engine segments the crop it is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segmentation {
    /// The crop is a single text line (one cell).
    SingleLine,
    /// The crop is a uniform block of lines (a whole column).
    Block,
}

impl Segmentation {
    /// Tesseract page segmentation mode.
    pub fn psm(self) -> u8 {
        match self {
            Segmentation::SingleLine => 7,
            Segmentation::Block => 6,
        }
    }
}

/// Engine settings for one recognition call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionConfig {
    /// Language models, most specific first.
    pub languages: Vec<String>,
    /// Glyphs the engine may emit; `None` allows everything.
    pub whitelist: Option<String>,
    pub segmentation: Segmentation,
}

impl RecognitionConfig {
    fn latin(whitelist: Option<&str>) -> Self {
        Self {
            languages: vec![LATIN.to_string()],
            whitelist: whitelist.map(str::to_string),
            segmentation: Segmentation::SingleLine,
        }
    }

    fn local_and_latin(local: &str) -> Self {
        Self {
            languages: vec![local.to_string(), LATIN.to_string()],
            whitelist: None,
            segmentation: Segmentation::SingleLine,
        }
    }

    /// Same settings, different segmentation.
    pub fn with_segmentation(&self, segmentation: Segmentation) -> Self {
        Self {
            segmentation,
            ..self.clone()
        }
    }

    /// `+`-joined language list as the engine expects it.
    pub fn language_arg(&self) -> String {
        self.languages.join("+")
    }
}

/// Immutable column → engine-settings lookup.
#[derive(Debug, Clone)]
pub struct RecognitionRegistry {
    free_text: RecognitionConfig,
    loss: RecognitionConfig,
    ping: RecognitionConfig,
    speed: RecognitionConfig,
    nat_type: RecognitionConfig,
    timestamp: RecognitionConfig,
    version: RecognitionConfig,
}

impl RecognitionRegistry {
    /// Build the registry for tables whose free-text columns use `local`
    /// (a Tesseract language code) alongside Latin.
    pub fn new(local: &str) -> Self {
        Self {
            free_text: RecognitionConfig::local_and_latin(local),
            loss: RecognitionConfig::latin(Some(WHITELIST_LOSS)),
            ping: RecognitionConfig::latin(Some(WHITELIST_PING)),
            speed: RecognitionConfig::latin(Some(WHITELIST_SPEED)),
            nat_type: RecognitionConfig::latin(Some(WHITELIST_NAT_TYPE)),
            timestamp: RecognitionConfig::latin(Some(WHITELIST_TIMESTAMP)),
            version: RecognitionConfig::latin(None),
        }
    }

    /// Settings for reading single cells of `tag`.
    pub fn for_column(&self, tag: ColumnTag) -> &RecognitionConfig {
        match tag {
            ColumnTag::Group | ColumnTag::Remarks => &self.free_text,
            ColumnTag::Loss => &self.loss,
            ColumnTag::Ping | ColumnTag::GooglePing => &self.ping,
            ColumnTag::AvgSpeed | ColumnTag::MaxSpeed => &self.speed,
            ColumnTag::UdpNatType => &self.nat_type,
        }
    }

    /// Settings for the footer line carrying the generation time.
    pub fn timestamp(&self) -> &RecognitionConfig {
        &self.timestamp
    }

    /// Settings for the title line carrying the generator version.
    pub fn version(&self) -> &RecognitionConfig {
        &self.version
    }
}

impl Default for RecognitionRegistry {
    fn default() -> Self {
        Self::new("chi_sim")
    }
}
