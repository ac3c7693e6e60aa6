//! Text-recognition engine binding.
//!
//! The pipeline talks to recognition through the [`OcrEngine`] trait. Every
//! call carries its full [`RecognitionConfig`]; an engine never remembers a
//! language or whitelist from a previous call, so one job's column settings
//! cannot bleed into the next.
//!
//! Engines are acquired through an [`EngineFactory`], one per worker, and
//! released when the worker exits. They are never shared between workers.
//!
//! ## Why run the executable?
//!
//! [`TesseractEngine`] spawns `tesseract` once per crop instead of linking
//! libtesseract. Process isolation means a crop that crashes or wedges the
//! engine takes down one call, not the worker, and no native toolchain is
//! needed to build this crate. Calls block; the coordinator runs them inside
//! `spawn_blocking`.

use crate::error::RecognitionError;
use crate::recognition::RecognitionConfig;
use image::GrayImage;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;
use tracing::debug;

/// A recognition engine instance owned by one worker.
pub trait OcrEngine {
    /// Recognize the text in `image` using exactly the settings in `config`.
    fn recognize(
        &mut self,
        image: &GrayImage,
        config: &RecognitionConfig,
    ) -> Result<String, RecognitionError>;
}

/// Produces engine instances for workers.
pub trait EngineFactory: Send + Sync + 'static {
    type Engine: OcrEngine + Send + 'static;

    /// Acquire a fresh engine.
    ///
    /// # Errors
    /// [`RecognitionError::EngineUnavailable`] when the engine cannot be
    /// initialised. The job that asked for it fails; the next job retries.
    fn create(&self) -> Result<Self::Engine, RecognitionError>;
}

/// Factory for [`TesseractEngine`].
#[derive(Debug, Clone)]
pub struct TesseractFactory {
    binary: PathBuf,
    threads: usize,
}

impl TesseractFactory {
    pub fn new(binary: impl Into<PathBuf>, threads: usize) -> Self {
        Self {
            binary: binary.into(),
            threads: threads.max(1),
        }
    }

    /// Factory matching a pipeline configuration.
    pub fn from_config(config: &crate::config::PipelineConfig) -> Self {
        Self::new(config.tesseract_binary.clone(), config.engine_threads)
    }
}

impl EngineFactory for TesseractFactory {
    type Engine = TesseractEngine;

    fn create(&self) -> Result<TesseractEngine, RecognitionError> {
        TesseractEngine::new(self.binary.clone(), self.threads)
    }
}

/// Recognition through the `tesseract` command-line program.
pub struct TesseractEngine {
    binary: PathBuf,
    threads: usize,
    /// Scratch space for crops, removed when the engine is dropped.
    scratch: TempDir,
    calls: u64,
}

impl TesseractEngine {
    /// Probe the executable and set up a scratch directory.
    pub fn new(binary: PathBuf, threads: usize) -> Result<Self, RecognitionError> {
        let probe = Command::new(&binary).arg("--version").output().map_err(|e| {
            RecognitionError::EngineUnavailable {
                detail: format!("cannot run '{}': {e}", binary.display()),
            }
        })?;
        if !probe.status.success() {
            return Err(RecognitionError::EngineUnavailable {
                detail: format!("'{} --version' exited with {}", binary.display(), probe.status),
            });
        }
        let version = String::from_utf8_lossy(&probe.stdout);
        debug!(
            "tesseract ready: {}",
            version.lines().next().unwrap_or("unknown version")
        );

        let scratch = tempfile::Builder::new().prefix("speedgrid-").tempdir()?;
        Ok(Self {
            binary,
            threads,
            scratch,
            calls: 0,
        })
    }

    fn command(&self, input: &std::path::Path, config: &RecognitionConfig) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(input)
            .arg("stdout")
            .arg("-l")
            .arg(config.language_arg())
            .arg("--psm")
            .arg(config.segmentation.psm().to_string())
            .arg("--oem")
            .arg("3")
            .env("OMP_THREAD_LIMIT", self.threads.to_string());
        if let Some(ref whitelist) = config.whitelist {
            cmd.arg("-c")
                .arg(format!("tessedit_char_whitelist={whitelist}"));
        }
        cmd
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(
        &mut self,
        image: &GrayImage,
        config: &RecognitionConfig,
    ) -> Result<String, RecognitionError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(String::new());
        }

        self.calls += 1;
        let input = self.scratch.path().join(format!("crop-{}.png", self.calls));
        image
            .save(&input)
            .map_err(|e| RecognitionError::EngineFailed {
                detail: format!("cannot write crop: {e}"),
            })?;

        let output = self.command(&input, config).output();
        // Best effort: the whole directory goes away with the engine anyway.
        let _ = std::fs::remove_file(&input);
        let output = output?;

        if !output.status.success() {
            return Err(RecognitionError::EngineFailed {
                detail: format!(
                    "tesseract exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
