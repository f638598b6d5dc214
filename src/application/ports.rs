use async_trait::async_trait;
use image::RgbImage;
use std::path::{Path, PathBuf};

use crate::domain::{detection::Detection, errors::DomainResult, model::ModelId};

/// Opaque pretrained detector: a square frame in, boxes out.
pub trait DetectorPort: Send + Sync {
    fn name(&self) -> &str;
    /// Side of the square frame `detect` expects.
    fn input_size(&self) -> u32;
    fn detect(&self, frame: &RgbImage) -> DomainResult<Vec<Detection>>;
}

pub trait OverlayPort: Send + Sync {
    fn draw(&self, frame: &mut RgbImage, detections: &[Detection]);
}

/// Decoded RGB frames of one input video, already scaled.
pub trait FrameSource {
    /// `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> DomainResult<Option<RgbImage>>;
}

pub trait FrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> DomainResult<()>;
    /// Flush and close the output. Must be called once the last frame is written.
    fn finish(&mut self) -> DomainResult<()>;
}

pub struct OpenedVideo {
    pub frames: Box<dyn FrameSource>,
    pub fps: f64,
}

pub trait VideoCodecPort: Send + Sync {
    fn open_input(&self, input: &Path, size: u32) -> DomainResult<OpenedVideo>;
    fn open_output(&self, output: &Path, size: u32, fps: f64) -> DomainResult<Box<dyn FrameSink>>;
}

#[async_trait]
pub trait MediaStorePort: Send + Sync {
    /// Persist an upload under its basename, overwriting any previous file.
    async fn save_upload(&self, file_name: &str, data: &[u8]) -> DomainResult<PathBuf>;
    fn outputs_dir(&self) -> PathBuf;
    /// URL under which a stored file is served, if it lives in the static tree.
    fn public_url(&self, path: &Path) -> Option<String>;
}

#[async_trait]
pub trait ModelCatalogPort: Send + Sync {
    async fn validate_model(&self, model: &ModelId) -> DomainResult<()>;
}
