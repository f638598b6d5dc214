use image::{imageops::FilterType, ImageFormat, ImageReader, RgbImage};
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::ports::{
    DetectorPort, FrameSink, OpenedVideo, OverlayPort, VideoCodecPort,
};
use crate::domain::{
    detection::{ClassPrediction, Detection},
    errors::{DomainError, DomainResult},
    stream::{summarize_detections, MaxConfidence},
};

/// What an annotator hands back: the predictions and, when something was
/// drawn, the annotated file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationOutcome {
    pub predictions: Vec<ClassPrediction>,
    pub out_path: Option<PathBuf>,
}

impl AnnotationOutcome {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Single-frame path: decode, resize, detect once, draw, save.
pub struct ImageAnnotator {
    detector: Arc<dyn DetectorPort>,
    overlay: Arc<dyn OverlayPort>,
    output_dir: PathBuf,
}

impl ImageAnnotator {
    pub fn new(
        detector: Arc<dyn DetectorPort>,
        overlay: Arc<dyn OverlayPort>,
        output_dir: PathBuf,
    ) -> Self {
        Self { detector, overlay, output_dir }
    }

    pub fn output_path_for(&self, input: &Path) -> DomainResult<PathBuf> {
        let name = input.file_name().ok_or_else(|| no_file_name(input))?;
        Ok(self.output_dir.join(name))
    }

    pub fn annotate(&self, input: &Path) -> DomainResult<AnnotationOutcome> {
        let decoded = decode_image(input)?;
        let size = self.detector.input_size();
        let mut frame = image::imageops::resize(&decoded, size, size, FilterType::Triangle);

        let detections = self.detector.detect(&frame)?;
        if detections.is_empty() {
            info!("No detections in {}", input.display());
            return Ok(AnnotationOutcome::empty());
        }
        debug!("{}: {}", input.display(), summarize_detections(&detections));

        self.overlay.draw(&mut frame, &detections);

        let out_path = self.output_path_for(input)?;
        create_output_dir(&self.output_dir)?;
        // Extensiones que `image` no reconoce (p. ej. `.jpe`) se escriben como JPEG.
        let format = ImageFormat::from_path(&out_path).unwrap_or(ImageFormat::Jpeg);
        frame
            .save_with_format(&out_path, format)
            .map_err(|e| DomainError::failed(format!("writing {}: {e}", out_path.display())))?;

        info!("Annotated image written to {}", out_path.display());
        Ok(AnnotationOutcome {
            predictions: detections.iter().map(ClassPrediction::from).collect(),
            out_path: Some(out_path),
        })
    }
}

fn decode_image(path: &Path) -> DomainResult<RgbImage> {
    let file = fs::File::open(path).map_err(|e| {
        let msg = format!("image could not be loaded from {}: {e}", path.display());
        DomainError::invalid_input(msg)
    })?;
    let img = ImageReader::new(BufReader::new(file))
        .with_guessed_format()
        .map_err(|e| DomainError::invalid_input(format!("image could not be loaded: {e}")))?
        .decode()
        .map_err(|e| DomainError::invalid_input(format!("image could not be decoded: {e}")))?;
    Ok(img.to_rgb8())
}

/// Frame loop over a whole clip.
///
/// Only every `stride`-th frame goes through the detector. Every frame is
/// written to the output; skipped frames carry the boxes of the last sampled
/// frame, so the output keeps the input's duration.
pub struct VideoAnnotator {
    detector: Arc<dyn DetectorPort>,
    overlay: Arc<dyn OverlayPort>,
    codec: Arc<dyn VideoCodecPort>,
    output_dir: PathBuf,
    stride: u64,
}

impl VideoAnnotator {
    pub fn new(
        detector: Arc<dyn DetectorPort>,
        overlay: Arc<dyn OverlayPort>,
        codec: Arc<dyn VideoCodecPort>,
        output_dir: PathBuf,
        stride: u64,
    ) -> Self {
        Self { detector, overlay, codec, output_dir, stride: stride.max(1) }
    }

    /// `clip.mp4` -> `<outputs>/clip_output.webm`
    pub fn output_path_for(&self, input: &Path) -> DomainResult<PathBuf> {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| no_file_name(input))?;
        Ok(self.output_dir.join(format!("{stem}_output.webm")))
    }

    pub fn annotate(&self, input: &Path) -> DomainResult<AnnotationOutcome> {
        let size = self.detector.input_size();
        let out_path = self.output_path_for(input)?;
        create_output_dir(&self.output_dir)?;

        let mut opened = self.codec.open_input(input, size).map_err(|e| {
            warn!("Could not open video file {}: {}", input.display(), e);
            DomainError::failed(format!("could not open video file: {}", input.display()))
        })?;
        let mut sink = self.codec.open_output(&out_path, size, opened.fps)?;

        let mut aggregate = MaxConfidence::new();
        let result = self.run_frames(input, &mut opened, sink.as_mut(), &mut aggregate);
        let index = match result.and_then(|n| sink.finish().map(|_| n)) {
            Ok(n) => n,
            Err(e) => {
                drop(sink);
                // Sin resultados parciales: se borra lo que el encoder llegó a escribir.
                let _ = fs::remove_file(&out_path);
                return Err(e);
            }
        };

        if index == 0 {
            return Err(DomainError::failed(format!("no frames decoded from {}", input.display())));
        }

        let written = fs::metadata(&out_path).map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            warn!("Output video was not created: {}", out_path.display());
            return Err(DomainError::failed(
                "video processing failed, output video was not created",
            ));
        }

        info!(
            "Video saved at {} ({} frames, {} sampled, {} classes)",
            out_path.display(),
            index,
            index.div_ceil(self.stride),
            aggregate.len()
        );
        Ok(AnnotationOutcome {
            predictions: aggregate.finish(),
            out_path: Some(out_path),
        })
    }
}

fn no_file_name(input: &Path) -> DomainError {
    DomainError::invalid_input(format!("no file name in {}", input.display()))
}

fn create_output_dir(dir: &Path) -> DomainResult<()> {
    fs::create_dir_all(dir)
        .map_err(|e| DomainError::failed(format!("creating {}: {e}", dir.display())))
}

impl VideoAnnotator {
    /// Returns how many frames went through the loop.
    fn run_frames(
        &self,
        input: &Path,
        opened: &mut OpenedVideo,
        sink: &mut dyn FrameSink,
        aggregate: &mut MaxConfidence,
    ) -> DomainResult<u64> {
        let mut last: Vec<Detection> = Vec::new();
        let mut index: u64 = 0;

        while let Some(mut frame) = opened.frames.next_frame()? {
            if index % self.stride == 0 {
                last = self.detector.detect(&frame)?;
                aggregate.fold(&last);
            }
            self.overlay.draw(&mut frame, &last);
            sink.write_frame(&frame)?;
            index += 1;
            if index % 100 == 0 {
                debug!("Processed {} frames of {}", index, input.display());
            }
        }
        Ok(index)
    }
}
