pub mod decoder;
pub mod encoder;
pub mod probe;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::application::ports::{FrameSink, OpenedVideo, VideoCodecPort};
use crate::domain::errors::{DomainError, DomainResult};

use self::{decoder::FfmpegFrameReader, encoder::FfmpegFrameWriter, probe::probe_video};

/// Video I/O through the ffmpeg / ffprobe binaries.
pub struct FfmpegCodec {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegCodec {
    /// Resolve both binaries now so a missing install fails at startup.
    pub fn locate(ffmpeg: &str, ffprobe: &str) -> Result<Self> {
        let ffmpeg = which::which(ffmpeg).with_context(|| format!("{ffmpeg} not found in PATH"))?;
        let ffprobe =
            which::which(ffprobe).with_context(|| format!("{ffprobe} not found in PATH"))?;
        info!("Using {} and {}", ffmpeg.display(), ffprobe.display());
        Ok(Self { ffmpeg, ffprobe })
    }
}

impl VideoCodecPort for FfmpegCodec {
    fn open_input(&self, input: &Path, size: u32) -> DomainResult<OpenedVideo> {
        let info = probe_video(&self.ffprobe, input)
            .map_err(|e| DomainError::failed(format!("{e:#}")))?;
        info!(
            "Opening {} ({}x{} @ {:.2} fps) at {}x{}",
            input.display(),
            info.width,
            info.height,
            info.fps,
            size,
            size
        );
        let reader = FfmpegFrameReader::spawn(&self.ffmpeg, input, size)
            .map_err(|e| DomainError::failed(format!("{e:#}")))?;
        Ok(OpenedVideo { frames: Box::new(reader), fps: info.fps })
    }

    fn open_output(&self, output: &Path, size: u32, fps: f64) -> DomainResult<Box<dyn FrameSink>> {
        let writer = FfmpegFrameWriter::spawn(&self.ffmpeg, output, size, fps)
            .map_err(|e| DomainError::failed(format!("{e:#}")))?;
        Ok(Box::new(writer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::FrameSource;
    use image::RgbImage;

    fn codec() -> Option<FfmpegCodec> {
        FfmpegCodec::locate("ffmpeg", "ffprobe").ok()
    }

    #[test]
    fn missing_input_fails_to_open() {
        let Some(codec) = codec() else { return };
        let err = codec.open_input(Path::new("/no/such/clip.mp4"), 64).err().unwrap();
        assert!(matches!(err, DomainError::OperationFailed(_)));
    }

    // Only runs where ffmpeg with libvpx is installed.
    #[test]
    fn encode_then_decode_keeps_frame_count() {
        let Some(codec) = codec() else { return };
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("clip_output.webm");

        let mut sink = codec.open_output(&out, 32, 10.0).unwrap();
        for i in 0..6u8 {
            sink.write_frame(&RgbImage::from_pixel(32, 32, image::Rgb([i * 40, 0, 0]))).unwrap();
        }
        if sink.finish().is_err() {
            return; // ffmpeg build without libvpx
        }
        assert!(std::fs::metadata(&out).unwrap().len() > 0);

        let mut opened = codec.open_input(&out, 32).unwrap();
        assert!((opened.fps - 10.0).abs() < 0.5);
        let mut n = 0;
        while let Some(frame) = opened.frames.next_frame().unwrap() {
            assert_eq!(frame.dimensions(), (32, 32));
            n += 1;
        }
        assert!((5..=7).contains(&n), "decoded {n} frames");
    }
}
