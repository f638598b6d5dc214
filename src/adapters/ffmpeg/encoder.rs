use anyhow::{Context, Result};
use image::RgbImage;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::{self, JoinHandle};

use crate::application::ports::FrameSink;
use crate::domain::errors::{DomainError, DomainResult};

/// Raw RGB24 frames in, VP8/WebM file out.
pub struct FfmpegFrameWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    // stderr se vacía en un hilo para que ffmpeg nunca se bloquee escribiendo.
    stderr: Option<JoinHandle<String>>,
    size: u32,
}

impl FfmpegFrameWriter {
    pub fn spawn(ffmpeg: &Path, output: &Path, size: u32, fps: f64) -> Result<Self> {
        let mut child = Command::new(ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args([
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                &format!("{size}x{size}"),
                "-r",
                &format!("{fps:.3}"),
                "-i",
                "-",
                "-an",
                "-c:v",
                "libvpx",
                "-b:v",
                "1M",
                "-pix_fmt",
                "yuv420p",
                "-f",
                "webm",
            ])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning {} for {}", ffmpeg.display(), output.display()))?;
        Self::attach(child, size)
    }

    fn attach(mut child: Child, size: u32) -> Result<Self> {
        let stdin = child.stdin.take().context("ffmpeg stdin not captured")?;
        let mut err_pipe = child.stderr.take().context("ffmpeg stderr not captured")?;
        let stderr = thread::spawn(move || {
            let mut text = String::new();
            let _ = err_pipe.read_to_string(&mut text);
            text
        });
        Ok(Self { child, stdin: Some(stdin), stderr: Some(stderr), size })
    }
}

impl FrameSink for FfmpegFrameWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> DomainResult<()> {
        if frame.dimensions() != (self.size, self.size) {
            return Err(DomainError::failed(format!(
                "frame is {:?}, encoder expects {}x{}",
                frame.dimensions(),
                self.size,
                self.size
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| DomainError::failed("encoder already finished"))?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| DomainError::failed(format!("writing frame to encoder: {e}")))
    }

    fn finish(&mut self) -> DomainResult<()> {
        // Cerrar stdin para que ffmpeg vacíe y cierre el contenedor.
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| DomainError::failed(format!("waiting for ffmpeg encoder: {e}")))?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(DomainError::failed(format!(
                "ffmpeg encoder exited with {status}: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegFrameWriter {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            drop(self.stdin.take());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chatty_encoder_does_not_block_finish() {
        let Ok(sh) = which::which("sh") else { return };
        // Más de lo que cabe en el buffer de un pipe, antes de leer stdin.
        let script = "head -c 200000 /dev/zero | tr '\\0' x >&2; cat >/dev/null; exit 3";
        let child = Command::new(sh)
            .args(["-c", script])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let mut writer = FfmpegFrameWriter::attach(child, 2).unwrap();

        writer.write_frame(&RgbImage::new(2, 2)).unwrap();
        let err = writer.finish().unwrap_err();
        assert!(matches!(err, DomainError::OperationFailed(ref msg) if msg.contains("xxxx")));
    }
}
