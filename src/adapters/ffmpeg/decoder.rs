use anyhow::{Context, Result};
use image::RgbImage;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, warn};

use crate::application::ports::FrameSource;
use crate::domain::errors::{DomainError, DomainResult};

/// Frames of one clip, decoded by ffmpeg straight to `size`×`size` RGB24.
pub struct FfmpegFrameReader {
    child: Child,
    stdout: ChildStdout,
    size: u32,
    frames: u64,
    done: bool,
}

impl FfmpegFrameReader {
    pub fn spawn(ffmpeg: &Path, input: &Path, size: u32) -> Result<Self> {
        let mut child = Command::new(ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(input)
            .args([
                "-an",
                "-vf",
                &format!("scale={size}:{size}"),
                "-pix_fmt",
                "rgb24",
                "-f",
                "rawvideo",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawning {} for {}", ffmpeg.display(), input.display()))?;
        Self::attach(child, size)
    }

    fn attach(mut child: Child, size: u32) -> Result<Self> {
        let stdout = child.stdout.take().context("ffmpeg stdout not captured")?;
        Ok(Self { child, stdout, size, frames: 0, done: false })
    }

    fn frame_len(&self) -> usize {
        (self.size * self.size * 3) as usize
    }

    fn close(&mut self) -> DomainResult<()> {
        self.done = true;
        let status = self
            .child
            .wait()
            .map_err(|e| DomainError::failed(format!("waiting for ffmpeg decoder: {e}")))?;
        if !status.success() {
            // También tras haber leído frames: un clip truncado no es un resultado.
            warn!("ffmpeg decoder exited with {} after {} frames", status, self.frames);
            return Err(DomainError::failed(format!(
                "ffmpeg decoder exited with {status} after {} frames",
                self.frames
            )));
        }
        debug!("Decoder finished after {} frames", self.frames);
        Ok(())
    }
}

impl FrameSource for FfmpegFrameReader {
    fn next_frame(&mut self) -> DomainResult<Option<RgbImage>> {
        if self.done {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_len()];
        let filled = read_full(&mut self.stdout, &mut buf)
            .map_err(|e| DomainError::failed(format!("reading decoded frame: {e}")))?;

        if filled < buf.len() {
            if filled > 0 {
                warn!("Discarding truncated trailing frame ({} of {} bytes)", filled, buf.len());
            }
            self.close()?;
            return Ok(None);
        }

        self.frames += 1;
        let frame = RgbImage::from_raw(self.size, self.size, buf)
            .ok_or_else(|| DomainError::failed("decoded frame has wrong size"))?;
        Ok(Some(frame))
    }
}

impl Drop for FfmpegFrameReader {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Like `read_exact`, but reports how much was read when the stream ends early.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out data in small chunks to exercise the refill loop.
    struct Trickle<'a>(&'a [u8]);
    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.0.len()).min(3);
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn read_full_fills_across_short_reads() {
        let data: Vec<u8> = (0..10).collect();
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut Trickle(&data), &mut buf).unwrap(), 8);
        assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7]);
    }

    /// A fake decoder: `sh` prints `bytes` to stdout and exits with `code`.
    fn scripted_reader(bytes: usize, code: i32) -> Option<FfmpegFrameReader> {
        let sh = which::which("sh").ok()?;
        let script = format!("head -c {bytes} /dev/zero; exit {code}");
        let child = Command::new(sh)
            .args(["-c", &script])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .ok()?;
        FfmpegFrameReader::attach(child, 2).ok()
    }

    #[test]
    fn clean_exit_ends_the_stream() {
        let Some(mut reader) = scripted_reader(24, 0) else { return };
        assert!(reader.next_frame().unwrap().is_some());
        assert!(reader.next_frame().unwrap().is_some());
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn failed_exit_after_frames_is_an_error() {
        let Some(mut reader) = scripted_reader(12, 1) else { return };
        assert!(reader.next_frame().unwrap().is_some());
        let err = reader.next_frame().unwrap_err();
        assert!(matches!(err, DomainError::OperationFailed(_)), "got {err:?}");
    }

    #[test]
    fn read_full_reports_partial_at_eof() {
        let data = [1u8, 2, 3, 4, 5];
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut Trickle(&data), &mut buf).unwrap(), 5);
    }
}
