use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::model::{InferenceConfig, ModelId, YoloParams};

/// Server configuration loaded from environment variables (and `.env`).
///
/// | Env Var               | Default              |
/// |-----------------------|----------------------|
/// | `HOST`                | `0.0.0.0`            |
/// | `PORT`                | `8090`               |
/// | `MODEL_PATH`          | `models/best.onnx`   |
/// | `STATIC_DIR`          | `static`             |
/// | `FONT_PATH`           | unset (boxes only)   |
/// | `CONF_THRESHOLD`      | `0.25`               |
/// | `IOU_THRESHOLD`       | `0.45`               |
/// | `MAX_DETECTIONS`      | `100`                |
/// | `VIDEO_SAMPLE_STRIDE` | `2`                  |
/// | `MAX_UPLOAD_MB`       | `200`                |
/// | `FFMPEG_BIN`          | `ffmpeg`             |
/// | `FFPROBE_BIN`         | `ffprobe`            |
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub model_path: String,
    pub static_dir: PathBuf,
    pub font_path: Option<PathBuf>,
    pub yolo: YoloParams,
    pub video_sample_stride: u64,
    pub max_upload_bytes: usize,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable source, for tests.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = YoloParams::default();

        let conf_threshold: f32 = parse_or(&get, "CONF_THRESHOLD", defaults.conf_threshold)?;
        let iou_threshold: f32 = parse_or(&get, "IOU_THRESHOLD", defaults.iou_threshold)?;
        for (key, v) in [("CONF_THRESHOLD", conf_threshold), ("IOU_THRESHOLD", iou_threshold)] {
            if !(0.0..=1.0).contains(&v) {
                bail!("{key} must be within 0..1, got {v}");
            }
        }

        let video_sample_stride: u64 = parse_or(&get, "VIDEO_SAMPLE_STRIDE", 2)?;
        if video_sample_stride == 0 {
            bail!("VIDEO_SAMPLE_STRIDE must be at least 1");
        }

        let max_upload_mb: usize = parse_or(&get, "MAX_UPLOAD_MB", 200)?;

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "PORT", 8090)?,
            model_path: get("MODEL_PATH").unwrap_or_else(|| "models/best.onnx".into()),
            static_dir: get("STATIC_DIR").unwrap_or_else(|| "static".into()).into(),
            font_path: get("FONT_PATH").filter(|s| !s.trim().is_empty()).map(PathBuf::from),
            yolo: YoloParams {
                input_size: defaults.input_size,
                conf_threshold,
                iou_threshold,
                max_detections: parse_or(&get, "MAX_DETECTIONS", defaults.max_detections)?,
            },
            video_sample_stride,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            ffmpeg_bin: get("FFMPEG_BIN").unwrap_or_else(|| "ffmpeg".into()),
            ffprobe_bin: get("FFPROBE_BIN").unwrap_or_else(|| "ffprobe".into()),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn inference(&self) -> InferenceConfig {
        let name = PathBuf::from(&self.model_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "yolo".into());
        InferenceConfig {
            model: ModelId { name, onnx_path: self.model_path.clone() },
            params: self.yolo.clone(),
        }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8090");
        assert_eq!(cfg.yolo.input_size, 416);
        assert_eq!(cfg.video_sample_stride, 2);
        assert_eq!(cfg.max_upload_bytes, 200 * 1024 * 1024);
        assert!(cfg.font_path.is_none());
        assert_eq!(cfg.inference().model.name, "best");
    }

    #[test]
    fn overrides() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("PORT", "9000"),
            ("CONF_THRESHOLD", "0.5"),
            ("VIDEO_SAMPLE_STRIDE", "3"),
            ("MODEL_PATH", "/m/signs.onnx"),
            ("FONT_PATH", "/f/DejaVuSans.ttf"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.yolo.conf_threshold, 0.5);
        assert_eq!(cfg.video_sample_stride, 3);
        assert_eq!(cfg.inference().model.name, "signs");
        assert_eq!(cfg.font_path, Some(PathBuf::from("/f/DejaVuSans.ttf")));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(AppConfig::from_lookup(lookup(&[("PORT", "http")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("IOU_THRESHOLD", "1.5")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("VIDEO_SAMPLE_STRIDE", "0")])).is_err());
    }
}
