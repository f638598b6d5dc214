use anyhow::{Context, Result};
use image::{imageops::FilterType, RgbImage};
use ndarray::{s, Array4, ArrayView2, ArrayViewD, Axis, Ix2, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::value::Tensor;
use std::fs;
use std::sync::Mutex;
use tracing::info;

use crate::application::ports::DetectorPort;
use crate::domain::detection::Detection;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::model::{label_for, InferenceConfig, YoloParams};

/// YOLOv8-style export: one output shaped `[1, 4 + classes, anchors]`,
/// boxes as centre/width/height in input pixels.
pub struct OnnxYoloEngine {
    name: String,
    params: YoloParams,
    // `Session::run` needs `&mut`; requests share one session.
    session: Mutex<Session>,
}

impl OnnxYoloEngine {
    pub fn load(cfg: &InferenceConfig) -> Result<Self> {
        let builder = Session::builder()?.with_intra_threads(4)?;

        // CUDA es opcional: si no está disponible se registra un aviso y seguimos en CPU.
        let builder = builder.with_execution_providers([CUDAExecutionProvider::default().build()])?;

        let model_bytes = fs::read(&cfg.model.onnx_path)
            .with_context(|| format!("reading model {}", cfg.model.onnx_path))?;
        let session = builder.commit_from_memory(&model_bytes)?;

        info!(
            "Model {} loaded from {} (input {}px, conf {}, iou {})",
            cfg.model.name,
            cfg.model.onnx_path,
            cfg.params.input_size,
            cfg.params.conf_threshold,
            cfg.params.iou_threshold
        );

        Ok(Self {
            name: cfg.model.name.clone(),
            params: cfg.params.clone(),
            session: Mutex::new(session),
        })
    }

    fn infer(&self, rgb: &RgbImage) -> Result<Vec<Detection>> {
        let imgsz = self.params.input_size as usize;
        let input = to_nchw(rgb, self.params.input_size);

        let input_shape = vec![1_i64, 3, imgsz as i64, imgsz as i64];
        let (data, _) = input.into_raw_vec_and_offset();
        let input_tensor = Tensor::from_array((input_shape, data))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("detector session lock poisoned"))?;
        let outputs = session.run(ort::inputs![input_tensor])?;
        let (shape_out, data_out) = outputs[0].try_extract_tensor::<f32>()?;

        let dims: Vec<usize> = shape_out.iter().map(|&x| x as usize).collect();
        let array_view = ArrayViewD::from_shape(IxDyn(&dims), data_out)?;
        let view = array_view
            .index_axis(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .context("unexpected output rank")?;

        let sx = rgb.width() as f32 / imgsz as f32;
        let sy = rgb.height() as f32 / imgsz as f32;
        Ok(decode_predictions(view, sx, sy, &self.params))
    }
}

impl DetectorPort for OnnxYoloEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_size(&self) -> u32 {
        self.params.input_size
    }

    fn detect(&self, frame: &RgbImage) -> DomainResult<Vec<Detection>> {
        self.infer(frame)
            .map_err(|e| DomainError::failed(format!("inference failed: {e:#}")))
    }
}

/// RGB -> `[1, 3, s, s]` in 0..1. Frames already at `size` skip the resize.
fn to_nchw(rgb: &RgbImage, size: u32) -> Array4<f32> {
    let resized;
    let src = if rgb.dimensions() == (size, size) {
        rgb
    } else {
        resized = image::imageops::resize(rgb, size, size, FilterType::Triangle);
        &resized
    };

    let s = size as usize;
    let mut input = Array4::<f32>::zeros((1, 3, s, s));
    for (x, y, pixel) in src.enumerate_pixels() {
        input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
        input[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
        input[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
    }
    input
}

/// Turn the `[4 + classes, anchors]` head into labelled boxes: threshold,
/// per-class NMS, then keep the best `max_detections`.
pub(crate) fn decode_predictions(
    view: ArrayView2<f32>,
    sx: f32,
    sy: f32,
    params: &YoloParams,
) -> Vec<Detection> {
    let num_candidates = view.shape()[1];
    let mut detections = Vec::new();

    for i in 0..num_candidates {
        let scores = view.slice(s![4.., i]);
        // NaN no cuenta como puntuación.
        let best = scores
            .indexed_iter()
            .filter(|(_, score)| !score.is_nan())
            .max_by(|(_, a), (_, b)| a.total_cmp(b));
        let Some((class_id, &max_score)) = best else { continue };

        if max_score <= params.conf_threshold {
            continue;
        }
        // El modelo podría exponer más clases que la tabla; esas se descartan.
        let Some(label) = label_for(class_id) else { continue };

        let cx = view[[0, i]];
        let cy = view[[1, i]];
        let w = view[[2, i]];
        let h = view[[3, i]];
        if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
            continue;
        }

        detections.push(Detection {
            x1: (cx - w / 2.0) * sx,
            y1: (cy - h / 2.0) * sy,
            x2: (cx + w / 2.0) * sx,
            y2: (cy + h / 2.0) * sy,
            score: max_score.clamp(0.0, 1.0),
            class_id,
            label: label.to_string(),
        });
    }

    let mut kept = non_max_suppression(detections, params.iou_threshold);
    kept.truncate(params.max_detections);
    kept
}

/// Greedy NMS, only between boxes of the same class. Output is sorted by score.
pub(crate) fn non_max_suppression(mut boxes: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    boxes.sort_unstable_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Detection> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        let overlaps = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}
