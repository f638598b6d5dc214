#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use image::{Rgb, RgbImage};
use tower::ServiceExt;

use sign_detector::adapters::http::{app, state::HttpState};
use sign_detector::adapters::render::overlay::OverlayPainter;
use sign_detector::adapters::storage::local_store::LocalMediaStore;
use sign_detector::application::annotator::{ImageAnnotator, VideoAnnotator};
use sign_detector::application::ports::{
    DetectorPort, FrameSink, FrameSource, MediaStorePort, OpenedVideo, VideoCodecPort,
};
use sign_detector::application::services::PredictionService;
use sign_detector::domain::detection::Detection;
use sign_detector::domain::errors::{DomainError, DomainResult};

pub const BOUNDARY: &str = "----sign-detector-test-boundary";
pub const SIZE: u32 = 64;

/// Reports a "Stop" sign whenever the frame centre is red.
pub struct RedMeansStop;

impl DetectorPort for RedMeansStop {
    fn name(&self) -> &str {
        "red-means-stop"
    }

    fn input_size(&self) -> u32 {
        SIZE
    }

    fn detect(&self, frame: &RgbImage) -> DomainResult<Vec<Detection>> {
        let Rgb([r, g, b]) = *frame.get_pixel(SIZE / 2, SIZE / 2);
        if r > 180 && g < 90 && b < 90 {
            Ok(vec![Detection {
                x1: 16.0,
                y1: 16.0,
                x2: 48.0,
                y2: 48.0,
                score: 0.91,
                class_id: 13,
                label: "Stop".into(),
            }])
        } else {
            Ok(vec![])
        }
    }
}

/// In-memory clips: `frames` solid frames of `color`, or a failure to open.
pub struct MemoryCodec {
    pub frames: usize,
    pub color: Rgb<u8>,
    pub openable: bool,
}

struct MemorySource(VecDeque<RgbImage>);

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> DomainResult<Option<RgbImage>> {
        Ok(self.0.pop_front())
    }
}

struct CountingSink {
    path: std::path::PathBuf,
    count: usize,
}

impl FrameSink for CountingSink {
    fn write_frame(&mut self, _frame: &RgbImage) -> DomainResult<()> {
        self.count += 1;
        Ok(())
    }

    fn finish(&mut self) -> DomainResult<()> {
        std::fs::write(&self.path, format!("{} frames", self.count))
            .map_err(|e| DomainError::failed(e.to_string()))
    }
}

impl VideoCodecPort for MemoryCodec {
    fn open_input(&self, _input: &Path, size: u32) -> DomainResult<OpenedVideo> {
        if !self.openable {
            return Err(DomainError::failed("cannot open"));
        }
        let frames = (0..self.frames)
            .map(|_| RgbImage::from_pixel(size, size, self.color))
            .collect();
        Ok(OpenedVideo { frames: Box::new(MemorySource(frames)), fps: 30.0 })
    }

    fn open_output(
        &self,
        output: &Path,
        _size: u32,
        _fps: f64,
    ) -> DomainResult<Box<dyn FrameSink>> {
        Ok(Box::new(CountingSink { path: output.to_path_buf(), count: 0 }))
    }
}

pub struct TestApp {
    pub router: Router,
    pub static_dir: tempfile::TempDir,
}

pub fn build_test_app(codec: MemoryCodec) -> TestApp {
    let static_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalMediaStore::new(static_dir.path()));
    let outputs = store.outputs_dir();

    let detector: Arc<dyn DetectorPort> = Arc::new(RedMeansStop);
    let overlay = Arc::new(OverlayPainter::new(None));
    let images = Arc::new(ImageAnnotator::new(detector.clone(), overlay.clone(), outputs.clone()));
    let videos = Arc::new(VideoAnnotator::new(detector, overlay, Arc::new(codec), outputs, 2));

    let state = HttpState {
        prediction: Arc::new(PredictionService::new(store, images, videos)),
        model_name: "test-model".into(),
    };
    TestApp { router: app(state, static_dir.path(), 10 * 1024 * 1024), static_dir }
}

pub fn default_codec() -> MemoryCodec {
    MemoryCodec { frames: 4, color: Rgb([220, 20, 20]), openable: true }
}

/// JPEG bytes of a `w`×`h` image filled with `color`.
pub fn jpeg(w: u32, h: u32, color: Rgb<u8>) -> Vec<u8> {
    let img = RgbImage::from_pixel(w, h, color);
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Jpeg).unwrap();
    buf.into_inner()
}

pub fn multipart_body(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn post_multipart(app: &Router, uri: &str, body: Vec<u8>) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}
