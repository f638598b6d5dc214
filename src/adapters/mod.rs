pub mod ffmpeg;
pub mod http;
pub mod onnx;
pub mod render;
pub mod storage;
