use serde::{Deserialize, Serialize};

use crate::domain::{detection::ClassPrediction, media::MediaKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// Annotated output on disk, absent when nothing was drawn.
    pub file_path: Option<String>,
    pub file_url: Option<String>,
    pub file_type: String,
    pub media_kind: MediaKind,
    pub predictions: Vec<ClassPrediction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
}
