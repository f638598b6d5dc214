use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    application::{
        annotator::{AnnotationOutcome, ImageAnnotator, VideoAnnotator},
        dto::PredictionResponse,
        ports::{MediaStorePort, ModelCatalogPort},
    },
    domain::{
        errors::{DomainError, DomainResult},
        media::{MediaKind, StoredMedia},
        model::ModelId,
    },
};

/// Caso de uso principal: guardar la subida, decidir imagen/vídeo y anotar.
#[derive(Clone)]
pub struct PredictionService {
    store: Arc<dyn MediaStorePort>,
    images: Arc<ImageAnnotator>,
    videos: Arc<VideoAnnotator>,
}

impl PredictionService {
    pub fn new(
        store: Arc<dyn MediaStorePort>,
        images: Arc<ImageAnnotator>,
        videos: Arc<VideoAnnotator>,
    ) -> Self {
        Self { store, images, videos }
    }

    pub async fn predict(&self, file_name: &str, data: &[u8]) -> DomainResult<PredictionResponse> {
        let path = self.store.save_upload(file_name, data).await?;
        let media = StoredMedia::classify(path);
        info!("Upload stored at {} ({})", media.path.display(), media.mime);

        let outcome = match media.kind {
            MediaKind::Image => {
                let images = self.images.clone();
                let input = media.path.clone();
                run_blocking(move || images.annotate(&input)).await?
            }
            MediaKind::Video => {
                let videos = self.videos.clone();
                let input = media.path.clone();
                run_blocking(move || videos.annotate(&input)).await?
            }
            MediaKind::Other => {
                warn!("{} is neither image nor video, skipping detection", media.path.display());
                AnnotationOutcome::empty()
            }
        };

        Ok(self.to_response(&media, outcome))
    }

    fn to_response(&self, media: &StoredMedia, outcome: AnnotationOutcome) -> PredictionResponse {
        let file_url = outcome.out_path.as_deref().and_then(|p| self.store.public_url(p));
        PredictionResponse {
            file_path: outcome.out_path.map(path_string),
            file_url,
            file_type: media.mime.to_string(),
            media_kind: media.kind,
            predictions: outcome.predictions,
        }
    }
}

fn path_string(p: PathBuf) -> String {
    p.to_string_lossy().into_owned()
}

/// Annotation is CPU-bound (decode, inference, encode); keep it off the reactor.
async fn run_blocking<T, F>(f: F) -> DomainResult<T>
where
    F: FnOnce() -> DomainResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DomainError::failed(format!("annotation task aborted: {e}")))?
}

/// Comprobación del modelo antes de cargarlo en el runtime.
#[derive(Clone)]
pub struct ModelService {
    catalog: Arc<dyn ModelCatalogPort>,
}

impl ModelService {
    pub fn new(catalog: Arc<dyn ModelCatalogPort>) -> Self {
        Self { catalog }
    }

    pub async fn ensure_available(&self, model: &ModelId) -> DomainResult<()> {
        self.catalog.validate_model(model).await
    }
}
