use std::sync::Arc;
use crate::application::services::PredictionService;

/// Estado compartido para los manejadores HTTP de Axum.
#[derive(Clone)]
pub struct HttpState {
    /// Subida -> anotación -> resultado.
    pub prediction: Arc<PredictionService>,
    /// Nombre lógico del modelo cargado, para `/health`.
    pub model_name: String,
}
