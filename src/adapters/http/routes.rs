use axum::{
    body::Bytes,
    extract::{Multipart, State},
    response::Html,
    Json,
};
use tracing::info;

use crate::adapters::http::{error::ApiError, pages, state::HttpState};
use crate::application::dto::{HealthResponse, PredictionResponse};

pub async fn home(State(st): State<HttpState>) -> Html<String> {
    Html(pages::landing(&st.model_name))
}

pub async fn upload_form() -> Html<String> {
    Html(pages::upload_form())
}

/// POST /predict: multipart form with a `file` field, HTML result page.
pub async fn predict(
    State(st): State<HttpState>,
    multipart: Multipart,
) -> Result<Html<String>, ApiError> {
    let result = run_prediction(&st, multipart).await?;
    Ok(Html(pages::prediction(&result)))
}

/// POST /api/predict: same pipeline, JSON body.
pub async fn predict_json(
    State(st): State<HttpState>,
    multipart: Multipart,
) -> Result<Json<PredictionResponse>, ApiError> {
    Ok(Json(run_prediction(&st, multipart).await?))
}

pub async fn health(State(st): State<HttpState>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".into(), model: st.model_name.clone() })
}

async fn run_prediction(
    st: &HttpState,
    multipart: Multipart,
) -> Result<PredictionResponse, ApiError> {
    let (file_name, data) = read_upload(multipart).await?;
    info!("Received upload {:?} ({} bytes)", file_name, data.len());
    let result = st.prediction.predict(&file_name, &data).await?;
    info!("{}: {} prediction(s)", file_name, result.predictions.len());
    Ok(result)
}

/// First `file` field of the form; other fields are ignored.
async fn read_upload(mut multipart: Multipart) -> Result<(String, Bytes), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        return Ok((file_name, data));
    }
    Err(ApiError::BadRequest("missing required 'file' field".into()))
}
