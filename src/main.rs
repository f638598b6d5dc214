use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use sign_detector::adapters::{
    ffmpeg::FfmpegCodec,
    http::{self, state::HttpState},
    onnx::{model_catalog::OnnxModelCatalog, yolo_engine::OnnxYoloEngine},
    render::overlay::OverlayPainter,
    storage::local_store::LocalMediaStore,
};
use sign_detector::application::{
    annotator::{ImageAnnotator, VideoAnnotator},
    ports::{DetectorPort, MediaStorePort},
    services::{ModelService, PredictionService},
};
use sign_detector::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // 1. Inicializar logs (RUST_LOG=info por defecto)
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("🔧 Inicializando adaptadores de infraestructura...");

    // 2. Directorios de subidas y salidas
    let store = Arc::new(LocalMediaStore::new(&config.static_dir));
    store.prepare().await?;

    // 3. Modelo: validar antes de cargar en ONNX Runtime
    let inference = config.inference();
    ModelService::new(Arc::new(OnnxModelCatalog::new()))
        .ensure_available(&inference.model)
        .await?;
    let detector: Arc<dyn DetectorPort> = Arc::new(OnnxYoloEngine::load(&inference)?);

    let overlay = Arc::new(OverlayPainter::from_font_file(config.font_path.as_deref())?);
    if !overlay.has_font() {
        tracing::warn!("FONT_PATH not set, boxes will be drawn without labels");
    }
    let codec = Arc::new(FfmpegCodec::locate(&config.ffmpeg_bin, &config.ffprobe_bin)?);

    // 4. Casos de uso
    let outputs = store.outputs_dir();
    let images = Arc::new(ImageAnnotator::new(detector.clone(), overlay.clone(), outputs.clone()));
    let videos = Arc::new(VideoAnnotator::new(
        detector.clone(),
        overlay,
        codec,
        outputs,
        config.video_sample_stride,
    ));
    let prediction = Arc::new(PredictionService::new(store, images, videos));

    let state = HttpState {
        prediction,
        model_name: detector.name().to_string(),
    };

    // 5. Router de Axum + archivos estáticos
    let app = http::app(state, &config.static_dir, config.max_upload_bytes);

    // 6. Lanzar el servidor
    let addr = config.bind_addr();
    tracing::info!("🚀 Servidor iniciado en http://{}", addr);
    tracing::info!("📂 Subidas y resultados servidos desde '{}'", config.static_dir.display());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
