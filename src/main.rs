//! MedLense - medical image explanation service.
//!
//! Accepts an uploaded medical image, extracts its text with tesseract,
//! captions it via a vision model, and asks a text model for a
//! patient-friendly explanation. A `/chat` endpoint forwards free-form
//! messages to the same model.

mod config;
mod gemini;
mod ocr;
mod pipeline;
mod prompt;
mod textnorm;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use config::AppConfig;
use gemini::GeminiClient;
use ocr::tesseract::TesseractEngine;
use pipeline::{Explainer, VisionCaptioner};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    explainer: Arc<Explainer>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medlense=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    // A missing GEMINI_API_KEY aborts startup: nothing downstream works
    // without the generation collaborator.
    let gemini = Arc::new(GeminiClient::from_env()?);
    info!("Gemini client initialized (model: {})", gemini.model());

    let ocr = Arc::new(TesseractEngine::from_env());
    let captioner = Arc::new(VisionCaptioner::new(gemini.clone()));
    let explainer = Explainer::new(ocr, captioner, gemini, config.ocr_text_limit);

    let state = AppState {
        explainer: Arc::new(explainer),
    };

    let app = router(state)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(config.cors_layer());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/chat", post(chat))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct ExplanationResponse {
    caption: String,
    ocr_text: String,
    explanation: String,
}

/// Accept an uploaded medical image and return caption, extracted text,
/// and a patient-friendly explanation.
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ExplanationResponse>, (StatusCode, String)> {
    let mut filename = String::new();
    let mut content_type = String::new();
    let mut file_data = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().unwrap_or("upload").to_string();
            content_type = field.content_type().unwrap_or_default().to_string();
            file_data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e)))?
                .to_vec();
            break;
        }
    }

    if file_data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No file uploaded".to_string()));
    }

    let request_id = Uuid::new_v4();
    info!(
        "[{}] Received file: {} ({} bytes, {})",
        request_id,
        filename,
        file_data.len(),
        content_type
    );

    let result = if content_type.starts_with("image/") {
        state.explainer.explain_image(&file_data, &content_type).await
    } else if content_type == "application/pdf" {
        state.explainer.explain_pdf().await
    } else {
        return Err((StatusCode::BAD_REQUEST, "Unsupported file type".to_string()));
    };

    info!(
        "[{}] Explanation complete (degraded: caption={}, ocr={}, explanation={})",
        request_id,
        result.caption.is_degraded(),
        result.ocr_text.is_degraded(),
        result.explanation.is_degraded()
    );

    Ok(Json(ExplanationResponse {
        caption: result.caption.into_text(),
        ocr_text: result.ocr_text.into_text(),
        explanation: result.explanation.into_text(),
    }))
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct ChatReply {
    reply: String,
}

/// Forward a free-form chat message to the generation model. Generation
/// failures surface inside `reply`, never as an error status.
async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Json<ChatReply> {
    Json(ChatReply {
        reply: state.explainer.chat(&req.message).await.into_text(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use crate::ocr::OcrEngine;
    use crate::pipeline::{Captioner, TextGenerator, PDF_PLACEHOLDER_CAPTION};

    struct StubOcr(&'static str);

    #[async_trait::async_trait]
    impl OcrEngine for StubOcr {
        fn name(&self) -> &str {
            "stub"
        }
        async fn extract_text(&self, _image: &[u8]) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct StubCaptioner(&'static str);

    #[async_trait::async_trait]
    impl Captioner for StubCaptioner {
        async fn caption(&self, _image: &[u8], _mime_type: &str) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingCaptioner;

    #[async_trait::async_trait]
    impl Captioner for FailingCaptioner {
        async fn caption(&self, _image: &[u8], _mime_type: &str) -> anyhow::Result<String> {
            anyhow::bail!("model overloaded")
        }
    }

    struct StubGenerator(&'static str);

    #[async_trait::async_trait]
    impl TextGenerator for StubGenerator {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct UnreachableGenerator;

    #[async_trait::async_trait]
    impl TextGenerator for UnreachableGenerator {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    fn test_app(
        ocr: Arc<dyn OcrEngine>,
        captioner: Arc<dyn Captioner>,
        generator: Arc<dyn TextGenerator>,
    ) -> Router {
        let explainer = Explainer::new(ocr, captioner, generator, textnorm::DEFAULT_TEXT_LIMIT);
        router(AppState {
            explainer: Arc::new(explainer),
        })
    }

    fn default_app() -> Router {
        test_app(
            Arc::new(StubOcr("Hello\n\n\nWorld")),
            Arc::new(StubCaptioner("A chest X-ray.")),
            Arc::new(StubGenerator("All looks fine.")),
        )
    }

    /// Build a multipart/form-data body with a single `file` part.
    fn multipart_upload(content_type: &str, data: &[u8]) -> Request<Body> {
        let boundary = "medlense-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\n\
                 Content-Disposition: form-data; name=\"file\"; filename=\"scan.png\"\r\n\
                 Content-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = default_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_upload_rejects_unsupported_type() {
        let response = default_app()
            .oneshot(multipart_upload("text/plain", b"not an image"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_rejects_empty_file() {
        let response = default_app()
            .oneshot(multipart_upload("image/png", b""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_returns_normalized_ocr_text() {
        let response = default_app()
            .oneshot(multipart_upload("image/png", b"png-bytes"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["ocr_text"], "Hello\nWorld");
        assert_eq!(json["caption"], "A chest X-ray.");
        assert_eq!(json["explanation"], "All looks fine.");
    }

    #[tokio::test]
    async fn test_upload_caption_failure_stays_200() {
        let app = test_app(
            Arc::new(StubOcr("Findings: none")),
            Arc::new(FailingCaptioner),
            Arc::new(StubGenerator("Still fine.")),
        );
        let response = app
            .oneshot(multipart_upload("image/png", b"png-bytes"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert!(json["caption"]
            .as_str()
            .unwrap()
            .starts_with("Vision failed:"));
        assert_eq!(json["ocr_text"], "Findings: none");
    }

    #[tokio::test]
    async fn test_upload_pdf_uses_placeholder_path() {
        let response = default_app()
            .oneshot(multipart_upload("application/pdf", b"%PDF-1.4"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["caption"], PDF_PLACEHOLDER_CAPTION);
    }

    #[tokio::test]
    async fn test_chat_replies() {
        let response = default_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/chat")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"message": "hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["reply"], "All looks fine.");
    }

    #[tokio::test]
    async fn test_chat_generator_down_stays_200() {
        let app = test_app(
            Arc::new(StubOcr("")),
            Arc::new(StubCaptioner("")),
            Arc::new(UnreachableGenerator),
        );
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/chat")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"message": "hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert!(json["reply"].as_str().unwrap().starts_with("AI error:"));
    }
}
