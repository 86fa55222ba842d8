//! Image explanation pipeline over injected collaborators.
//!
//! Every collaborator call (OCR, captioning, generation) resolves to an
//! [`Outcome`]: either the produced text, or a human-readable reason the
//! caller still embeds in a success response. No collaborator failure ever
//! surfaces as a non-success HTTP status.

use std::sync::Arc;

use tracing::{info, warn};

use crate::gemini::GeminiClient;
use crate::ocr::OcrEngine;
use crate::prompt::{self, CAPTION_INSTRUCTION};
use crate::textnorm;

/// Fixed caption used when a PDF is accepted on the degraded no-op path.
pub const PDF_PLACEHOLDER_CAPTION: &str = "Medical PDF uploaded";
/// Fixed text used when a PDF is accepted on the degraded no-op path.
pub const PDF_PLACEHOLDER_TEXT: &str = "PDF text extraction not enabled yet.";

/// Result of one collaborator call.
///
/// `Degraded` carries the full human-readable reason (e.g. "Vision failed:
/// timed out"); both variants render to the same response string, so tests
/// can assert on the tag without the wire format changing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok(String),
    Degraded(String),
}

impl Outcome {
    pub fn as_str(&self) -> &str {
        match self {
            Outcome::Ok(s) | Outcome::Degraded(s) => s,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Outcome::Ok(s) | Outcome::Degraded(s) => s,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded(_))
    }
}

/// Captioning collaborator: image bytes -> short description.
#[async_trait::async_trait]
pub trait Captioner: Send + Sync {
    async fn caption(&self, image: &[u8], mime_type: &str) -> anyhow::Result<String>;
}

/// Text-generation collaborator: prompt -> generated text.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Hosted vision captioner backed by the Gemini client.
pub struct VisionCaptioner {
    client: Arc<GeminiClient>,
}

impl VisionCaptioner {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Captioner for VisionCaptioner {
    async fn caption(&self, image: &[u8], mime_type: &str) -> anyhow::Result<String> {
        self.client
            .generate_with_image(CAPTION_INSTRUCTION, image, mime_type)
            .await
    }
}

#[async_trait::async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        self.generate_text(prompt).await
    }
}

/// Per-request explanation payload, one tagged outcome per field.
#[derive(Debug)]
pub struct Explanation {
    pub caption: Outcome,
    pub ocr_text: Outcome,
    pub explanation: Outcome,
}

/// Pipeline orchestrator.
pub struct Explainer {
    ocr: Arc<dyn OcrEngine>,
    captioner: Arc<dyn Captioner>,
    generator: Arc<dyn TextGenerator>,
    text_limit: usize,
}

impl Explainer {
    pub fn new(
        ocr: Arc<dyn OcrEngine>,
        captioner: Arc<dyn Captioner>,
        generator: Arc<dyn TextGenerator>,
        text_limit: usize,
    ) -> Self {
        Self {
            ocr,
            captioner,
            generator,
            text_limit,
        }
    }

    /// Run the full pipeline for an uploaded image: OCR, cleanup, caption,
    /// prompt assembly, explanation.
    pub async fn explain_image(&self, image: &[u8], mime_type: &str) -> Explanation {
        let ocr_text = match self.ocr.extract_text(image).await {
            Ok(raw) => Outcome::Ok(textnorm::normalize(&raw, self.text_limit)),
            Err(e) => {
                warn!("OCR ({}) failed: {}", self.ocr.name(), e);
                Outcome::Degraded(format!("OCR failed: {}", e))
            }
        };

        let caption = match self.captioner.caption(image, mime_type).await {
            Ok(text) => Outcome::Ok(text.trim().to_string()),
            Err(e) => {
                warn!("Captioning failed: {}", e);
                Outcome::Degraded(format!("Vision failed: {}", e))
            }
        };

        // Degraded strings flow into the prompt verbatim so the model can
        // still explain whatever survived.
        let explanation = self
            .generate_explanation(caption.as_str(), ocr_text.as_str())
            .await;

        Explanation {
            caption,
            ocr_text,
            explanation,
        }
    }

    /// Degraded no-op path for PDFs: fixed placeholders, but the
    /// explanation call still runs against them.
    pub async fn explain_pdf(&self) -> Explanation {
        let caption = Outcome::Ok(PDF_PLACEHOLDER_CAPTION.to_string());
        let ocr_text = Outcome::Ok(PDF_PLACEHOLDER_TEXT.to_string());
        let explanation = self
            .generate_explanation(caption.as_str(), ocr_text.as_str())
            .await;

        Explanation {
            caption,
            ocr_text,
            explanation,
        }
    }

    /// Forward a free-form chat message to the generation model.
    pub async fn chat(&self, message: &str) -> Outcome {
        match self.generator.generate(message).await {
            Ok(reply) => Outcome::Ok(reply.trim().to_string()),
            Err(e) => {
                warn!("Chat generation failed: {}", e);
                Outcome::Degraded(format!("AI error: {}", e))
            }
        }
    }

    async fn generate_explanation(&self, caption: &str, ocr_text: &str) -> Outcome {
        let prompt = prompt::explanation_prompt(caption, ocr_text);
        info!("Requesting explanation ({} char prompt)", prompt.len());

        match self.generator.generate(&prompt).await {
            Ok(text) => Outcome::Ok(text.trim().to_string()),
            Err(e) => {
                warn!("Explanation generation failed: {}", e);
                Outcome::Degraded(format!("AI explanation failed: {}", e))
            }
        }
    }
}
