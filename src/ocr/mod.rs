//! OCR engine abstraction.
//!
//! Defines the [`OcrEngine`] trait so the text-extraction backend can be
//! swapped (or stubbed in tests) without touching the pipeline.

pub mod tesseract;

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Extract raw text from image bytes. Output is uncleaned; callers run
    /// it through the normalizer.
    async fn extract_text(&self, image: &[u8]) -> anyhow::Result<String>;
}
