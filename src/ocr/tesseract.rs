//! OCR engine wrapping the `tesseract` CLI tool.

use std::io::Cursor;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::debug;

use super::OcrEngine;

pub struct TesseractEngine {
    binary: String,
}

impl TesseractEngine {
    /// The binary path can be overridden with TESSERACT_CMD (Windows
    /// installs land outside PATH).
    pub fn from_env() -> Self {
        let binary = std::env::var("TESSERACT_CMD").unwrap_or_else(|_| "tesseract".to_string());
        Self { binary }
    }
}

#[async_trait::async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn extract_text(&self, image: &[u8]) -> Result<String> {
        // Decode whatever arrived and re-encode as PNG so tesseract never
        // sees an exotic container format.
        let decoded = image::load_from_memory(image).context("cannot decode uploaded image")?;
        let mut png = Vec::new();
        decoded
            .write_to(&mut Cursor::new(&mut png), image::ImageOutputFormat::Png)
            .context("cannot re-encode image as PNG")?;

        // Write the input to a temporary file and run tesseract on it.
        let tmpdir = tempfile::TempDir::with_prefix("medlense-ocr")?;
        let input_path = tmpdir.path().join("input.png");
        let output_base = tmpdir.path().join("output");
        tokio::fs::write(&input_path, &png)
            .await
            .context("cannot write tesseract input file")?;

        let output = Command::new(&self.binary)
            .arg(&input_path)
            .arg(&output_base)
            .output()
            .await
            .context("cannot run tesseract")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tesseract exited with {}: {}", output.status, stderr.trim());
        }

        let text = tokio::fs::read_to_string(output_base.with_extension("txt"))
            .await
            .context("cannot read tesseract output file")?;

        debug!("TesseractEngine: extracted {} chars", text.len());
        Ok(text)
    }
}
