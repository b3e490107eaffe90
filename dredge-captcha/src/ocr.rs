//! Local OCR strategy: read the CAPTCHA text straight out of the image.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, warn};

/// Text recognition over a captured CAPTCHA image.
#[async_trait]
pub trait Recognize: Send + Sync {
    /// `None` on any capture or recognition failure; reported, never a
    /// hard error.
    async fn recognize(&self, image: &Path) -> Option<String>;
}

/// Recognizer backed by the `tesseract` binary.
pub struct TesseractOcr;

#[async_trait]
impl Recognize for TesseractOcr {
    async fn recognize(&self, image: &Path) -> Option<String> {
        let output = match Command::new("tesseract")
            .arg(image)
            .arg("stdout")
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "ocr.spawn_failed");
                return None;
            }
        };

        if !output.status.success() {
            warn!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "ocr.tesseract_failed"
            );
            return None;
        }

        let text = strip_whitespace(&String::from_utf8_lossy(&output.stdout));
        debug!(chars = text.len(), "ocr.recognized");
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

fn strip_whitespace(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}
