use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

/// Something that can turn a prepared image into raw text.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &Path, language: &str) -> Result<String, RecognitionError>;
}

/// Recognizer backed by the `tesseract` command-line program.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
    tessdata_dir: Option<PathBuf>,
}

impl TesseractCli {
    pub fn new(binary: impl Into<PathBuf>, tessdata_dir: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            tessdata_dir,
        }
    }

    fn command(&self, image: &Path, language: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(image).arg("stdout").arg("-l").arg(language);
        if let Some(dir) = &self.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl TextRecognizer for TesseractCli {
    async fn recognize(&self, image: &Path, language: &str) -> Result<String, RecognitionError> {
        if !is_language_code(language) {
            return Err(RecognitionError::UnsupportedLanguage(language.to_string()));
        }

        let output = self
            .command(image, language)
            .output()
            .await
            .map_err(RecognitionError::Spawn)?;

        if !output.status.success() {
            return Err(RecognitionError::Engine {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Tesseract language codes are traineddata names joined by `+` (e.g. `eng+nep`).
fn is_language_code(language: &str) -> bool {
    !language.is_empty()
        && language
            .split('+')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("Unsupported recognition language: {0:?}")]
    UnsupportedLanguage(String),

    #[error("Failed to run OCR engine: {0}")]
    Spawn(std::io::Error),

    #[error("OCR engine exited with status {status:?}: {stderr}")]
    Engine { status: Option<i32>, stderr: String },
}
