//! OCR backends.
//!
//! A backend OCRs one page of one document per call. Backends know nothing
//! about how many pages a document has: the extractor keeps asking for the
//! next page until the backend fails with an error that [`classify_error`]
//! recognizes as "no such page".

use std::{error, fmt, sync::Arc, time::Duration};

use clap::{Args, ValueEnum};
use reqwest::StatusCode;

use crate::{credentials::ApiKey, prelude::*};

pub mod render;
#[cfg(test)]
pub mod scripted;
pub mod signal;
pub mod tesseract;
pub mod typhoon;

pub use self::signal::{ErrorSignal, classify_error};

/// What kind of output should the OCR backend produce?
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum TaskType {
    /// Markdown text.
    #[default]
    Default,
    /// HTML tables and `<figure>` tags for images.
    Structure,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Default => write!(f, "default"),
            TaskType::Structure => write!(f, "structure"),
        }
    }
}

/// An error returned by a backend for a single page.
///
/// The message is what [`classify_error`] looks at, so backends should make
/// sure that the underlying tool or server's own error text ends up in it.
#[derive(Debug)]
pub struct BackendError {
    /// HTTP status, if the error came from a server.
    status: Option<StatusCode>,
    /// Does this error affect every page of the document?
    document_level: bool,
    /// The underlying error.
    source: anyhow::Error,
}

impl BackendError {
    /// Create an error without an HTTP status.
    pub fn new(source: impl Into<anyhow::Error>) -> Self {
        Self {
            status: None,
            document_level: false,
            source: source.into(),
        }
    }

    /// Create an error from an HTTP status and message.
    pub fn with_status(status: StatusCode, source: impl Into<anyhow::Error>) -> Self {
        Self {
            status: Some(status),
            document_level: false,
            source: source.into(),
        }
    }

    /// Create an error meaning that no page of this document can be read,
    /// such as an unreadable file or a missing tool.
    pub fn document(source: impl Into<anyhow::Error>) -> Self {
        Self {
            status: None,
            document_level: true,
            source: source.into(),
        }
    }

    /// The HTTP status, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Is this error about the whole document rather than one page?
    pub fn is_document_level(&self) -> bool {
        self.document_level
    }

    /// The full error message, including all causes.
    pub fn message(&self) -> String {
        format!("{:#}", self.source)
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{status}: {:#}", self.source),
            None => write!(f, "{:#}", self.source),
        }
    }
}

impl error::Error for BackendError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

impl From<anyhow::Error> for BackendError {
    fn from(source: anyhow::Error) -> Self {
        Self::new(source)
    }
}

/// Interface to an OCR backend.
#[async_trait]
pub trait PageBackend: Send + Sync + 'static {
    /// OCR page `page` (1-based) of `document`.
    ///
    /// Returns the raw response, which may be plain text or a JSON object with
    /// a `natural_text` field.
    async fn ocr_page(
        &self,
        document: &Path,
        task_type: TaskType,
        page: u32,
    ) -> Result<String, BackendError>;
}

/// Our different backend types.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum BackendType {
    /// Typhoon OCR, or any other OpenAI-compatible vision model.
    #[default]
    Typhoon,

    /// The local `tesseract` CLI.
    Tesseract,
}

impl BackendType {
    /// Does this backend need an API key?
    pub fn needs_api_key(self) -> bool {
        matches!(self, BackendType::Typhoon)
    }
}

/// Backend-related options.
#[derive(Args, Clone, Debug)]
pub struct BackendOpts {
    /// The OCR backend to use.
    #[clap(long, value_enum, default_value_t = BackendType::default())]
    pub backend: BackendType,

    /// The output format requested from the backend.
    #[clap(long, value_enum, default_value_t = TaskType::default())]
    pub task_type: TaskType,

    /// The model to request from the OCR server.
    #[clap(long, default_value = typhoon::DEFAULT_MODEL)]
    pub model: String,

    /// The base URL of the OpenAI-compatible OCR server.
    #[clap(long, default_value = typhoon::DEFAULT_API_BASE)]
    pub api_base: String,

    /// A timeout, in seconds, for each OCR server request.
    #[clap(long)]
    pub timeout: Option<u64>,

    /// Tesseract language packs, joined with `+`.
    #[clap(long, default_value = tesseract::DEFAULT_LANGUAGES)]
    pub tesseract_langs: String,

    /// Size in pixels of the longest side of each rendered page.
    #[clap(long, default_value = "1800")]
    pub render_size: u32,
}

impl BackendOpts {
    /// Instantiate the selected backend.
    pub fn create_backend(&self, api_key: Option<ApiKey>) -> Result<Arc<dyn PageBackend>> {
        let render_opts = render::RenderOpts {
            longest_side: self.render_size,
        };
        match self.backend {
            BackendType::Typhoon => {
                let api_key =
                    api_key.ok_or_else(|| anyhow!("the typhoon backend needs an API key"))?;
                Ok(Arc::new(typhoon::TyphoonBackend::new(
                    &self.api_base,
                    api_key,
                    self.model.clone(),
                    self.timeout.map(Duration::from_secs),
                    render_opts,
                )?))
            }
            BackendType::Tesseract => Ok(Arc::new(tesseract::TesseractBackend::new(
                self.tesseract_langs.clone(),
                render_opts,
            ))),
        }
    }
}
