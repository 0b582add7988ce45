use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegmenterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unknown token '{{{{{name}}}}}'")]
    UnknownToken { name: String },

    #[error("Cannot compile template '{template}': {reason}")]
    Compile { template: String, reason: String },

    #[error("Invalid replacement rule '{regex}': {reason}")]
    InvalidReplacement { regex: String, reason: String },

    #[error("Invalid page selector '{selector}': {reason}")]
    InvalidPageSelector { selector: String, reason: String },

    #[error("Segmentation aborted after {iterations} rule evaluations")]
    SegmentationTimeout { iterations: usize },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Output directory error: {reason}")]
    OutputDirectory { reason: String },

    #[error("HTTP status error: {status}")]
    HttpStatus { status: u16 },

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl SegmenterError {
    pub(crate) fn compile(template: &str, reason: impl Into<String>) -> Self {
        SegmenterError::Compile {
            template: template.to_string(),
            reason: reason.into(),
        }
    }

    /// True for failures raised while turning rule configuration into matchers.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            SegmenterError::UnknownToken { .. }
                | SegmenterError::Compile { .. }
                | SegmenterError::InvalidReplacement { .. }
                | SegmenterError::InvalidPageSelector { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SegmenterError>;
