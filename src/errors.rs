use thiserror::Error;

/// Errors that reach the caller of the recognition pipeline.
///
/// Everything else (individual provider failures, disambiguation errors)
/// is absorbed inside the pipeline as a reduced-confidence or skipped
/// contribution and only logged.
#[derive(Debug, Error)]
pub enum RecognizeError {
    /// The input payload could not be turned into an image; the pipeline
    /// aborts immediately since there is nothing to dispatch. Covers both
    /// undecodable image bytes and malformed data URIs.
    #[error("could not read image: {0}")]
    ImageDecode(String),

    /// Every configured provider failed, timed out, or returned empty
    /// text. `attempted` is zero when no provider was configured at all.
    #[error(
        "recognition unavailable: all {attempted} provider(s) failed or returned empty text; try again or enter the expression manually"
    )]
    AllProvidersFailed { attempted: usize },

    /// After all stages ran, the aggregator had no usable candidate.
    #[error("could not recognize an expression in the image")]
    NoCandidates,
}

impl RecognizeError {
    pub(crate) fn image_decode(message: impl Into<String>) -> Self {
        Self::ImageDecode(message.into())
    }
}

impl From<image::ImageError> for RecognizeError {
    fn from(error: image::ImageError) -> Self {
        Self::ImageDecode(error.to_string())
    }
}

pub type RecognizeResult<T> = Result<T, RecognizeError>;
