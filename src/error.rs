use thiserror::Error;

pub type ScrapeResult<T> = std::result::Result<T, ScrapeError>;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("page structure mismatch at {url}: missing {missing}")]
    PageStructure { url: String, missing: &'static str },

    #[error("cannot summarize an empty value sequence")]
    EmptyInput,

    #[error("malformed statistic value {value:?}")]
    MalformedValue { value: String },

    #[error("inconsistent units: {value:?} does not match the {expected} unit of the sequence")]
    InconsistentUnits {
        value: String,
        expected: &'static str,
    },

    #[error("page session unavailable: {0}")]
    ResourceUnavailable(&'static str),

    #[error("failed to build http client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("navigation to {url} failed: {message}")]
    Navigation {
        url: String,
        message: String,
        retryable: bool,
    },
}

impl ScrapeError {
    pub fn page_structure(url: &str, missing: &'static str) -> Self {
        Self::PageStructure {
            url: url.to_string(),
            missing,
        }
    }

    /// Timeouts, connection drops, 429 and 5xx responses. Everything else is fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Navigation { retryable: true, .. })
    }

    pub fn is_summary_defect(&self) -> bool {
        matches!(
            self,
            Self::EmptyInput | Self::MalformedValue { .. } | Self::InconsistentUnits { .. }
        )
    }
}
