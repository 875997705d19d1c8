//! Field extraction: free-form chat text in, structured reports out.
//!
//! Two interchangeable strategies implement [`Extractor`]:
//! - [`PatternExtractor`]: numbered, labeled lines matched by regex
//! - [`DelegatedExtractor`]: a text-generation service fills in the fields
//!
//! Either way every report carries all schema fields; missing values are
//! empty strings.

mod delegated;
mod pattern;

pub use delegated::{DelegatedExtractor, ResponseFormat, DELEGATED_FIELDS};
pub use pattern::PatternExtractor;

use crate::llm::LlmError;
use crate::report::ExtractedReport;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("text generation failed: {0}")]
    Generation(#[from] LlmError),
    #[error("malformed extraction response: {0}")]
    Malformed(String),
    #[error("extraction response has {found} fields, expected at most {expected}")]
    TooManyFields { expected: usize, found: usize },
}

pub trait Extractor: Send + Sync {
    /// Extract zero or more reports from one message sent by `actor`.
    fn extract(&self, text: &str, actor: &str) -> Result<Vec<ExtractedReport>, ExtractError>;

    fn name(&self) -> &'static str;
}
