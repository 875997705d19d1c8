//! Decides what one chat event means for the spreadsheet.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::event::ChatEvent;
use crate::extractor::Extractor;
use crate::report::ExtractedReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Images, stickers, follow events and other non-text input.
    NonText,
    /// The pricing officer sent something that is not a number.
    NonNumericPrice,
    /// The extractor failed; the event is skipped.
    ExtractionFailed,
    /// The extractor found nothing to record.
    EmptyExtraction,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IgnoreReason::NonText => "non_text",
            IgnoreReason::NonNumericPrice => "non_numeric_price",
            IgnoreReason::ExtractionFailed => "extraction_failed",
            IgnoreReason::EmptyExtraction => "empty_extraction",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Overwrite the appraised price of the last written row.
    UpdatePrice(f64),
    /// Append one row per report; never empty.
    CreateReport(Vec<ExtractedReport>),
    Ignore(IgnoreReason),
}

/// Parse a price correction: the whole message must be one finite number.
pub fn parse_price(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

#[derive(Clone)]
pub struct EventRouter {
    extractor: Arc<dyn Extractor>,
    pricing_officer: Option<String>,
}

impl EventRouter {
    pub fn new(extractor: Arc<dyn Extractor>, pricing_officer: Option<String>) -> Self {
        Self {
            extractor,
            pricing_officer,
        }
    }

    pub fn is_pricing_officer(&self, actor: &str) -> bool {
        self.pricing_officer.as_deref() == Some(actor)
    }

    /// Route one event sent by the already-resolved `actor`.
    pub fn route(&self, event: &ChatEvent, actor: &str) -> Action {
        let Some(text) = event.text_body() else {
            return Action::Ignore(IgnoreReason::NonText);
        };

        if self.is_pricing_officer(actor) {
            return match parse_price(text) {
                Some(value) => Action::UpdatePrice(value),
                None => {
                    info!("ignoring non-numeric message from pricing officer {}", actor);
                    Action::Ignore(IgnoreReason::NonNumericPrice)
                }
            };
        }

        match self.extractor.extract(text, actor) {
            Ok(reports) if reports.is_empty() => Action::Ignore(IgnoreReason::EmptyExtraction),
            Ok(reports) => Action::CreateReport(reports),
            Err(err) => {
                warn!(
                    "{} extraction failed for message from {}, skipping: {}",
                    self.extractor.name(),
                    actor,
                    err
                );
                Action::Ignore(IgnoreReason::ExtractionFailed)
            }
        }
    }
}
