//! Per-event processing: identify the sender, route the message, then apply
//! the resulting action to the sheet.
//!
//! Failures are contained per event. A batch always runs to the end and the
//! caller gets a [`BatchOutcome`] tally.

use std::sync::Arc;

use chrono::{FixedOffset, Utc};
use tracing::{debug, error, info, warn};

use crate::cell_update::CellUpdateResolver;
use crate::directory::{DisplayNameResolver, UNKNOWN_ACTOR};
use crate::event::ChatEvent;
use crate::line::IdentityLookup;
use crate::report::{assemble_row, ExtractedReport};
use crate::router::{Action, EventRouter, IgnoreReason};
use crate::store::{SheetLayout, SheetStore, StoreError};

pub const REPORT_DATE_FORMAT: &str = "%Y/%m/%d";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no report row to correct")]
    NoCorrectionTarget,
}

/// Source of the processing date written to column A.
#[derive(Debug, Clone)]
pub enum ReportDate {
    /// Today's date at a fixed UTC offset.
    Offset(FixedOffset),
    /// A constant date string.
    Fixed(String),
}

impl ReportDate {
    /// `None` when `hours` is outside -23..=23.
    pub fn utc_offset_hours(hours: i32) -> Option<Self> {
        FixedOffset::east_opt(hours.checked_mul(3600)?).map(ReportDate::Offset)
    }

    pub fn today(&self) -> String {
        match self {
            ReportDate::Offset(offset) => Utc::now()
                .with_timezone(offset)
                .format(REPORT_DATE_FORMAT)
                .to_string(),
            ReportDate::Fixed(date) => date.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Appended { rows: usize, first_row: Option<u32> },
    PriceUpdated { range: String, value: f64 },
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub events: usize,
    pub rows_appended: usize,
    pub prices_updated: usize,
    pub ignored: usize,
    pub failed: usize,
}

impl BatchOutcome {
    fn record(&mut self, result: &Result<EventOutcome, PipelineError>) {
        self.events += 1;
        match result {
            Ok(EventOutcome::Appended { rows, .. }) => self.rows_appended += rows,
            Ok(EventOutcome::PriceUpdated { .. }) => self.prices_updated += 1,
            Ok(EventOutcome::Ignored(_)) => self.ignored += 1,
            Err(_) => self.failed += 1,
        }
    }
}

pub struct ReportPipeline {
    identities: Arc<dyn IdentityLookup>,
    resolver: DisplayNameResolver,
    router: EventRouter,
    store: Arc<dyn SheetStore>,
    layout: SheetLayout,
    cell_resolver: CellUpdateResolver,
    date: ReportDate,
}

impl ReportPipeline {
    pub fn new(
        identities: Arc<dyn IdentityLookup>,
        resolver: DisplayNameResolver,
        router: EventRouter,
        store: Arc<dyn SheetStore>,
        layout: SheetLayout,
        date: ReportDate,
    ) -> Self {
        Self {
            identities,
            resolver,
            router,
            store,
            cell_resolver: CellUpdateResolver::new(layout.clone()),
            layout,
            date,
        }
    }

    /// Canonical name of the sender; lookup failures degrade to `unknown`.
    pub fn resolve_actor(&self, event: &ChatEvent) -> String {
        match self.identities.display_name(&event.source) {
            Ok(raw) => self.resolver.resolve(&raw),
            Err(err) => {
                warn!("identity lookup failed for {} source: {}", event.source.kind, err);
                UNKNOWN_ACTOR.to_string()
            }
        }
    }

    pub fn process_event(&self, event: &ChatEvent) -> Result<EventOutcome, PipelineError> {
        if event.text_body().is_none() {
            debug!("ignoring non-text event");
            return Ok(EventOutcome::Ignored(IgnoreReason::NonText));
        }

        let actor = self.resolve_actor(event);
        match self.router.route(event, &actor) {
            Action::CreateReport(reports) => self.append_reports(&reports),
            Action::UpdatePrice(value) => self.update_price(value),
            Action::Ignore(reason) => {
                info!("ignoring message from {}: {}", actor, reason);
                Ok(EventOutcome::Ignored(reason))
            }
        }
    }

    pub fn process_batch(&self, events: Vec<ChatEvent>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for (index, event) in events.iter().enumerate() {
            let result = self.process_event(event);
            if let Err(err) = &result {
                error!("event {} of batch failed: {}", index, err);
            }
            outcome.record(&result);
        }
        outcome
    }

    fn append_reports(&self, reports: &[ExtractedReport]) -> Result<EventOutcome, PipelineError> {
        let date = self.date.today();
        let rows: Vec<Vec<String>> = reports
            .iter()
            .map(|report| assemble_row(report, &date))
            .collect();
        let first_row = self.store.append_rows(&self.layout.report_range(), &rows)?;
        match first_row {
            Some(row) => info!("appended {} report row(s) starting at row {}", rows.len(), row),
            None => info!("appended {} report row(s)", rows.len()),
        }
        Ok(EventOutcome::Appended {
            rows: rows.len(),
            first_row,
        })
    }

    fn update_price(&self, value: f64) -> Result<EventOutcome, PipelineError> {
        let target = self
            .cell_resolver
            .resolve_target(self.store.as_ref())?
            .ok_or(PipelineError::NoCorrectionTarget)?;
        self.store.update_cell(&target.range, value)?;
        info!("appraised price {} written to {}", value, target.range);
        Ok(EventOutcome::PriceUpdated {
            range: target.range,
            value,
        })
    }
}
