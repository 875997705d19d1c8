//! Report schema and the row assembler.
//!
//! The spreadsheet is positional: columns A..L must stay in the order of
//! [`SHEET_COLUMNS`]. Changing it means migrating every existing sheet.

use crate::source_tag::CaseSource;

/// Status written for every newly created report.
pub const CASE_STATUS_TRACKING: &str = "追蹤中";

/// Header names of columns A..L.
pub const SHEET_COLUMNS: [&str; 12] = [
    "日期",
    "負責業務",
    "案件狀態",
    "案件來源",
    "年份",
    "品牌",
    "車型",
    "顏色",
    "里程(萬)",
    "新車價",
    "估價",
    "出價",
];

/// Column holding the processing date, used to find the last written row.
pub const DATE_COLUMN: char = 'A';

/// Column the pricing officer's corrections are written to.
pub const APPRAISED_PRICE_COLUMN: char = 'K';

/// Last column of the schema.
pub const LAST_COLUMN: char = 'L';

/// One used-car lead extracted from a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedReport {
    pub assigned_salesperson: String,
    pub case_status: String,
    pub case_source: CaseSource,
    pub year: String,
    pub brand: String,
    pub model: String,
    pub color: String,
    pub mileage: String,
    pub list_price: String,
    pub appraised_price: String,
    pub offer_price: String,
}

/// Business fields an extractor fills in before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFields {
    pub year: String,
    pub brand: String,
    pub model: String,
    pub color: String,
    pub mileage: String,
    pub list_price: String,
}

impl ReportFields {
    pub fn is_empty(&self) -> bool {
        [
            &self.year,
            &self.brand,
            &self.model,
            &self.color,
            &self.mileage,
            &self.list_price,
        ]
        .iter()
        .all(|value| value.is_empty())
    }
}

impl ExtractedReport {
    /// Build a new report in the tracking state with empty price columns.
    pub fn new_tracking(actor: &str, case_source: CaseSource, fields: ReportFields) -> Self {
        Self {
            assigned_salesperson: actor.to_string(),
            case_status: CASE_STATUS_TRACKING.to_string(),
            case_source,
            year: fields.year,
            brand: fields.brand,
            model: fields.model,
            color: fields.color,
            mileage: fields.mileage,
            list_price: fields.list_price,
            appraised_price: String::new(),
            offer_price: String::new(),
        }
    }
}

/// Prepend `date` to the report fields, in sheet order.
pub fn assemble_row(report: &ExtractedReport, date: &str) -> Vec<String> {
    vec![
        date.to_string(),
        report.assigned_salesperson.clone(),
        report.case_status.clone(),
        report.case_source.as_str().to_string(),
        report.year.clone(),
        report.brand.clone(),
        report.model.clone(),
        report.color.clone(),
        report.mileage.clone(),
        report.list_price.clone(),
        report.appraised_price.clone(),
        report.offer_price.clone(),
    ]
}
