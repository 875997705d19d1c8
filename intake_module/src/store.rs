//! Spreadsheet store seam and the A1 ranges the pipeline writes to.

use serde_json::Value;
use sheets_module::sheets::{quote_sheet_name, SheetsClient, SheetsError};

use crate::report::{DATE_COLUMN, LAST_COLUMN};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Sheets(#[from] SheetsError),
    #[error("store error: {0}")]
    Other(String),
}

/// The three spreadsheet operations the pipeline relies on.
pub trait SheetStore: Send + Sync {
    /// Append rows; returns the first written row number when known.
    fn append_rows(&self, range: &str, rows: &[Vec<String>]) -> Result<Option<u32>, StoreError>;

    fn update_cell(&self, range: &str, value: f64) -> Result<(), StoreError>;

    /// One entry per row of the range's first column, blanks included.
    fn read_column(&self, range: &str) -> Result<Vec<String>, StoreError>;
}

impl SheetStore for SheetsClient {
    fn append_rows(&self, range: &str, rows: &[Vec<String>]) -> Result<Option<u32>, StoreError> {
        let result = SheetsClient::append_rows(self, range, rows)?;
        Ok(result.first_row())
    }

    fn update_cell(&self, range: &str, value: f64) -> Result<(), StoreError> {
        Ok(self.update_value(range, Value::from(value))?)
    }

    fn read_column(&self, range: &str) -> Result<Vec<String>, StoreError> {
        Ok(SheetsClient::read_column(self, range)?)
    }
}

/// A1 ranges on the report sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    sheet: String,
}

impl SheetLayout {
    pub fn new(sheet_name: &str) -> Self {
        Self {
            sheet: quote_sheet_name(sheet_name.trim()),
        }
    }

    /// Full report width, used for appends.
    pub fn report_range(&self) -> String {
        format!("{}!{}:{}", self.sheet, DATE_COLUMN, LAST_COLUMN)
    }

    pub fn column_range(&self, column: char) -> String {
        format!("{}!{}:{}", self.sheet, column, column)
    }

    pub fn cell(&self, column: char, row: u32) -> String {
        format!("{}!{}{}", self.sheet, column, row)
    }
}
