//! Picks the cell a price correction overwrites: the appraised-price column of
//! the last populated row.
//!
//! The row is re-read from the sheet for every correction. Callers must run
//! corrections and appends through a single writer (see [`crate::worker`]) or
//! the read and the write can straddle another append.

use tracing::debug;

use crate::report::{APPRAISED_PRICE_COLUMN, DATE_COLUMN, SHEET_COLUMNS};
use crate::store::{SheetLayout, SheetStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellTarget {
    pub row: u32,
    pub column: char,
    pub range: String,
}

#[derive(Debug, Clone)]
pub struct CellUpdateResolver {
    layout: SheetLayout,
}

impl CellUpdateResolver {
    pub fn new(layout: SheetLayout) -> Self {
        Self { layout }
    }

    /// `None` when the sheet holds no report rows yet.
    pub fn resolve_target(&self, store: &dyn SheetStore) -> Result<Option<CellTarget>, StoreError> {
        let column = store.read_column(&self.layout.column_range(DATE_COLUMN))?;
        let Some(index) = column.iter().rposition(|value| !value.trim().is_empty()) else {
            debug!("price correction target: sheet is empty");
            return Ok(None);
        };
        if index == 0 && column[0].trim() == SHEET_COLUMNS[0] {
            debug!("price correction target: only the header row is present");
            return Ok(None);
        }

        let row = u32::try_from(index + 1)
            .map_err(|_| StoreError::Other(format!("row index {} out of range", index + 1)))?;
        Ok(Some(CellTarget {
            row,
            column: APPRAISED_PRICE_COLUMN,
            range: self.layout.cell(APPRAISED_PRICE_COLUMN, row),
        }))
    }
}
