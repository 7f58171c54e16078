//! Market-data access port.

use crate::domain::error::BacktestError;
use crate::domain::ohlcv::RawSeries;
use chrono::NaiveDate;

pub trait DataPort {
    /// Rows for `symbol` (all rows when `None` and the source holds a single
    /// instrument), limited to the inclusive date range. Cells the source
    /// lacks stay missing; nothing is validated here.
    fn fetch_bars(
        &self,
        symbol: Option<&str>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<RawSeries, BacktestError>;

    fn list_symbols(&self) -> Result<Vec<String>, BacktestError>;
}
