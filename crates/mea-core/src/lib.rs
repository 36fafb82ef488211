//! Core domain model shared by every pipeline stage of MEA.

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "mea-core";

/// Indicator code reserved for the locally sourced corruption index.
pub const CPI_INDICATOR_CODE: &str = "CPI";

/// Human-readable label for the locally sourced indicator.
pub const CPI_INDICATOR_NAME: &str = "Corruption Perception Index";

/// Closed year range covered by the local CPI file.
pub const CPI_YEARS: std::ops::RangeInclusive<i32> = 2012..=2020;

/// One observation of one indicator for one country and year. This is the
/// unit handed between pipeline stages and the unit persisted into
/// `indicator_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorRecord {
    pub indicator_name: String,
    pub indicator_code: String,
    /// ISO3 code; `None` for aggregate regions the API reports without one
    /// or for an empty ISO3 cell in the local file.
    pub country_code: Option<String>,
    pub year: i32,
    /// Raw observation value exactly as the source provided it. Numeric
    /// coercion happens at the table boundary, not here.
    pub value: Option<String>,
    /// Pre-assigned rank for CPI rows, carried verbatim from the source
    /// file. `None` everywhere else until the rank update pass runs in SQL.
    pub rank: Option<String>,
}
