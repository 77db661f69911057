//! Periodic sampling of calendar dates.
use crate::error::{AcquisitionError, Result};
use chrono::{Local, NaiveDate, TimeDelta};
use std::fmt;
use std::str::FromStr;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// End of a date range. `Current` resolves to today's date when the range is generated,
/// so runs that need to be reproducible should pin a date.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndDate {
    Current,
    On(NaiveDate),
}

impl EndDate {
    pub fn resolve(self) -> NaiveDate {
        match self {
            Self::Current => Local::now().date_naive(),
            Self::On(date) => date,
        }
    }
}

impl FromStr for EndDate {
    type Err = AcquisitionError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("current") {
            return Ok(Self::Current);
        }
        parse_date(s).map(Self::On)
    }
}

impl fmt::Display for EndDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => write!(f, "current"),
            Self::On(date) => write!(f, "{}", date.format(DATE_FORMAT)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: EndDate,
    pub period: TimeDelta,
}

impl DateRange {
    pub fn weekly(start: NaiveDate, end: EndDate) -> Self {
        Self {
            start,
            end,
            period: TimeDelta::weeks(1),
        }
    }

    pub fn generate(&self) -> Result<Vec<NaiveDate>> {
        generate(self.start, self.end, self.period)
    }
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| AcquisitionError::InvalidRange(format!("'{s}' is not a YYYY-MM-DD date: {e}")))
}

/// Every `period` from `start` up to and including the last date not after `end`.
pub fn generate(start: NaiveDate, end: EndDate, period: TimeDelta) -> Result<Vec<NaiveDate>> {
    if period <= TimeDelta::zero() {
        return Err(AcquisitionError::InvalidRange(format!(
            "period must be positive, got {period}"
        )));
    }
    let end = end.resolve();
    if start > end {
        return Err(AcquisitionError::InvalidRange(format!(
            "start {start} is after end {end}"
        )));
    }

    let mut dates = vec![];
    let mut current = Some(start);
    while let Some(date) = current.filter(|d| *d <= end) {
        dates.push(date);
        current = date.checked_add_signed(period);
    }
    Ok(dates)
}
