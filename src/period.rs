//! Calendar arithmetic for the portal, which only understands absolute dates.

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::{Datelike, NaiveDate, TimeDelta};

use crate::prelude::*;

/// Whether the historical curves should be requested on this poll.
///
/// The very first poll always counts as a new period.
#[must_use]
pub fn is_new_period(last_poll_date: Option<NaiveDate>, now: NaiveDate) -> bool {
    last_poll_date.is_none_or(|last_poll_date| last_poll_date != now)
}

/// Month as the maximeter endpoint expects it: `MM/YYYY`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        ensure!((1..=12).contains(&month), "invalid month: {month}");
        Ok(Self { year, month })
    }
}

impl From<NaiveDate> for YearMonth {
    fn from(date: NaiveDate) -> Self {
        Self { year: date.year(), month: date.month() }
    }
}

impl Display for YearMonth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}/{:04}", self.month, self.year)
    }
}

impl FromStr for YearMonth {
    type Err = Error;

    /// Accepts both `MM/YYYY` and `YYYY-MM`.
    fn from_str(s: &str) -> Result<Self> {
        let (year, month) = if let Some((month, year)) = s.split_once('/') {
            (year, month)
        } else if let Some((year, month)) = s.split_once('-') {
            (year, month)
        } else {
            bail!("expected `MM/YYYY` or `YYYY-MM`, got `{s}`");
        };
        Self::new(
            year.trim().parse().with_context(|| format!("invalid year in `{s}`"))?,
            month.trim().parse().with_context(|| format!("invalid month in `{s}`"))?,
        )
    }
}

/// Dates of the historical requests made once per calendar day.
#[must_use]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HistoryWindow {
    pub yesterday: NaiveDate,
    pub week_start: NaiveDate,
    pub month_start: NaiveDate,
    pub maximeter_from: YearMonth,
    pub maximeter_to: YearMonth,
}

impl HistoryWindow {
    pub fn anchored_at(today: NaiveDate) -> Self {
        Self {
            yesterday: today - TimeDelta::days(1),
            week_start: today - TimeDelta::days(8),
            month_start: today - TimeDelta::days(30),
            // A year and a month back.
            maximeter_from: YearMonth::from(today - TimeDelta::days(395)),
            maximeter_to: YearMonth::from(today),
        }
    }
}
