// src/backfill/dates.rs

//! Date-range expansion for backfill plans.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Step size when expanding a date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Day,
    Week,
    Month,
}

/// Which logical dates a backfill covers: an explicit list, or a range
/// expanded by granularity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateSpec {
    Custom {
        custom_dates: Vec<NaiveDate>,
    },
    Range {
        start_date: NaiveDate,
        end_date: NaiveDate,
        #[serde(default, rename = "date_granularity")]
        granularity: Granularity,
    },
}

impl DateSpec {
    pub fn custom<I>(dates: I) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        Self::Custom {
            custom_dates: dates.into_iter().collect(),
        }
    }

    pub fn range(start: NaiveDate, end: NaiveDate, granularity: Granularity) -> Self {
        Self::Range {
            start_date: start,
            end_date: end,
            granularity,
        }
    }
}

/// Expand a [`DateSpec`] into the ordered list of logical dates.
///
/// - explicit lists are used verbatim, order preserved;
/// - `Day` steps one calendar day from start to end inclusive;
/// - `Week` rolls the start back to the Monday of its week, then steps
///   7 days while not past the end;
/// - `Month` rolls the start back to day 1 of its month, then steps to the
///   1st of each following month while not past the end.
pub fn expand(spec: &DateSpec) -> Result<Vec<NaiveDate>> {
    let (start, end, granularity) = match spec {
        DateSpec::Custom { custom_dates } => return Ok(custom_dates.clone()),
        DateSpec::Range {
            start_date,
            end_date,
            granularity,
        } => (*start_date, *end_date, *granularity),
    };

    if end < start {
        return Err(Error::InvalidDateRange(format!(
            "end date {end} is before start date {start}"
        )));
    }

    let first = match granularity {
        Granularity::Day => Some(start),
        Granularity::Week => {
            start.checked_sub_days(Days::new(start.weekday().num_days_from_monday().into()))
        }
        Granularity::Month => start.with_day(1),
    };

    let mut dates = Vec::new();
    let mut current = first;

    while let Some(date) = current {
        if date > end {
            break;
        }
        dates.push(date);
        current = match granularity {
            Granularity::Day => date.succ_opt(),
            Granularity::Week => date.checked_add_days(Days::new(7)),
            Granularity::Month => next_month_start(date),
        };
    }

    Ok(dates)
}

fn next_month_start(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}
