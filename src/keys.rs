use crate::error::Result;
use crate::type_selector::MatchFamily;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::cmp::Ordering;
use tracing::warn;

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y", "%Y%m%d"];

/// Parse a timestamp string into epoch milliseconds (UTC).
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp_millis());
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyColumn {
    Text(Vec<Option<String>>),
    Number(Vec<Option<f64>>),
    Timestamp(Vec<Option<i64>>),
}

impl KeyColumn {
    /// Extract a column in the representation of the given match family.
    pub fn extract(series: &Series, family: MatchFamily) -> Result<Self> {
        match family {
            MatchFamily::String => Self::text(series),
            MatchFamily::Numeric => Self::number(series),
            MatchFamily::Datetime => Self::timestamp(series),
        }
    }

    /// Extract a column for sorting, choosing the representation from its dtype.
    pub fn for_ordering(series: &Series) -> Result<Self> {
        match series.dtype() {
            DataType::Date | DataType::Datetime(_, _) => Self::timestamp(series),
            dt if dt.is_numeric() => Self::number(series),
            _ => Self::text(series),
        }
    }

    fn text(series: &Series) -> Result<Self> {
        let casted = series.cast(&DataType::String)?;
        let values = casted
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect();
        Ok(KeyColumn::Text(values))
    }

    fn number(series: &Series) -> Result<Self> {
        let casted = series.cast(&DataType::Float64)?;
        let values = casted
            .f64()?
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect();
        Ok(KeyColumn::Number(values))
    }

    fn timestamp(series: &Series) -> Result<Self> {
        let values: Vec<Option<i64>> = match series.dtype() {
            DataType::Date | DataType::Datetime(_, _) => {
                let millis = series
                    .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
                    .cast(&DataType::Int64)?;
                millis.i64()?.into_iter().collect()
            }
            dt if dt.is_numeric() => {
                let millis = series.cast(&DataType::Int64)?;
                millis.i64()?.into_iter().collect()
            }
            _ => {
                let casted = series.cast(&DataType::String)?;
                let raw = casted.str()?;
                let mut unparsed = 0usize;
                let values: Vec<Option<i64>> = raw
                    .into_iter()
                    .map(|v| {
                        v.and_then(|s| {
                            let parsed = parse_timestamp(s);
                            if parsed.is_none() {
                                unparsed += 1;
                            }
                            parsed
                        })
                    })
                    .collect();
                if unparsed > 0 {
                    warn!(
                        "{} value(s) in column '{}' could not be parsed as timestamps",
                        unparsed,
                        series.name()
                    );
                }
                values
            }
        };
        Ok(KeyColumn::Timestamp(values))
    }

    pub fn len(&self) -> usize {
        match self {
            KeyColumn::Text(v) => v.len(),
            KeyColumn::Number(v) => v.len(),
            KeyColumn::Timestamp(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compare two rows ascending, nulls last.
    pub fn compare(&self, a: usize, b: usize) -> Ordering {
        match self {
            KeyColumn::Text(v) => nulls_last(v[a].as_ref(), v[b].as_ref(), |x, y| x.cmp(y)),
            KeyColumn::Number(v) => nulls_last(v[a].as_ref(), v[b].as_ref(), |x, y| x.total_cmp(y)),
            KeyColumn::Timestamp(v) => nulls_last(v[a].as_ref(), v[b].as_ref(), |x, y| x.cmp(y)),
        }
    }
}

fn nulls_last<T>(a: Option<&T>, b: Option<&T>, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
