// Repository functions.
//
// Every function takes a `&Connection`, so the same code composes
// inside a unit of work (a `Transaction` derefs to `Connection`) or
// directly against the store for read-only paths.

pub mod dependencies;
pub mod items;
pub mod nodes;
pub mod profile;
pub mod projects;
pub mod sessions;

use chrono::{DateTime, NaiveDate, Utc};

pub(crate) const DATE_FMT: &str = "%Y-%m-%d";

pub(crate) fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn opt_ts_to_sql(ts: &Option<DateTime<Utc>>) -> Option<String> {
    ts.as_ref().map(ts_to_sql)
}

pub(crate) fn date_to_sql(date: &NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

pub(crate) fn opt_date_to_sql(date: &Option<NaiveDate>) -> Option<String> {
    date.as_ref().map(date_to_sql)
}

pub(crate) fn parse_ts(idx: usize, raw: String) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn parse_opt_ts(
    idx: usize,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    raw.map(|s| parse_ts(idx, s)).transpose()
}

pub(crate) fn parse_date(idx: usize, raw: String) -> Result<NaiveDate, rusqlite::Error> {
    NaiveDate::parse_from_str(&raw, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_opt_date(
    idx: usize,
    raw: Option<String>,
) -> Result<Option<NaiveDate>, rusqlite::Error> {
    raw.map(|s| parse_date(idx, s)).transpose()
}
