//! Which `updated_at` range a run asks the source API for.
//!
//! Either the caller names both calendar days, or the run picks up where the
//! table left off: `[MAX(watermark), now]`.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::warehouse::{TableRef, Warehouse};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive `[start, end]` range. `start <= end` holds for every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, SyncError> {
        if start > end {
            return Err(SyncError::InvalidRange(format!(
                "start {} is after end {}",
                format_ts(start),
                format_ts(end)
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

/// Second precision with an explicit `+00:00` offset, as the API filters expect.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Invocation payload. Both fields are optional; empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

impl SyncRequest {
    pub fn incremental() -> Self {
        Self::default()
    }

    pub fn between(start: &str, end: &str) -> Self {
        Self {
            start: Some(start.to_string()),
            end: Some(end.to_string()),
        }
    }
}

/// Parse `YYYY-MM-DD` as midnight UTC.
pub fn parse_date(s: &str) -> Result<DateTime<Utc>, SyncError> {
    let day = NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|e| {
        SyncError::InvalidRange(format!("`{s}` is not a {DATE_FORMAT} date: {e}"))
    })?;
    Ok(day.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// `Some(window)` when the caller named both days, `None` for an incremental run.
/// One bound without the other is rejected.
pub fn explicit_window(req: &SyncRequest) -> Result<Option<TimeWindow>, SyncError> {
    match (present(&req.start), present(&req.end)) {
        (Some(start), Some(end)) => {
            TimeWindow::new(parse_date(start)?, parse_date(end)?).map(Some)
        }
        (None, None) => Ok(None),
        (Some(_), None) => Err(SyncError::InvalidRange(
            "`start` given without `end`".to_string(),
        )),
        (None, Some(_)) => Err(SyncError::InvalidRange(
            "`end` given without `start`".to_string(),
        )),
    }
}

/// Resolve the run's window. Incremental runs read the table's current
/// watermark; an empty table falls back to `bootstrap` or fails with
/// `EmptyTable`.
pub async fn resolve_window(
    req: &SyncRequest,
    table: &TableRef,
    watermark_field: &str,
    warehouse: &dyn Warehouse,
    bootstrap: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<TimeWindow, SyncError> {
    if let Some(window) = explicit_window(req)? {
        return Ok(window);
    }

    let start = match warehouse.max_watermark(table, watermark_field).await? {
        Some(ts) => ts,
        None => match bootstrap {
            Some(ts) => {
                tracing::info!(
                    target: "sync",
                    table = %table,
                    bootstrap = %format_ts(ts),
                    "empty table, starting from bootstrap date"
                );
                ts
            }
            None => {
                return Err(SyncError::EmptyTable {
                    table: table.to_string(),
                })
            }
        },
    };

    TimeWindow::new(start, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_rejects_inverted_bounds() {
        let a = Utc.with_ymd_and_hms(2021, 9, 2, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2021, 9, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            TimeWindow::new(a, b),
            Err(SyncError::InvalidRange(_))
        ));
        assert!(TimeWindow::new(b, b).is_ok());
    }

    #[test]
    fn format_keeps_seconds_and_offset() {
        let ts = Utc.with_ymd_and_hms(2021, 9, 1, 7, 5, 3).unwrap();
        assert_eq!(format_ts(ts), "2021-09-01T07:05:03+00:00");
    }

    #[test]
    fn blank_strings_count_as_absent() {
        let req = SyncRequest {
            start: Some("  ".into()),
            end: None,
        };
        assert_eq!(explicit_window(&req).unwrap(), None);
    }

    #[test]
    fn half_open_request_is_invalid() {
        let req = SyncRequest {
            start: Some("2021-09-01".into()),
            end: None,
        };
        assert!(matches!(
            explicit_window(&req),
            Err(SyncError::InvalidRange(_))
        ));
    }

    #[test]
    fn malformed_date_is_invalid() {
        assert!(matches!(
            parse_date("2021/09/01"),
            Err(SyncError::InvalidRange(_))
        ));
    }
}
