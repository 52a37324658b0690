// src/ingest/providers/dst.rs
//! Real-time hourly Dst, one monthly text file (Kyoto WDC layout).
//!
//! Data lines start with `DST yyyy mm`; the integer tokens are
//! `[year, month, day, h00 .. h23, daily mean]`.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use metrics::histogram;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{ParseContext, RequestShape, SourceParser};
use crate::error::SourceError;
use crate::ingest::types::{IndexSeries, Sample};

pub const DST_MIN: i64 = -500;
pub const DST_MAX: i64 = 200;
pub const DST_SENTINELS: [i64; 4] = [9999, 99999, -9999, -99999];

const FIRST_HOUR_TOKEN: usize = 3;
const LAST_HOUR_TOKEN: usize = FIRST_HOUR_TOKEN + 23;
const MIN_TOKENS: usize = 27;
const DAY_TOKEN: usize = 2;

static RE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^DST\s+(\d{4})\s+(\d{2})").expect("dst line regex"));
static RE_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+").expect("int regex"));

pub fn is_valid_dst(v: i64) -> bool {
    !DST_SENTINELS.contains(&v) && (DST_MIN..=DST_MAX).contains(&v)
}

pub struct DstParser;

/// Integer tokens of every data line, in file order.
///
/// A token that does not fit an `i64` becomes the `9999` sentinel so the
/// hour columns stay aligned. Rows whose day is not `1..=31` are dropped.
fn data_rows(body: &str) -> Vec<Vec<i64>> {
    body.lines()
        .filter(|l| RE_LINE.is_match(l))
        .map(|l| {
            RE_INT
                .find_iter(l)
                .map(|m| m.as_str().parse::<i64>().unwrap_or(DST_SENTINELS[0]))
                .collect::<Vec<_>>()
        })
        .filter(|toks| toks.len() >= MIN_TOKENS && (1..=31).contains(&toks[DAY_TOKEN]))
        .collect()
}

/// `month_start + (day - 1) days + hour`, or `None` on overflow.
fn cell_time(month_start: DateTime<Utc>, day: i64, hour: usize) -> Option<DateTime<Utc>> {
    let days = Duration::try_days(day - 1)?;
    let hours = Duration::try_hours(i64::try_from(hour).ok()?)?;
    month_start.checked_add_signed(days)?.checked_add_signed(hours)
}

impl SourceParser for DstParser {
    fn family(&self) -> &'static str {
        "dst"
    }

    fn shape(&self) -> RequestShape {
        RequestShape::Dated
    }

    fn parse(&self, body: &str, ctx: &ParseContext) -> Result<IndexSeries, SourceError> {
        let t0 = std::time::Instant::now();
        let rows = data_rows(body);
        if rows.is_empty() {
            return Err(SourceError::format("no DST data lines"));
        }

        let today = ctx.now.day() as i64;
        let hour = ctx.now.hour() as usize;
        let month_start = NaiveDate::from_ymd_opt(ctx.now.year(), ctx.now.month(), 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|n| n.and_utc())
            .ok_or_else(|| SourceError::format("invalid reference month"))?;

        // Current UTC day and hour first.
        let current = rows.iter().find_map(|toks| {
            if toks[DAY_TOKEN] != today {
                return None;
            }
            let v = *toks.get(FIRST_HOUR_TOKEN + hour)?;
            if !is_valid_dst(v) {
                return None;
            }
            Some((cell_time(month_start, toks[DAY_TOKEN], hour)?, v))
        });

        // Otherwise the last valid hourly cell anywhere in the month.
        let found = current.or_else(|| {
            rows.iter().rev().find_map(|toks| {
                (FIRST_HOUR_TOKEN..=LAST_HOUR_TOKEN).rev().find_map(|i| {
                    if !is_valid_dst(toks[i]) {
                        return None;
                    }
                    let ts = cell_time(month_start, toks[DAY_TOKEN], i - FIRST_HOUR_TOKEN)?;
                    Some((ts, toks[i]))
                })
            })
        });

        histogram!("geomag_parse_ms", "family" => "dst").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(match found {
            Some((ts, v)) => IndexSeries::new(vec![Sample::new(ts, Some(v as f64))]),
            None => IndexSeries::empty(),
        })
    }

    fn confidence(&self, _series: &IndexSeries) -> u8 {
        85
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn line(day: u32, hours: &[i64]) -> String {
        let mut cells: Vec<String> = hours.iter().map(|h| h.to_string()).collect();
        while cells.len() < 24 {
            cells.push("9999".into());
        }
        format!("DST 2024 05 {:02} {} 9999", day, cells.join(" "))
    }

    #[test]
    fn picks_current_day_and_hour() {
        let body = format!(
            "header\n{}\n{}\n",
            line(9, &[-10; 24]),
            line(10, &[-20, -25, -30, -42])
        );
        let ctx = ParseContext::at(Utc.with_ymd_and_hms(2024, 5, 10, 3, 15, 0).unwrap());
        let s = DstParser.parse(&body, &ctx).unwrap();
        assert_eq!(s.values(), vec![Some(-42.0)]);
        assert_eq!(
            s.timestamps()[0],
            Utc.with_ymd_and_hms(2024, 5, 10, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn falls_back_to_last_valid_cell() {
        let body = format!("{}\n{}\n", line(9, &[-10, -11, -12]), line(10, &[-20, 99999]));
        // 05:00 on day 10 is a sentinel
        let ctx = ParseContext::at(Utc.with_ymd_and_hms(2024, 5, 10, 5, 0, 0).unwrap());
        let s = DstParser.parse(&body, &ctx).unwrap();
        assert_eq!(s.values(), vec![Some(-20.0)]);
        assert_eq!(
            s.timestamps()[0],
            Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn sentinels_and_out_of_range_are_never_data() {
        assert!(!is_valid_dst(9999));
        assert!(!is_valid_dst(-99999));
        assert!(!is_valid_dst(-600));
        assert!(is_valid_dst(-500));
        let body = format!("{}\n", line(10, &[-700, 300]));
        let ctx = ParseContext::at(Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap());
        assert!(DstParser.parse(&body, &ctx).unwrap().is_empty());
    }

    #[test]
    fn short_lines_are_ignored() {
        let ctx = ParseContext::at(Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap());
        assert!(matches!(
            DstParser.parse("DST 2024 05 10 -5 -6", &ctx),
            Err(SourceError::Format(_))
        ));
    }

    #[test]
    fn day_outside_month_is_skipped_not_fatal() {
        let ctx = ParseContext::at(Utc.with_ymd_and_hms(2024, 5, 10, 5, 0, 0).unwrap());
        let bad = format!(
            "DST 2024 05 999999999999 {} 9999",
            ["-10"; 24].join(" ")
        );
        // the only data line is unusable
        assert!(matches!(
            DstParser.parse(&bad, &ctx),
            Err(SourceError::Format(_))
        ));

        let zero_day = format!("DST 2024 05 00 {} 9999", ["-11"; 24].join(" "));
        let body = format!("{}\n{}\n{}\n", line(9, &[-12]), bad, zero_day);
        let s = DstParser.parse(&body, &ctx).unwrap();
        assert_eq!(s.values(), vec![Some(-12.0)]);
        assert_eq!(
            s.timestamps()[0],
            Utc.with_ymd_and_hms(2024, 5, 9, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn truncated_row_next_to_good_row() {
        let ctx = ParseContext::at(Utc.with_ymd_and_hms(2024, 5, 10, 2, 0, 0).unwrap());
        let body = format!("{}\nDST 2024 05 10 -20 -21\n", line(9, &[-30, -31]));
        let s = DstParser.parse(&body, &ctx).unwrap();
        assert_eq!(s.values(), vec![Some(-31.0)]);
    }

    #[test]
    fn oversized_cell_keeps_columns() {
        let mut cells = vec!["-15".to_string(); 24];
        cells[0] = "99999999999999999999".into();
        cells[3] = "-44".into();
        let body = format!("DST 2024 05 10 {} 9999\n", cells.join(" "));
        let ctx = ParseContext::at(Utc.with_ymd_and_hms(2024, 5, 10, 3, 0, 0).unwrap());
        let s = DstParser.parse(&body, &ctx).unwrap();
        // hour 3 still reads its own cell
        assert_eq!(s.values(), vec![Some(-44.0)]);
        assert_eq!(
            s.timestamps()[0],
            Utc.with_ymd_and_hms(2024, 5, 10, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn non_numeric_day_drops_the_row() {
        // without a day token the first hour would be read as the day
        let body = format!("DST 2024 05 xx {} 9999\n", ["-10"; 24].join(" "));
        let ctx = ParseContext::at(Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap());
        assert!(matches!(
            DstParser.parse(&body, &ctx),
            Err(SourceError::Format(_))
        ));
    }
}
