//! Timestamp synthesis and tolerant parsing.
//!
//! Upstream feeds in the simulated environment disagree on date formatting, so
//! the weather generator deliberately renders each row's timestamp in one of
//! three valid textual formats, and occasionally emits outright garbage.
//! Everything downstream (season derivation, rush-hour lookup, the merge key)
//! must parse whatever survived, falling back per row rather than failing.

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Observation cadence: one row every two hours from the base timestamp.
pub const HOURS_PER_ROW: i64 = 2;

/// Malformed sentinel strings simulating upstream corruption.
pub const MALFORMED_SENTINELS: [&str; 3] = ["2099-13-40 25:61", "Unknown", "TBD"];

/// Canonical rendering used by the merge key.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const RENDER_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M", "%d/%m/%Y %I%p", "%Y-%m-%dT%H:%MZ"];

/// First observation of the synthetic series.
pub fn base_datetime() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("static base date is valid")
}

/// The clean timestamp for row `index`.
pub fn row_datetime(index: usize) -> NaiveDateTime {
    base_datetime() + Duration::hours(HOURS_PER_ROW * index as i64)
}

/// Synthesize the textual timestamp for row `index`.
///
/// With probability `malformed_ratio` one of the garbage sentinels is emitted;
/// otherwise the sequential timestamp is rendered in a randomly chosen format.
pub fn synth_timestamp(rng: &mut ChaCha8Rng, index: usize, malformed_ratio: f64) -> String {
    if rng.gen::<f64>() < malformed_ratio {
        let pick = rng.gen_range(0..MALFORMED_SENTINELS.len());
        return MALFORMED_SENTINELS[pick].to_string();
    }
    let dt = row_datetime(index);
    let fmt = RENDER_FORMATS[rng.gen_range(0..RENDER_FORMATS.len())];
    dt.format(fmt).to_string()
}

/// Parse a timestamp in any of the formats this system emits.
///
/// Returns `None` for sentinels, nulls-as-empty-strings, and anything else
/// that fits no known format. The 12-hour format carries no minutes, so it is
/// handled by splitting date and hour by hand; `chrono` cannot complete a
/// `NaiveDateTime` from an hour alone.
pub fn parse_flexible(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in [CANONICAL_FORMAT, "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%MZ"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    parse_twelve_hour(s)
}

/// Parse `DD/MM/YYYY HHAM` / `DD/MM/YYYY HHPM`.
fn parse_twelve_hour(s: &str) -> Option<NaiveDateTime> {
    let (date_part, time_part) = s.split_once(' ')?;
    let date = NaiveDate::parse_from_str(date_part, "%d/%m/%Y").ok()?;
    let upper = time_part.to_ascii_uppercase();
    let (digits, pm) = if let Some(d) = upper.strip_suffix("AM") {
        (d, false)
    } else if let Some(d) = upper.strip_suffix("PM") {
        (d, true)
    } else {
        return None;
    };
    let hour12: u32 = digits.parse().ok()?;
    if !(1..=12).contains(&hour12) {
        return None;
    }
    let hour = match (hour12, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    };
    date.and_hms_opt(hour, 0, 0)
}

/// Coerce a raw timestamp to the canonical merge-key form.
pub fn canonicalize(raw: &str) -> Option<String> {
    parse_flexible(raw).map(|dt| dt.format(CANONICAL_FORMAT).to_string())
}

/// Hour of day, when the raw timestamp parses.
pub fn hour_of(raw: &str) -> Option<u32> {
    parse_flexible(raw).map(|dt| dt.hour())
}
