use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use regex::Regex;
use std::sync::LazyLock;

/// `YYYY:MM:DD HH:MM:SS` with an optional `±HH:MM` / `±HHMM` offset.
static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<y>\d{4,}):(?P<mo>\d{1,2}):(?P<d>\d{1,2}) (?P<h>\d{1,2}):(?P<mi>\d{1,2}):(?P<s>\d{1,2})(?P<off>[+-]\d{2}:?\d{2})?$",
    )
    .unwrap()
});

/// Earliest year accepted. Older values are treated as unparseable.
pub const MIN_YEAR: i32 = 1970;

/// Parse an exiftool-style timestamp into an absolute point in time.
///
/// Returns `None` when the string does not have the expected shape, when the
/// captured values do not form a real calendar date, or when the year is
/// before [`MIN_YEAR`]. A missing offset means UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let caps = TIMESTAMP_RE.captures(raw.trim())?;

    let year: i32 = caps["y"].parse().ok()?;
    if year < MIN_YEAR {
        return None;
    }

    let date = NaiveDate::from_ymd_opt(year, caps["mo"].parse().ok()?, caps["d"].parse().ok()?)?;
    let naive = date.and_hms_opt(caps["h"].parse().ok()?, caps["mi"].parse().ok()?, caps["s"].parse().ok()?)?;

    let offset = match caps.name("off") {
        Some(m) => parse_offset(m.as_str())?,
        None => FixedOffset::east_opt(0)?,
    };

    offset.from_local_datetime(&naive).single()
}

/// `+HH:MM` or `+HHMM` (sign required) to a fixed offset.
fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let normalized = raw.replace(':', "");
    let (sign, digits) = normalized.split_at(1);
    let hours: i32 = digits.get(..2)?.parse().ok()?;
    let minutes: i32 = digits.get(2..4)?.parse().ok()?;
    if minutes >= 60 {
        return None;
    }

    let seconds = hours * 3600 + minutes * 60;
    match sign {
        "+" => FixedOffset::east_opt(seconds),
        "-" => FixedOffset::west_opt(seconds),
        _ => None,
    }
}
