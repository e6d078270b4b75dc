use anyhow::Context;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

// Australian Eastern Standard Time. Daylight saving is not modelled; override with
// NEWSLETTER_UTC_OFFSET_HOURS=11 over the summer if the send time matters to the minute.
const DEFAULT_OFFSET_HOURS: i32 = 10;

pub fn newsletter_offset() -> anyhow::Result<FixedOffset> {
    let hours = crate::config::parse_env::<i32>("NEWSLETTER_UTC_OFFSET_HOURS")?
        .unwrap_or(DEFAULT_OFFSET_HOURS);
    offset_from_hours(hours)
}

pub fn offset_from_hours(hours: i32) -> anyhow::Result<FixedOffset> {
    anyhow::ensure!(
        (-12..=14).contains(&hours),
        "UTC offset must be within -12..=14 hours (got {hours})"
    );
    FixedOffset::east_opt(hours * 3600).context("invalid UTC offset")
}

/// Calendar date of `now_utc` as seen in the newsletter's time zone.
pub fn local_date(now_utc: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now_utc.with_timezone(&offset).date_naive()
}

pub fn format_timestamp(now_utc: DateTime<Utc>, offset: FixedOffset) -> String {
    now_utc
        .with_timezone(&offset)
        .format("%Y-%m-%d %H:%M:%S %:z")
        .to_string()
}

pub fn parse_send_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .with_context(|| format!("send time must be HH:MM (got {s:?})"))
}

/// The first instant strictly after `now_utc` whose local wall-clock time is `at`.
pub fn next_run_after(
    now_utc: DateTime<Utc>,
    offset: FixedOffset,
    at: NaiveTime,
) -> anyhow::Result<DateTime<Utc>> {
    let today = local_date(now_utc, offset);
    for day in [today, today + Duration::days(1)] {
        let candidate = offset
            .from_local_datetime(&day.and_time(at))
            .single()
            .context("ambiguous local send time")?
            .with_timezone(&Utc);
        if candidate > now_utc {
            return Ok(candidate);
        }
    }
    anyhow::bail!("could not compute next run after {now_utc}")
}
