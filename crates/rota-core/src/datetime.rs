use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  NaiveDateTime,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "rota-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "ROTA_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "ROTA_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str =
  "Asia/Manila";

pub const DATE_KEY_FORMAT: &str =
  "%Y-%m-%d";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

#[must_use]
pub fn to_project_date(
  dt: DateTime<Utc>
) -> NaiveDate {
  dt.with_timezone(project_timezone())
    .date_naive()
}

#[must_use]
pub fn format_project_timestamp(
  dt: DateTime<Utc>
) -> String {
  dt.with_timezone(project_timezone())
    .format("%Y-%m-%d %H:%M")
    .to_string()
}

/// Normalized calendar key used for
/// every date comparison in the crate.
#[must_use]
pub fn date_key(
  date: NaiveDate
) -> String {
  date.format(DATE_KEY_FORMAT).to_string()
}

/// Parses a backend date string into a
/// project-local calendar date.
///
/// Plain `YYYY-MM-DD` values are taken
/// as-is. Timestamps with an offset are
/// converted into the project timezone
/// first, so `2025-04-30T16:00:00Z`
/// lands on May 1st in Manila. Naive
/// timestamps keep their date part.
pub fn parse_iso_date(
  raw: &str
) -> Option<NaiveDate> {
  let token = raw.trim();
  if token.is_empty() {
    return None;
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token,
      DATE_KEY_FORMAT
    )
  {
    return Some(date);
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(to_project_date(
      dt.with_timezone(&Utc)
    ));
  }

  for fmt in [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S"
  ] {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Some(ndt.date());
    }
  }

  tracing::debug!(
    input = token,
    "unparseable date string"
  );
  None
}

/// Resolves a date argument typed on the
/// command line.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_date_arg(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<NaiveDate> {
  let today = to_project_date(now);
  let lower =
    input.trim().to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return Ok(
        today + Duration::days(1)
      );
    }
    | "yesterday" => {
      return Ok(
        today - Duration::days(1)
      );
    }
    | _ => {}
  }

  parse_iso_date(input).ok_or_else(|| {
    anyhow!(
      "invalid date '{input}'; \
       expected YYYY-MM-DD, today, \
       tomorrow or yesterday"
    )
  })
}

/// Minute of day for a shift clock
/// value. Accepts `07:00`, `7:00:00`,
/// `3:30pm` and bare `7AM`.
pub fn parse_clock_minutes(
  token: &str
) -> Option<u32> {
  static CLOCK_RE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  let clock_re = CLOCK_RE
    .get_or_init(|| {
      Regex::new(
        r"(?i)^(?P<hour>\d{1,2})(?::(?P<minute>\d{2})(?::\d{2})?)?\s*(?P<ampm>[ap]\.?m\.?)?$",
      )
      .ok()
    })
    .as_ref()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = match captures
    .name("minute")
  {
    | Some(m) => {
      m.as_str().parse::<u32>().ok()?
    }
    | None => 0
  };
  if minute > 59 {
    return None;
  }

  let hour = if let Some(ampm_match) =
    captures.name("ampm")
  {
    if raw_hour == 0 || raw_hour > 12 {
      return None;
    }
    let pm = ampm_match
      .as_str()
      .to_ascii_lowercase()
      .starts_with('p');
    match (pm, raw_hour) {
      | (false, 12) => 0,
      | (false, h) => h,
      | (true, 12) => 12,
      | (true, h) => h + 12
    }
  } else {
    // bare hours need a minute part,
    // otherwise "7" is ambiguous
    captures.name("minute")?;
    if raw_hour > 23 {
      return None;
    }
    raw_hour
  };

  Some(hour * 60 + minute)
}

/// `7AM`, `3:30PM`, `12NN` style label
/// for a minute-of-day value.
#[must_use]
pub fn format_clock_label(
  minutes: u32
) -> String {
  let hour = (minutes / 60) % 24;
  let minute = minutes % 60;
  if hour == 12 && minute == 0 {
    return "12NN".to_string();
  }
  let (display_hour, suffix) =
    match hour {
      | 0 => (12, "AM"),
      | 1..=11 => (hour, "AM"),
      | 12 => (12, "PM"),
      | _ => (hour - 12, "PM")
    };
  if minute == 0 {
    format!("{display_hour}{suffix}")
  } else {
    format!(
      "{display_hour}:{minute:02}{suffix}"
    )
  }
}

pub fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

#[must_use]
pub fn first_day_of_month(
  date: NaiveDate
) -> NaiveDate {
  date.with_day(1).unwrap_or(date)
}

#[must_use]
pub fn last_day_of_month(
  date: NaiveDate
) -> NaiveDate {
  let (year, month) =
    if date.month() == 12 {
      (date.year() + 1, 1)
    } else {
      (date.year(), date.month() + 1)
    };
  NaiveDate::from_ymd_opt(year, month, 1)
    .and_then(|next| next.pred_opt())
    .unwrap_or(date)
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_PROJECT_TIMEZONE,
    "DEFAULT_PROJECT_TIMEZONE"
  )
  .unwrap_or_else(|| {
    tracing::error!(
      "failed to parse fallback \
       timezone; using UTC"
    );
    chrono_tz::UTC
  })
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc,
    Weekday
  };

  use super::{
    format_clock_label,
    last_day_of_month,
    parse_clock_minutes,
    parse_date_arg,
    parse_iso_date,
    parse_weekday_name
  };

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn parses_plain_and_naive_dates() {
    assert_eq!(
      parse_iso_date("2025-05-01"),
      Some(ymd(2025, 5, 1))
    );
    assert_eq!(
      parse_iso_date(
        "2025-05-01T00:00:00.000"
      ),
      Some(ymd(2025, 5, 1))
    );
    assert_eq!(
      parse_iso_date("05/01/2025"),
      None
    );
    assert_eq!(
      parse_iso_date("  "),
      None
    );
  }

  #[test]
  fn offset_timestamps_resolve_to_one_local_day()
  {
    let first = parse_iso_date(
      "2025-05-01T03:00:00Z"
    )
    .expect("parse first");
    let second = parse_iso_date(
      "2025-05-01T03:00:00+00:00"
    )
    .expect("parse second");
    assert_eq!(first, second);
  }

  #[test]
  fn parses_relative_date_args() {
    let now = Utc
      .with_ymd_and_hms(
        2025, 5, 10, 4, 0, 0
      )
      .single()
      .expect("valid now");
    let today = super::to_project_date(now);
    assert_eq!(
      parse_date_arg("today", now)
        .expect("today"),
      today
    );
    assert_eq!(
      parse_date_arg("tomorrow", now)
        .expect("tomorrow"),
      today.succ_opt().expect("succ")
    );
    assert!(
      parse_date_arg("someday", now)
        .is_err()
    );
  }

  #[test]
  fn parses_clock_values() {
    assert_eq!(
      parse_clock_minutes("07:00"),
      Some(420)
    );
    assert_eq!(
      parse_clock_minutes("15:00:00"),
      Some(900)
    );
    assert_eq!(
      parse_clock_minutes("7AM"),
      Some(420)
    );
    assert_eq!(
      parse_clock_minutes("3:30pm"),
      Some(930)
    );
    assert_eq!(
      parse_clock_minutes("12am"),
      Some(0)
    );
    assert_eq!(
      parse_clock_minutes("7"),
      None
    );
    assert_eq!(
      parse_clock_minutes("25:00"),
      None
    );
  }

  #[test]
  fn formats_clock_labels() {
    assert_eq!(
      format_clock_label(420),
      "7AM"
    );
    assert_eq!(
      format_clock_label(900),
      "3PM"
    );
    assert_eq!(
      format_clock_label(720),
      "12NN"
    );
    assert_eq!(
      format_clock_label(1410),
      "11:30PM"
    );
  }

  #[test]
  fn month_bounds_and_weekday_names() {
    assert_eq!(
      last_day_of_month(ymd(
        2024, 2, 10
      )),
      ymd(2024, 2, 29)
    );
    assert_eq!(
      last_day_of_month(ymd(
        2025, 12, 3
      )),
      ymd(2025, 12, 31)
    );
    assert_eq!(
      parse_weekday_name("Sunday"),
      Some(Weekday::Sun)
    );
    assert_eq!(
      parse_weekday_name("funday"),
      None
    );
  }
}
