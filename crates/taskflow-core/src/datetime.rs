use std::sync::LazyLock;

use chrono::{
  DateTime,
  Days,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use thiserror::Error;

pub const DEFAULT_TIMEZONE: &str = "UTC";

static DAY_FIRST: LazyLock<Option<Regex>> =
  LazyLock::new(|| {
    Regex::new(
      r"^(?P<d>\d{1,2})[-.](?P<m>\d{1,2})[-.](?P<y>\d{4})$"
    )
    .ok()
  });

static YEAR_FIRST: LazyLock<Option<Regex>> =
  LazyLock::new(|| {
    Regex::new(
      r"^(?P<y>\d{4})-(?P<m>\d{1,2})-(?P<d>\d{1,2})$"
    )
    .ok()
  });

const QUERY_TIMESTAMP_FORMAT: &str =
  "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unrecognized date: {input}")]
pub struct DateParseError {
  pub input: String
}

pub fn parse_timezone(
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
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured timezone"
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

#[must_use]
pub fn local_date(
  now: DateTime<Utc>,
  tz: &Tz
) -> NaiveDate {
  now.with_timezone(tz).date_naive()
}

#[must_use]
pub fn today_in(tz: &Tz) -> NaiveDate {
  local_date(Utc::now(), tz)
}

/// First and last second of `day`, as sent in the due-date range filter.
#[must_use]
pub fn day_bounds(
  day: NaiveDate
) -> (NaiveDateTime, NaiveDateTime) {
  let start =
    day.and_time(NaiveTime::MIN);
  let end = day.and_time(
    NaiveTime::from_hms_opt(23, 59, 59)
      .unwrap_or(NaiveTime::MIN)
  );
  (start, end)
}

#[must_use]
pub fn format_query_timestamp(
  dt: NaiveDateTime
) -> String {
  dt.format(QUERY_TIMESTAMP_FORMAT)
    .to_string()
}

#[must_use]
pub fn format_due(
  day: NaiveDate
) -> String {
  day.format("%d-%m-%Y").to_string()
}

#[must_use]
pub fn format_api_date(
  day: NaiveDate
) -> String {
  day.format("%Y-%m-%d").to_string()
}

/// Parses user due-date input. `Ok(None)` means "no deadline".
pub fn parse_due(
  input: &str,
  today: NaiveDate
) -> Result<Option<NaiveDate>, DateParseError>
{
  let token =
    input.trim().to_lowercase();
  let invalid = || DateParseError {
    input: input.trim().to_string()
  };

  match token.as_str() {
    | "" | "-" => return Ok(None),
    | "today" => return Ok(Some(today)),
    | "tomorrow" => {
      return today
        .checked_add_days(Days::new(1))
        .map(Some)
        .ok_or_else(invalid);
    }
    | _ => {}
  }

  if let Some(rest) =
    token.strip_prefix('+')
  {
    let days: u64 = rest
      .parse()
      .map_err(|_| invalid())?;
    return today
      .checked_add_days(Days::new(days))
      .map(Some)
      .ok_or_else(invalid);
  }

  if let Some(day) =
    parse_numeric_date(&token)
  {
    return Ok(Some(day));
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(&token)
  {
    return Ok(Some(dt.date_naive()));
  }
  if let Ok(ndt) =
    NaiveDateTime::parse_from_str(
      &token,
      "%Y-%m-%dt%H:%M:%S"
    )
  {
    return Ok(Some(ndt.date()));
  }

  Err(invalid())
}

fn parse_numeric_date(
  token: &str
) -> Option<NaiveDate> {
  let day_first = DAY_FIRST.as_ref()?;
  let year_first = YEAR_FIRST.as_ref()?;
  let caps = day_first
    .captures(token)
    .or_else(|| {
      year_first.captures(token)
    })?;

  let year: i32 =
    caps.name("y")?.as_str().parse().ok()?;
  let month: u32 =
    caps.name("m")?.as_str().parse().ok()?;
  let day: u32 =
    caps.name("d")?.as_str().parse().ok()?;
  NaiveDate::from_ymd_opt(
    year, month, day
  )
}

/// Reduces an API date field (`YYYY-MM-DD` or any ISO timestamp) to its date.
pub fn parse_api_date(
  raw: &str
) -> Option<NaiveDate> {
  let trimmed = raw.trim();
  if let Ok(day) =
    NaiveDate::parse_from_str(
      trimmed, "%Y-%m-%d"
    )
  {
    return Some(day);
  }
  if let Ok(dt) =
    DateTime::parse_from_rfc3339(trimmed)
  {
    return Some(dt.date_naive());
  }
  trimmed
    .get(..10)
    .and_then(|prefix| {
      NaiveDate::parse_from_str(
        prefix, "%Y-%m-%d"
      )
      .ok()
    })
}

pub mod api_date_serde {
  pub mod option {
    use chrono::NaiveDate;
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    use crate::datetime::{
      format_api_date,
      parse_api_date
    };

    pub fn serialize<S>(
      day: &Option<NaiveDate>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match day {
        | Some(value) => {
          serializer.serialize_str(
            &format_api_date(*value)
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<Option<NaiveDate>, D::Error>
    where
      D: Deserializer<'de>
    {
      let raw = Option::<String>::deserialize(
        deserializer
      )?;
      match raw {
        | None => Ok(None),
        | Some(text)
          if text.trim().is_empty() =>
        {
          Ok(None)
        }
        | Some(text) => {
          parse_api_date(&text)
            .map(Some)
            .ok_or_else(|| {
              serde::de::Error::custom(
                format!(
                  "invalid date: {text}"
                )
              )
            })
        }
      }
    }
  }
}
