use std::fmt;
use std::str::FromStr;

use chrono::{
  DateTime,
  Duration,
  NaiveDate,
  NaiveDateTime,
  Timelike,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use serde::{
  Deserialize,
  Serialize
};
use thiserror::Error;

pub const DEADLINE_FORMAT: &str =
  "%Y-%m-%d";
pub const REMINDER_FORMAT: &str =
  "%Y-%m-%dT%H:%M";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
  #[error(
    "invalid reminder '{0}': expected \
     YYYY-MM-DDTHH:MM"
  )]
  Reminder(String),

  #[error(
    "invalid deadline '{0}': expected \
     YYYY-MM-DD, today, tomorrow or +Nd"
  )]
  Deadline(String)
}

/// A reminder timestamp in local wall-clock time, minute precision.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
)]
#[serde(
  try_from = "String",
  into = "String"
)]
pub struct Reminder(NaiveDateTime);

impl Reminder {
  pub fn parse(
    raw: &str
  ) -> Result<Self, ParseError> {
    let trimmed = raw.trim();
    let Some(caps) = reminder_re()
      .and_then(|re| {
        re.captures(trimmed)
      })
    else {
      return Err(ParseError::Reminder(
        raw.to_string()
      ));
    };

    let normalized = format!(
      "{}T{}",
      &caps["date"], &caps["time"]
    );
    NaiveDateTime::parse_from_str(
      &normalized,
      REMINDER_FORMAT
    )
    .map(Reminder)
    .map_err(|_| {
      ParseError::Reminder(
        raw.to_string()
      )
    })
  }

  pub fn from_naive(
    at: NaiveDateTime
  ) -> Self {
    let truncated = at
      .with_second(0)
      .and_then(|t| t.with_nanosecond(0))
      .unwrap_or(at);
    Reminder(truncated)
  }

  pub fn at(&self) -> NaiveDateTime {
    self.0
  }
}

impl fmt::Display for Reminder {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(
      f,
      "{}",
      self.0.format(REMINDER_FORMAT)
    )
  }
}

impl FromStr for Reminder {
  type Err = ParseError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    Reminder::parse(s)
  }
}

impl TryFrom<String> for Reminder {
  type Error = ParseError;

  fn try_from(
    value: String
  ) -> Result<Self, Self::Error> {
    Reminder::parse(&value)
  }
}

impl From<Reminder> for String {
  fn from(value: Reminder) -> Self {
    value.to_string()
  }
}

fn reminder_re() -> Option<Regex> {
  Regex::new(
    r"^(?P<date>\d{4}-\d{2}-\d{2})[T ](?P<time>\d{2}:\d{2})$",
  )
  .ok()
}

/// Parses a deadline entered by a user.
///
/// Accepts an ISO date plus the shorthands `today`, `tomorrow` and `+Nd`,
/// resolved against `today`.
pub fn parse_deadline(
  input: &str,
  today: NaiveDate
) -> Result<NaiveDate, ParseError> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  let offset = match lower.as_str() {
    | "today" => Some(0),
    | "tomorrow" => Some(1),
    | _ => {
      lower
        .strip_prefix('+')
        .and_then(|rest| {
          rest.strip_suffix('d')
        })
        .and_then(|n| {
          n.parse::<i64>().ok()
        })
    }
  };

  if let Some(days) = offset {
    return Duration::try_days(days)
      .and_then(|delta| {
        today.checked_add_signed(delta)
      })
      .ok_or_else(|| {
        ParseError::Deadline(
          input.to_string()
        )
      });
  }

  NaiveDate::parse_from_str(
    token,
    DEADLINE_FORMAT
  )
  .map_err(|_| {
    ParseError::Deadline(
      input.to_string()
    )
  })
}

pub fn parse_timezone(
  raw: &str
) -> anyhow::Result<Tz> {
  let trimmed = raw.trim();
  trimmed.parse::<Tz>().map_err(|err| {
    tracing::error!(
      timezone = %trimmed,
      error = %err,
      "failed to parse timezone id"
    );
    anyhow::anyhow!(
      "unknown timezone: {trimmed}"
    )
  })
}

/// Converts UTC instants into the configured local wall clock.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
  tz: Tz
}

impl Default for WallClock {
  fn default() -> Self {
    Self { tz: chrono_tz::UTC }
  }
}

impl WallClock {
  pub fn new(tz: Tz) -> Self {
    Self { tz }
  }

  #[must_use]
  pub fn local(
    &self,
    now: DateTime<Utc>
  ) -> NaiveDateTime {
    now
      .with_timezone(&self.tz)
      .naive_local()
  }

  #[must_use]
  pub fn today(
    &self,
    now: DateTime<Utc>
  ) -> NaiveDate {
    self.local(now).date()
  }
}

/// A deadline has elapsed once its whole day is behind the local clock.
pub fn deadline_elapsed(
  deadline: NaiveDate,
  local_now: NaiveDateTime
) -> bool {
  local_now.date() > deadline
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Urgency {
  Overdue,
  DueToday,
  Upcoming
}

pub fn deadline_urgency(
  deadline: NaiveDate,
  today: NaiveDate
) -> Urgency {
  if deadline < today {
    Urgency::Overdue
  } else if deadline == today {
    Urgency::DueToday
  } else {
    Urgency::Upcoming
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::*;

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn reminder_accepts_t_or_space() {
    let a = Reminder::parse(
      "2026-03-01T09:30"
    )
    .expect("t separator");
    let b = Reminder::parse(
      "2026-03-01 09:30"
    )
    .expect("space separator");
    assert_eq!(a, b);
    assert_eq!(
      a.to_string(),
      "2026-03-01T09:30"
    );
  }

  #[test]
  fn reminder_rejects_malformed() {
    for raw in [
      "",
      "tomorrow",
      "2026-03-01",
      "2026-13-01T09:30",
      "2026-03-01T25:00",
      "2026-03-01T09:30:15"
    ] {
      assert!(
        Reminder::parse(raw).is_err(),
        "{raw} should be rejected"
      );
    }
  }

  #[test]
  fn reminder_serializes_as_string() {
    let reminder = Reminder::parse(
      "2026-03-01T09:30"
    )
    .expect("parse");
    let json =
      serde_json::to_string(&reminder)
        .expect("serialize");
    assert_eq!(
      json,
      "\"2026-03-01T09:30\""
    );
    let back: Reminder =
      serde_json::from_str(&json)
        .expect("deserialize");
    assert_eq!(back, reminder);
  }

  #[test]
  fn deadline_shorthands() {
    let today = date(2026, 2, 17);
    assert_eq!(
      parse_deadline("today", today),
      Ok(today)
    );
    assert_eq!(
      parse_deadline("Tomorrow", today),
      Ok(date(2026, 2, 18))
    );
    assert_eq!(
      parse_deadline("+14d", today),
      Ok(date(2026, 3, 3))
    );
    assert_eq!(
      parse_deadline(
        "2099-01-01",
        today
      ),
      Ok(date(2099, 1, 1))
    );
    assert!(
      parse_deadline("soon", today)
        .is_err()
    );
  }

  #[test]
  fn deadline_offset_overflow_is_an_error()
  {
    let today = date(2026, 2, 17);
    for raw in [
      "+99999999999d",
      "+9223372036854775807d"
    ] {
      assert_eq!(
        parse_deadline(raw, today),
        Err(ParseError::Deadline(
          raw.to_string()
        ))
      );
    }
  }

  #[test]
  fn wall_clock_shifts_day_across_timezones()
  {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 3, 0, 0
      )
      .single()
      .expect("valid now");
    let utc = WallClock::default();
    let mexico = WallClock::new(
      parse_timezone(
        "America/Mexico_City"
      )
      .expect("tz")
    );
    assert_eq!(
      utc.today(now),
      date(2026, 2, 17)
    );
    assert_eq!(
      mexico.today(now),
      date(2026, 2, 16)
    );
  }

  #[test]
  fn deadline_elapses_after_its_day() {
    let deadline = date(2026, 2, 17);
    let same_day_late = deadline
      .and_hms_opt(23, 59, 0)
      .expect("time");
    let next_day = date(2026, 2, 18)
      .and_hms_opt(0, 0, 0)
      .expect("time");
    assert!(!deadline_elapsed(
      deadline,
      same_day_late
    ));
    assert!(deadline_elapsed(
      deadline, next_day
    ));
  }

  #[test]
  fn urgency_labels() {
    let today = date(2026, 2, 17);
    assert_eq!(
      deadline_urgency(
        date(2026, 2, 16),
        today
      ),
      Urgency::Overdue
    );
    assert_eq!(
      deadline_urgency(today, today),
      Urgency::DueToday
    );
    assert_eq!(
      deadline_urgency(
        date(2026, 2, 18),
        today
      ),
      Urgency::Upcoming
    );
  }
}
