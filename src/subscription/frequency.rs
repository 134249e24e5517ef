//! How often a subscription recurs, and the dates it recurs on.

use rusqlite::{
    ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::{Date, Duration, Month};

use crate::error::UnknownVariant;

/// How often a subscription charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    /// Every day.
    Daily,
    /// Every seven days.
    Weekly,
    /// Every fourteen days.
    Biweekly,
    /// Every calendar month, on the start date's day of the month.
    Monthly,
    /// Every year, on the start date's month and day.
    Yearly,
}

impl Frequency {
    /// The value stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Biweekly => "BIWEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }

    /// The date of the `n`th occurrence of a schedule that starts on `start`.
    ///
    /// Occurrences are counted from the start date rather than from the
    /// previous occurrence, so a monthly schedule starting on the 31st falls
    /// on the last day of shorter months and returns to the 31st afterwards.
    /// Returns `None` once the date would overflow the calendar.
    pub fn occurrence(self, start: Date, n: u32) -> Option<Date> {
        match self {
            Self::Daily => start.checked_add(Duration::days(n.into())),
            Self::Weekly => start.checked_add(Duration::weeks(n.into())),
            Self::Biweekly => start.checked_add(Duration::weeks(2 * i64::from(n))),
            Self::Monthly => add_months(start, n),
            Self::Yearly => add_months(start, n.checked_mul(12)?),
        }
    }
}

impl ToSql for Frequency {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Frequency {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "DAILY" => Ok(Self::Daily),
            "WEEKLY" => Ok(Self::Weekly),
            "BIWEEKLY" => Ok(Self::Biweekly),
            "MONTHLY" => Ok(Self::Monthly),
            "YEARLY" => Ok(Self::Yearly),
            other => Err(FromSqlError::Other(Box::new(UnknownVariant {
                kind: "frequency",
                value: other.to_owned(),
            }))),
        }
    }
}

fn add_months(date: Date, months: u32) -> Option<Date> {
    let zero_based = i64::from(date.month() as u8 - 1) + i64::from(months);
    let year = i32::try_from(i64::from(date.year()) + zero_based.div_euclid(12)).ok()?;
    let month = Month::try_from(u8::try_from(zero_based.rem_euclid(12) + 1).ok()?).ok()?;

    // Clamp to the last day of shorter months.
    (28..=date.day())
        .rev()
        .find_map(|day| Date::from_calendar_date(year, month, day).ok())
        .or_else(|| Date::from_calendar_date(year, month, date.day()).ok())
}
