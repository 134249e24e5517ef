//! Converts instants to the user's local calendar.
//!
//! Whether a ledger entry is "in the past" is decided on the owner's local
//! calendar date, not on UTC, so every date comparison goes through here.

use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset, macros::time};
use time_tz::{Offset, TimeZone, Tz};

use crate::{Error, user::User};

/// A source of the current instant.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> OffsetDateTime;
}

/// A [Clock] that reads the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A [Clock] that always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// Get the timezone of `user`.
///
/// # Errors
/// This function will return a:
/// - [Error::MissingTimezone] if the user has not set a timezone,
/// - or [Error::InvalidTimezoneError] if the timezone is not a canonical IANA name.
pub fn resolve_timezone(user: &User) -> Result<&'static Tz, Error> {
    let name = user
        .timezone
        .as_deref()
        .ok_or(Error::MissingTimezone(user.id))?;

    get_timezone(name)
}

pub(crate) fn get_timezone(canonical_timezone: &str) -> Result<&'static Tz, Error> {
    time_tz::timezones::get_by_name(canonical_timezone)
        .ok_or_else(|| Error::InvalidTimezoneError(canonical_timezone.to_owned()))
}

fn offset_at(instant: OffsetDateTime, tz: &Tz) -> UtcOffset {
    tz.get_offset_utc(&instant).to_utc()
}

/// Convert `instant` to the local time in `tz`.
pub fn to_local(instant: OffsetDateTime, tz: &Tz) -> OffsetDateTime {
    instant.to_offset(offset_at(instant, tz))
}

/// The current local time in `tz`.
pub fn local_now(clock: &dyn Clock, tz: &Tz) -> OffsetDateTime {
    to_local(clock.now(), tz)
}

/// The calendar date of `instant` in `tz`.
pub fn local_date(instant: OffsetDateTime, tz: &Tz) -> Date {
    to_local(instant, tz).date()
}

/// The instant of noon on `date` in `tz`.
///
/// Ledger entries are stored at local noon so that small offset changes never
/// move an entry onto a neighbouring day.
pub fn local_noon(date: Date, tz: &Tz) -> OffsetDateTime {
    let noon = PrimitiveDateTime::new(date, time!(12:00));
    // Guess with the offset at noon UTC, then correct with the offset in
    // effect at the guessed instant.
    let guess = noon.assume_offset(offset_at(noon.assume_utc(), tz));

    noon.assume_offset(offset_at(guess, tz))
}

#[cfg(test)]
mod timezone_tests {
    use time::macros::{date, datetime};

    use crate::{Error, user::{User, UserID}};

    use super::{get_timezone, local_date, local_noon, resolve_timezone, to_local};

    #[test]
    fn missing_timezone_is_an_error() {
        let user = User {
            id: UserID::new(7),
            timezone: None,
        };

        assert_eq!(resolve_timezone(&user), Err(Error::MissingTimezone(UserID::new(7))));
    }

    #[test]
    fn invalid_timezone_is_an_error() {
        let user = User {
            id: UserID::new(1),
            timezone: Some("Middle/Earth".to_owned()),
        };

        assert_eq!(
            resolve_timezone(&user),
            Err(Error::InvalidTimezoneError("Middle/Earth".to_owned()))
        );
    }

    #[test]
    fn local_date_crosses_midnight() {
        let tz = get_timezone("Pacific/Auckland").unwrap();
        // 20:00 UTC on the 14th is the morning of the 15th in Auckland.
        let instant = datetime!(2024-01-14 20:00 UTC);

        assert_eq!(local_date(instant, tz), date!(2024 - 01 - 15));
    }

    #[test]
    fn to_local_keeps_the_same_instant() {
        let tz = get_timezone("America/New_York").unwrap();
        let instant = datetime!(2024-07-01 03:00 UTC);

        let local = to_local(instant, tz);

        assert_eq!(local, instant);
        assert_eq!(local.date(), date!(2024 - 06 - 30));
    }

    #[test]
    fn local_noon_is_noon_on_the_same_day() {
        let tz = get_timezone("Pacific/Auckland").unwrap();

        for day in [date!(2024 - 01 - 15), date!(2024 - 04 - 07), date!(2024 - 09 - 29)] {
            let noon = to_local(local_noon(day, tz), tz);

            assert_eq!(noon.date(), day);
            assert_eq!(noon.hour(), 12, "want noon on {day}, got {noon}");
        }
    }
}
