//! Local clock time + named zone → absolute instant.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// Resolve an IANA zone name (e.g. `Europe/Paris`).
pub fn resolve_zone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

/// Interpret `clock` on `date` as wall-clock time in `zone`.
///
/// Ambiguous local times (clocks turned back) resolve to the earliest
/// instant. Times inside a spring-forward gap use the offset in effect
/// before the transition, so the wall clock reads later than requested.
pub fn compose(date: NaiveDate, clock: NaiveTime, zone: Tz) -> DateTime<Utc> {
    let local = date.and_time(clock);
    match zone.from_local_datetime(&local) {
        chrono::LocalResult::Single(t) => t.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        chrono::LocalResult::None => {
            let before = zone
                .offset_from_utc_datetime(&(local - Duration::days(1)))
                .fix()
                .local_minus_utc();
            Utc.from_utc_datetime(&(local - Duration::seconds(i64::from(before))))
        }
    }
}
