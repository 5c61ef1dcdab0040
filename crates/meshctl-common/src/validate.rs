use chrono::{
    DateTime,
    Utc,
};

use crate::error::Error;

/// `start_time < end_time` — the edge's `ServiceGraphMetricsRequest` handler
/// (C7) validation per spec.md §4.7: non-nil times with `end_time >
/// start_time`, nothing more. The manager and the edge are different
/// processes with their own clocks, so C7 must not reject a well-formed
/// request just because the edge's clock lags the manager's.
pub fn validate_request_order(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Result<(), Error> {
    if start_time >= end_time {
        return Err(Error::invalid_argument(
            "start_time must be before end_time",
        ));
    }
    Ok(())
}

/// `start_time < end_time`, both in the past — the stricter check for the
/// manager's `GetServiceConnections` frontend operation (C8), per spec.md
/// §4.8, where `now` is the manager's own clock.
pub fn validate_time_range(
    start_time: DateTime<Utc>, end_time: DateTime<Utc>, now: DateTime<Utc>,
) -> Result<(), Error> {
    validate_request_order(start_time, end_time)?;
    if end_time > now {
        return Err(Error::invalid_argument("end_time must not be in the future"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_range() {
        let now = Utc::now();
        let start = now - chrono::Duration::hours(1);
        assert!(validate_time_range(start, start, now).is_err());
        assert!(validate_time_range(now, start, now).is_err());
    }

    #[test]
    fn rejects_future_end() {
        let now = Utc::now();
        let start = now - chrono::Duration::hours(1);
        let future = now + chrono::Duration::hours(1);
        assert!(validate_time_range(start, future, now).is_err());
    }

    #[test]
    fn accepts_sane_range() {
        let now = Utc::now();
        let start = now - chrono::Duration::hours(1);
        assert!(validate_time_range(start, now, now).is_ok());
    }

    #[test]
    fn request_order_ignores_future_end_time() {
        let now = Utc::now();
        let start = now - chrono::Duration::hours(1);
        let future = now + chrono::Duration::hours(1);
        assert!(validate_request_order(start, future).is_ok());
    }

    #[test]
    fn request_order_still_rejects_inverted_range() {
        let now = Utc::now();
        let start = now - chrono::Duration::hours(1);
        assert!(validate_request_order(start, start).is_err());
        assert!(validate_request_order(now, start).is_err());
    }
}
