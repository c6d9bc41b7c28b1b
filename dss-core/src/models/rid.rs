//! Remote-ID records
//!
//! Identification service areas announce broadcast coverage; subscriptions
//! pair an airspace volume with a callback URL and carry the per-subscriber
//! notification index. Both use the timestamp version dialect.

use chrono::{DateTime, Duration, Utc};

use crate::error::{DssError, DssResult};
use crate::geo::CellUnion;
use crate::models::{Id, Owner, Version};

/// Tolerated clock skew when a client supplies an explicit start time in
/// the past.
pub const MAX_CLOCK_SKEW_MINUTES: i64 = 5;

/// Hard cap on a subscription's time window.
pub const MAX_SUBSCRIPTION_DURATION_HOURS: i64 = 24;

/// Per-owner density limit: simultaneous subscriptions in any single cell.
pub const MAX_SUBSCRIPTIONS_PER_AREA: i64 = 10;

/// Remote-ID broadcast coverage volume.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentificationServiceArea {
    pub id: Id,
    pub owner: Owner,
    pub url: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub altitude_lo: Option<f32>,
    pub altitude_hi: Option<f32>,
    pub cells: CellUnion,
    /// Identity of the writer process, used to shard expired-record cleanup
    /// across replicas.
    pub writer: String,
    pub version: Option<Version>,
}

impl IdentificationServiceArea {
    /// Fills defaults and validates the time window against `now` and the
    /// previous version of the record, if any.
    pub fn adjust_time_range(
        &mut self,
        now: DateTime<Utc>,
        old: Option<&IdentificationServiceArea>,
    ) -> DssResult<()> {
        if self.start_time.is_none() {
            self.start_time = old.and_then(|o| o.start_time).or(Some(now));
        } else if let Some(start) = self.start_time {
            if now - start > Duration::minutes(MAX_CLOCK_SKEW_MINUTES) {
                return Err(DssError::BadRequest(
                    "IdentificationServiceArea time_start must not be in the past".to_string(),
                ));
            }
        }
        if self.end_time.is_none() {
            self.end_time = old.and_then(|o| o.end_time);
        }
        let end = self.end_time.ok_or_else(|| {
            DssError::BadRequest("IdentificationServiceArea must have a time_end".to_string())
        })?;
        let start = self.start_time.expect("start_time was defaulted above");
        if end < start {
            return Err(DssError::BadRequest(
                "IdentificationServiceArea time_end must be after time_start".to_string(),
            ));
        }
        if end < now {
            return Err(DssError::BadRequest(
                "IdentificationServiceArea time_end must be in the future".to_string(),
            ));
        }
        Ok(())
    }
}

/// Remote-ID subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: Id,
    pub owner: Owner,
    pub url: String,
    pub notification_index: i32,
    pub cells: CellUnion,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub writer: String,
    pub version: Option<Version>,
}

impl Subscription {
    /// Fills defaults and validates the time window; subscriptions are
    /// additionally capped at 24 hours.
    pub fn adjust_time_range(
        &mut self,
        now: DateTime<Utc>,
        old: Option<&Subscription>,
    ) -> DssResult<()> {
        if self.start_time.is_none() {
            self.start_time = old.and_then(|o| o.start_time).or(Some(now));
        } else if let Some(start) = self.start_time {
            if now - start > Duration::minutes(MAX_CLOCK_SKEW_MINUTES) {
                return Err(DssError::BadRequest(
                    "Subscription time_start must not be in the past".to_string(),
                ));
            }
        }
        if self.end_time.is_none() {
            self.end_time = old.and_then(|o| o.end_time);
        }
        let end = self
            .end_time
            .ok_or_else(|| DssError::BadRequest("Subscription must have a time_end".to_string()))?;
        let start = self.start_time.expect("start_time was defaulted above");
        if end < start {
            return Err(DssError::BadRequest(
                "Subscription time_end must be after time_start".to_string(),
            ));
        }
        if end - start > Duration::hours(MAX_SUBSCRIPTION_DURATION_HOURS) {
            return Err(DssError::BadRequest(format!(
                "Subscription window exceeds {MAX_SUBSCRIPTION_DURATION_HOURS} hours"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::CellUnion;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn subscription() -> Subscription {
        Subscription {
            id: Id::parse("9d158f59-80b7-4dd9-870e-f2013508a9d9").unwrap(),
            owner: Owner::new("uss1"),
            url: "https://uss1.example.com/notify".to_string(),
            notification_index: 0,
            cells: CellUnion::default(),
            start_time: None,
            end_time: Some(now() + Duration::hours(1)),
            writer: String::new(),
            version: None,
        }
    }

    #[test]
    fn test_missing_start_defaults_to_now() {
        let mut s = subscription();
        s.adjust_time_range(now(), None).unwrap();
        assert_eq!(s.start_time, Some(now()));
    }

    #[test]
    fn test_start_in_past_rejected() {
        let mut s = subscription();
        s.start_time = Some(now() - Duration::hours(1));
        assert!(s.adjust_time_range(now(), None).is_err());
    }

    #[test]
    fn test_small_skew_tolerated() {
        let mut s = subscription();
        s.start_time = Some(now() - Duration::minutes(2));
        assert!(s.adjust_time_range(now(), None).is_ok());
    }

    #[test]
    fn test_missing_end_inherited_from_old() {
        let old = subscription();
        let mut s = subscription();
        s.end_time = None;
        s.adjust_time_range(now(), Some(&old)).unwrap();
        assert_eq!(s.end_time, old.end_time);
    }

    #[test]
    fn test_missing_end_without_old_rejected() {
        let mut s = subscription();
        s.end_time = None;
        assert!(s.adjust_time_range(now(), None).is_err());
    }

    #[test]
    fn test_window_longer_than_a_day_rejected() {
        let mut s = subscription();
        s.end_time = Some(now() + Duration::hours(25));
        assert!(s.adjust_time_range(now(), None).is_err());
    }

    #[test]
    fn test_isa_end_before_start_rejected() {
        let mut isa = IdentificationServiceArea {
            id: Id::parse("9d158f59-80b7-4dd9-870e-f2013508a9d9").unwrap(),
            owner: Owner::new("uss1"),
            url: "https://uss1.example.com/rid".to_string(),
            start_time: Some(now() + Duration::hours(2)),
            end_time: Some(now() + Duration::hours(1)),
            altitude_lo: None,
            altitude_hi: None,
            cells: CellUnion::default(),
            writer: String::new(),
            version: None,
        };
        assert!(isa.adjust_time_range(now(), None).is_err());
    }
}
