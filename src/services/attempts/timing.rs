use time::{Duration, PrimitiveDateTime};

use crate::core::time::seconds_until;

/// `started_at + duration`. The assignment window does not shorten it.
pub(crate) fn deadline(started_at: PrimitiveDateTime, duration_minutes: i32) -> PrimitiveDateTime {
    started_at + Duration::minutes(i64::from(duration_minutes.max(0)))
}

pub(crate) fn is_expired(deadline: PrimitiveDateTime, now: PrimitiveDateTime) -> bool {
    now >= deadline
}

/// Never negative; computed on every read.
pub(crate) fn remaining_seconds(deadline: PrimitiveDateTime, now: PrimitiveDateTime) -> i64 {
    seconds_until(now, deadline)
}
