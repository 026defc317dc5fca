use time::{
    format_description::well_known::Rfc3339, Duration, OffsetDateTime, PrimitiveDateTime,
    UtcOffset,
};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    to_primitive_utc(OffsetDateTime::now_utc())
}

pub(crate) fn to_primitive_utc(value: OffsetDateTime) -> PrimitiveDateTime {
    let utc = value.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

pub(crate) fn format_optional(value: Option<PrimitiveDateTime>) -> Option<String> {
    value.map(format_primitive)
}

/// Whole seconds from `from` to `to`, clamped at zero.
pub(crate) fn seconds_until(from: PrimitiveDateTime, to: PrimitiveDateTime) -> i64 {
    let delta: Duration = to - from;
    delta.whole_seconds().max(0)
}

/// Wall-clock nanoseconds since the unix epoch, truncated to 64 bits.
pub(crate) fn unix_nanos_now() -> u64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as u64
}
