use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime, PrimitiveDateTime};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

/// Returns `now`, or one microsecond past `previous` when the clock has not moved forward.
pub(crate) fn strictly_after(previous: PrimitiveDateTime, now: PrimitiveDateTime) -> PrimitiveDateTime {
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn format_primitive_outputs_utc_z() {
        assert_eq!(format_primitive(datetime!(2025-01-02 10:20:30)), "2025-01-02T10:20:30Z");
    }

    #[test]
    fn strictly_after_never_goes_backwards() {
        let previous = datetime!(2025-01-02 10:20:30);

        assert_eq!(
            strictly_after(previous, datetime!(2025-01-02 10:20:31)),
            datetime!(2025-01-02 10:20:31)
        );
        assert_eq!(
            strictly_after(previous, datetime!(2025-01-02 10:00:00)),
            datetime!(2025-01-02 10:20:30.000001)
        );
        assert_eq!(strictly_after(previous, previous), datetime!(2025-01-02 10:20:30.000001));
    }
}
