use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Format a UTC instant as RFC 3339, the wire format of every timestamp we emit.
pub fn format_rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_default()
}

pub fn parse_rfc3339(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339).ok()
}

pub fn epoch_ms(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_epoch_ms(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn epoch_ms_roundtrips_through_rfc3339() {
        let at = datetime!(2026-03-01 08:30:00 UTC);
        let ms = epoch_ms(at);
        assert_eq!(ms, 1_772_353_800_000);
        assert_eq!(
            format_rfc3339(from_epoch_ms(ms).unwrap()),
            "2026-03-01T08:30:00Z"
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_rfc3339("yesterday").is_none());
        assert!(parse_rfc3339("2026-03-01T08:30:00Z").is_some());
    }
}
