// src/freshness.rs
use chrono::{DateTime, TimeDelta, Utc};

/// Freshness rule for a scope watermark: data is fresh while strictly less
/// than `ttl_secs` old. No watermark means never ingested, so stale. A zero
/// TTL disables caching entirely.
pub fn is_fresh(watermark: Option<DateTime<Utc>>, ttl_secs: u64, now: DateTime<Utc>) -> bool {
    if ttl_secs == 0 {
        return false;
    }
    let Some(mark) = watermark else {
        return false;
    };
    let ttl = TimeDelta::seconds(ttl_secs.min(i64::MAX as u64) as i64);
    now.signed_duration_since(mark) < ttl
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn fresh_strictly_inside_ttl() {
        assert!(is_fresh(Some(at(0)), 3600, at(3599)));
    }

    #[test]
    fn stale_at_exact_ttl_boundary() {
        assert!(!is_fresh(Some(at(0)), 3600, at(3600)));
        assert!(!is_fresh(Some(at(0)), 3600, at(3601)));
    }

    #[test]
    fn no_watermark_is_stale() {
        assert!(!is_fresh(None, 3600, at(0)));
    }

    #[test]
    fn zero_ttl_disables_caching() {
        assert!(!is_fresh(Some(at(0)), 0, at(0)));
    }

    #[test]
    fn future_watermark_counts_as_fresh() {
        // clock skew between ingest stamp and gate check
        assert!(is_fresh(Some(at(10)), 3600, at(0)));
    }
}
