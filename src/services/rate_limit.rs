//! Per-tenant request throttling.
//!
//! Fixed one-minute windows tracked in a concurrent map. The limiter is
//! process-local; a multi-replica deployment multiplies the effective budget
//! by the replica count, which is acceptable for a throughput guard.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
struct Window {
    /// Minute bucket since the epoch
    minute: i64,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    limit_per_minute: u32,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            limit_per_minute,
            windows: DashMap::new(),
        }
    }

    /// Records one request for the tenant, failing with `RateLimited` and a
    /// retry-after hint once the minute budget is exhausted.
    pub fn check(&self, tenant_id: &str, now: DateTime<Utc>) -> Result<()> {
        let minute = now.timestamp().div_euclid(60);

        let mut entry = self
            .windows
            .entry(tenant_id.to_string())
            .or_insert(Window { minute, count: 0 });

        if entry.minute != minute {
            entry.minute = minute;
            entry.count = 0;
        }

        if entry.count >= self.limit_per_minute {
            let window_end = (minute + 1) * 60;
            let retry_after_seconds = (window_end - now.timestamp()).max(1) as u64;
            return Err(Error::RateLimited {
                retry_after_seconds,
            });
        }

        entry.count += 1;
        Ok(())
    }

    /// Drops stale windows so the map does not grow with tenant churn.
    pub fn evict_stale(&self, now: DateTime<Utc>) {
        let minute = now.timestamp().div_euclid(60);
        self.windows.retain(|_, window| window.minute >= minute - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, second).unwrap()
    }

    #[test]
    fn test_budget_enforced_within_window() {
        let limiter = RateLimiter::new(3);
        for _ in 0..3 {
            limiter.check("tenant-a", at(10)).unwrap();
        }
        let err = limiter.check("tenant-a", at(20)).unwrap_err();
        match err {
            Error::RateLimited {
                retry_after_seconds,
            } => assert_eq!(retry_after_seconds, 40),
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_window_resets_next_minute() {
        let limiter = RateLimiter::new(1);
        limiter.check("tenant-a", at(59)).unwrap();
        assert!(limiter.check("tenant-a", at(59)).is_err());

        let next_minute = Utc.with_ymd_and_hms(2024, 5, 1, 12, 1, 0).unwrap();
        assert!(limiter.check("tenant-a", next_minute).is_ok());
    }

    #[test]
    fn test_tenants_are_independent() {
        let limiter = RateLimiter::new(1);
        limiter.check("tenant-a", at(0)).unwrap();
        assert!(limiter.check("tenant-b", at(0)).is_ok());
        assert!(limiter.check("tenant-a", at(1)).is_err());
    }

    #[test]
    fn test_evict_stale_drops_old_windows() {
        let limiter = RateLimiter::new(10);
        limiter.check("tenant-a", at(0)).unwrap();
        let much_later = Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap();
        limiter.evict_stale(much_later);
        assert!(limiter.windows.is_empty());
    }
}
