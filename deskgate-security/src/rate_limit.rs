//! Token bucket admission control per tenant and per source address.
//!
//! Every `(subject, bucket family)` pair owns one bucket holding up to twice
//! the family's per-minute rate, refilled continuously at `rpm / 60` tokens
//! per second. Reads and writes share the tenant API bucket; a write simply
//! costs two tokens.

use dashmap::DashMap;
use deskgate_core::config::RateLimitSettings;
use deskgate_core::error::{GatewayError, Result};
use deskgate_core::types::TenantId;
use parking_lot::Mutex;
use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Burst capacity as a multiple of the per-minute rate.
pub const BURST_MULTIPLIER: u32 = 2;

/// Who a bucket belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    /// An authenticated tenant.
    Tenant(TenantId),
    /// An unauthenticated caller, keyed by source address.
    Source(IpAddr),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tenant(id) => write!(f, "tenant:{id}"),
            Self::Source(ip) => write!(f, "ip:{ip}"),
        }
    }
}

/// Independent bucket families with their own base rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketFamily {
    /// Tenant API calls.
    Api,
    /// Login attempts.
    Login,
    /// Signup attempts.
    Signup,
    /// Admin console calls.
    Console,
}

impl BucketFamily {
    /// Returns the configured requests per minute for this family.
    #[must_use]
    pub const fn rpm(&self, settings: &RateLimitSettings) -> u32 {
        match self {
            Self::Api => settings.tenant_rpm,
            Self::Login => settings.login_rpm,
            Self::Signup => settings.signup_rpm,
            Self::Console => settings.console_rpm,
        }
    }
}

/// Class of the operation being admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    /// Upstream read.
    Read,
    /// Upstream create, update or delete.
    Write,
    /// Login attempt.
    Login,
    /// Signup attempt.
    Signup,
    /// Admin console call.
    Console,
}

impl OperationClass {
    /// Tokens consumed by one operation of this class.
    #[must_use]
    pub const fn cost(&self) -> u32 {
        match self {
            Self::Write => 2,
            _ => 1,
        }
    }

    /// Bucket family the operation draws from.
    #[must_use]
    pub const fn family(&self) -> BucketFamily {
        match self {
            Self::Read | Self::Write => BucketFamily::Api,
            Self::Login => BucketFamily::Login,
            Self::Signup => BucketFamily::Signup,
            Self::Console => BucketFamily::Console,
        }
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Tokens were deducted.
    Allowed {
        /// Whole tokens left in the bucket.
        remaining: u32,
    },
    /// Not enough tokens; nothing was deducted.
    Denied {
        /// Time until enough tokens accrue.
        retry_after: Duration,
    },
}

impl Admission {
    /// Returns true if the operation was admitted.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Converts a denial into whole seconds, rounded up and at least one.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Allowed { .. } => None,
            Self::Denied { retry_after } => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let secs = retry_after.as_secs_f64().ceil() as u64;
                Some(secs.max(1))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BucketKey {
    subject: Subject,
    family: BucketFamily,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket for one subject and family.
#[derive(Debug)]
struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_per_sec: f64,
}

impl TokenBucket {
    fn new(rpm: u32, now: Instant) -> Self {
        let rpm = rpm.max(1);
        let capacity = f64::from(rpm.saturating_mul(BURST_MULTIPLIER));
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: now,
            }),
            capacity,
            refill_per_sec: f64::from(rpm) / 60.0,
        }
    }

    fn try_consume(&self, cost: u32, now: Instant) -> Admission {
        let cost = f64::from(cost);
        let mut state = self.state.lock();

        let elapsed = now.saturating_duration_since(state.last_refill);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
        if now > state.last_refill {
            state.last_refill = now;
        }

        if state.tokens >= cost {
            state.tokens -= cost;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let remaining = state.tokens.max(0.0).floor() as u32;
            Admission::Allowed { remaining }
        } else {
            let needed = cost - state.tokens;
            Admission::Denied {
                retry_after: Duration::from_secs_f64(needed / self.refill_per_sec),
            }
        }
    }

    fn last_refill(&self) -> Instant {
        self.state.lock().last_refill
    }
}

/// Rate limiter holding one token bucket per subject and family.
///
/// Checks for different subjects never block each other beyond a brief
/// shard lock; checks on one bucket are serialized so tokens are never
/// double-spent.
#[derive(Debug)]
pub struct RateLimiter {
    settings: RateLimitSettings,
    buckets: DashMap<BucketKey, TokenBucket>,
}

impl RateLimiter {
    /// Creates a new rate limiter.
    #[must_use]
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            buckets: DashMap::new(),
        }
    }

    /// Returns the active settings.
    #[must_use]
    pub const fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    /// Checks and, if admitted, deducts tokens for one operation.
    pub fn check(&self, subject: Subject, class: OperationClass) -> Admission {
        self.check_at(subject, class, Instant::now())
    }

    /// Same as [`check`](Self::check) at an explicit instant.
    pub fn check_at(&self, subject: Subject, class: OperationClass, now: Instant) -> Admission {
        if !self.settings.enabled {
            return Admission::Allowed {
                remaining: u32::MAX,
            };
        }

        let family = class.family();
        let rpm = family.rpm(&self.settings);
        let bucket = self
            .buckets
            .entry(BucketKey { subject, family })
            .or_insert_with(|| TokenBucket::new(rpm, now));

        let admission = bucket.try_consume(class.cost(), now);
        if let Admission::Denied { retry_after } = admission {
            warn!(
                subject = %subject,
                family = ?family,
                retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                "Rate limit exceeded"
            );
        }
        admission
    }

    /// Checks an operation and converts a denial into an error.
    pub fn require(&self, subject: Subject, class: OperationClass) -> Result<()> {
        match self.check(subject, class).retry_after_secs() {
            None => Ok(()),
            Some(secs) => Err(GatewayError::rate_limited(secs)),
        }
    }

    /// Drops every bucket belonging to a subject.
    pub fn reset(&self, subject: Subject) {
        self.buckets.retain(|key, _| key.subject != subject);
        debug!(subject = %subject, "Rate limit buckets reset");
    }

    /// Removes buckets untouched for at least `idle`.
    ///
    /// Returns the number of buckets removed.
    pub fn cleanup(&self, idle: Duration) -> usize {
        self.cleanup_at(idle, Instant::now())
    }

    fn cleanup_at(&self, idle: Duration, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill()) < idle);
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            debug!(removed, "Idle rate limit buckets removed");
        }
        removed
    }

    /// Returns the number of live buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn settings(tenant_rpm: u32) -> RateLimitSettings {
        RateLimitSettings {
            tenant_rpm,
            ..RateLimitSettings::default()
        }
    }

    fn tenant() -> Subject {
        Subject::Tenant(TenantId::generate())
    }

    #[test]
    fn test_burst_then_refill() {
        let limiter = RateLimiter::new(settings(60));
        let subject = tenant();
        let start = Instant::now();

        for _ in 0..120 {
            assert!(limiter.check_at(subject, OperationClass::Read, start).is_allowed());
        }

        let denied = limiter.check_at(subject, OperationClass::Read, start);
        assert_eq!(denied.retry_after_secs(), Some(1));

        let later = start + Duration::from_secs(1);
        assert!(limiter.check_at(subject, OperationClass::Read, later).is_allowed());
        assert!(!limiter.check_at(subject, OperationClass::Read, later).is_allowed());
    }

    #[test]
    fn test_write_costs_two() {
        let limiter = RateLimiter::new(settings(60));
        let subject = tenant();
        let now = Instant::now();

        let admission = limiter.check_at(subject, OperationClass::Write, now);
        assert_eq!(admission, Admission::Allowed { remaining: 118 });
        let admission = limiter.check_at(subject, OperationClass::Read, now);
        assert_eq!(admission, Admission::Allowed { remaining: 117 });
        assert_eq!(limiter.bucket_count(), 1);
    }

    #[test]
    fn test_denied_write_does_not_deduct() {
        let limiter = RateLimiter::new(settings(1));
        let subject = tenant();
        let now = Instant::now();

        assert!(limiter.check_at(subject, OperationClass::Read, now).is_allowed());
        assert!(!limiter.check_at(subject, OperationClass::Write, now).is_allowed());
        assert!(limiter.check_at(subject, OperationClass::Read, now).is_allowed());
    }

    #[test]
    fn test_subjects_are_isolated() {
        let limiter = RateLimiter::new(settings(1));
        let a = tenant();
        let b = tenant();
        let now = Instant::now();

        assert!(limiter.check_at(a, OperationClass::Write, now).is_allowed());
        assert!(!limiter.check_at(a, OperationClass::Read, now).is_allowed());
        assert!(limiter.check_at(b, OperationClass::Write, now).is_allowed());
    }

    #[test]
    fn test_families_are_isolated() {
        let limiter = RateLimiter::new(RateLimitSettings {
            login_rpm: 1,
            ..RateLimitSettings::default()
        });
        let ip = Subject::Source(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let now = Instant::now();

        assert!(limiter.check_at(ip, OperationClass::Login, now).is_allowed());
        assert!(limiter.check_at(ip, OperationClass::Login, now).is_allowed());
        assert!(!limiter.check_at(ip, OperationClass::Login, now).is_allowed());
        assert!(limiter.check_at(ip, OperationClass::Signup, now).is_allowed());
        assert!(limiter.check_at(ip, OperationClass::Console, now).is_allowed());
    }

    #[test]
    fn test_require_reports_retry_hint() {
        let limiter = RateLimiter::new(settings(1));
        let subject = tenant();

        limiter.require(subject, OperationClass::Write).unwrap();
        let err = limiter.require(subject, OperationClass::Write).unwrap_err();
        match err {
            GatewayError::RateLimited { retry_after_secs } => assert!(retry_after_secs >= 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_disabled_admits_everything() {
        let limiter = RateLimiter::new(RateLimitSettings {
            enabled: false,
            tenant_rpm: 1,
            ..RateLimitSettings::default()
        });
        let subject = tenant();
        for _ in 0..100 {
            assert!(limiter.check(subject, OperationClass::Write).is_allowed());
        }
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[test]
    fn test_reset_and_cleanup() {
        let limiter = RateLimiter::new(settings(1));
        let a = tenant();
        let b = tenant();
        let start = Instant::now();

        limiter.check_at(a, OperationClass::Write, start);
        limiter.check_at(b, OperationClass::Write, start);
        assert_eq!(limiter.bucket_count(), 2);

        limiter.reset(a);
        assert_eq!(limiter.bucket_count(), 1);
        assert!(limiter.check_at(a, OperationClass::Write, start).is_allowed());

        let later = start + Duration::from_secs(600);
        assert_eq!(limiter.cleanup_at(Duration::from_secs(300), later), 2);
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[test]
    fn test_concurrent_checks_never_overspend() {
        let limiter = std::sync::Arc::new(RateLimiter::new(settings(30)));
        let subject = tenant();
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| limiter.check_at(subject, OperationClass::Read, now).is_allowed())
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 60);
    }
}
