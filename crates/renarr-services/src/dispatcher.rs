//! Rate-limited dispatcher for the quota-constrained AI.
//!
//! All calls sharing a platform key are serialized through one logical
//! lane, so at most one call per platform is in flight and successive
//! dispatch starts are separated by the platform's minimum interval.
//! Quota-exceeded responses are retried here, and only here, with
//! exponential backoff capped at a per-platform maximum wait; any
//! other error is rethrown for the caller's own retry layer.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{info, warn};

use renarr_models::Platform;

use crate::error::{ServiceError, ServiceResult};

/// Static per-platform tolerances. Not a dynamic policy.
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    pub platform: Platform,
    /// Minimum spacing between the start times of two dispatches.
    pub min_interval: Duration,
    /// Quota-retry ceiling, including the first attempt.
    pub max_quota_attempts: u32,
    /// Base delay for quota backoff.
    pub quota_base_delay: Duration,
    /// Cap on any single quota wait.
    pub max_quota_wait: Duration,
}

impl PlatformProfile {
    /// Conservative profile for the heavily-throttled free tier.
    pub fn free_tier() -> Self {
        Self {
            platform: Platform::FreeTier,
            min_interval: Duration::from_secs(12),
            max_quota_attempts: 5,
            quota_base_delay: Duration::from_secs(30),
            max_quota_wait: Duration::from_secs(300),
        }
    }

    /// Permissive profile for the metered tier.
    pub fn metered() -> Self {
        Self {
            platform: Platform::Metered,
            min_interval: Duration::from_secs(1),
            max_quota_attempts: 3,
            quota_base_delay: Duration::from_secs(2),
            max_quota_wait: Duration::from_secs(30),
        }
    }

    fn quota_delay(&self, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
        if let Some(after) = retry_after_ms {
            return Duration::from_millis(after).min(self.max_quota_wait);
        }
        let exp = self
            .quota_base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        exp.min(self.max_quota_wait)
    }
}

#[derive(Default)]
struct Lane {
    last_dispatch: Option<Instant>,
}

/// Serializing gateway to quota-constrained external calls.
pub struct RateLimitedDispatcher {
    lanes: HashMap<Platform, (PlatformProfile, Arc<Mutex<Lane>>)>,
}

impl RateLimitedDispatcher {
    /// Dispatcher with the two standard platform profiles.
    pub fn new() -> Self {
        Self::with_profiles(vec![PlatformProfile::free_tier(), PlatformProfile::metered()])
    }

    /// Dispatcher with custom profiles (tests use tight intervals).
    pub fn with_profiles(profiles: Vec<PlatformProfile>) -> Self {
        let lanes = profiles
            .into_iter()
            .map(|p| (p.platform, (p, Arc::new(Mutex::new(Lane::default())))))
            .collect();
        Self { lanes }
    }

    /// Execute `op` on the platform's lane.
    ///
    /// Holds the lane for the whole call (including quota waits), which
    /// is what serializes concurrent callers.
    pub async fn execute<F, Fut, T>(&self, platform: Platform, op: F) -> ServiceResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let (profile, lane) = self
            .lanes
            .get(&platform)
            .ok_or_else(|| ServiceError::invalid_input(format!("no profile for {platform}")))?;

        let mut lane = lane.lock().await;

        let mut attempt = 1u32;
        loop {
            if let Some(last) = lane.last_dispatch {
                let since = last.elapsed();
                if since < profile.min_interval {
                    tokio::time::sleep(profile.min_interval - since).await;
                }
            }
            lane.last_dispatch = Some(Instant::now());

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_quota_exceeded() => {
                    if attempt >= profile.max_quota_attempts {
                        warn!(
                            platform = %platform,
                            attempts = attempt,
                            "Quota retries exhausted"
                        );
                        return Err(e);
                    }
                    let delay = profile.quota_delay(attempt, e.retry_after_ms());
                    info!(
                        platform = %platform,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Quota exceeded, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                // Everything else belongs to the caller's retry layer.
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RateLimitedDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_profile(platform: Platform, min_interval: Duration) -> PlatformProfile {
        PlatformProfile {
            platform,
            min_interval,
            max_quota_attempts: 3,
            quota_base_delay: Duration::from_millis(5),
            max_quota_wait: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_minimum_spacing_between_dispatch_starts() {
        let dispatcher = RateLimitedDispatcher::with_profiles(vec![fast_profile(
            Platform::FreeTier,
            Duration::from_millis(50),
        )]);

        let starts: Arc<std::sync::Mutex<Vec<Instant>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));

        for _ in 0..3 {
            let starts = Arc::clone(&starts);
            dispatcher
                .execute(Platform::FreeTier, || {
                    let starts = Arc::clone(&starts);
                    async move {
                        starts.lock().unwrap().push(Instant::now());
                        Ok::<_, ServiceError>(())
                    }
                })
                .await
                .unwrap();
        }

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 3);
        for pair in starts.windows(2) {
            // Instantaneous calls must still be spaced by the minimum
            // interval, measured start to start.
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(50));
        }
    }

    #[tokio::test]
    async fn test_quota_retry_honors_retry_after() {
        let dispatcher = RateLimitedDispatcher::with_profiles(vec![fast_profile(
            Platform::Metered,
            Duration::from_millis(1),
        )]);

        let calls = AtomicU32::new(0);
        let result = dispatcher
            .execute(Platform::Metered, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ServiceError::quota_exceeded("rpm", Some(10)))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_quota_attempt_ceiling() {
        let dispatcher = RateLimitedDispatcher::with_profiles(vec![fast_profile(
            Platform::Metered,
            Duration::from_millis(1),
        )]);

        let calls = AtomicU32::new(0);
        let result: ServiceResult<()> = dispatcher
            .execute(Platform::Metered, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ServiceError::quota_exceeded("rpm", None)) }
            })
            .await;

        assert!(result.unwrap_err().is_quota_exceeded());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_quota_errors_rethrow_immediately() {
        let dispatcher = RateLimitedDispatcher::with_profiles(vec![fast_profile(
            Platform::Metered,
            Duration::from_millis(1),
        )]);

        let calls = AtomicU32::new(0);
        let result: ServiceResult<()> = dispatcher
            .execute(Platform::Metered, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ServiceError::network("connection reset")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_platform_is_rejected() {
        let dispatcher = RateLimitedDispatcher::with_profiles(vec![fast_profile(
            Platform::Metered,
            Duration::from_millis(1),
        )]);

        let result: ServiceResult<()> = dispatcher
            .execute(Platform::FreeTier, || async { Ok(()) })
            .await;
        assert!(result.is_err());
    }
}
