//! Clock-skew correction against the remote service.
//!
//! Codes and signatures are only accepted in a narrow window around the
//! service's own clock, so the engine keeps a process-wide offset
//! (`server_time - local_time`) and applies it to every timestamp it emits.
//! The offset is re-derived per process start and refreshed when stale;
//! a failed resync degrades to the previous (or zero) offset instead of
//! blocking code generation on network availability.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::error::Error;
use crate::ports::TimeEndpoint;

#[derive(Debug, Clone, Copy)]
struct OffsetSample {
    offset_secs: i64,
    synced_at: Instant,
}

pub struct ClockSync<T: TimeEndpoint> {
    endpoint: Arc<T>,
    max_age: Duration,
    cached: RwLock<Option<OffsetSample>>,
    /// Collapses concurrent resync attempts into one round-trip.
    resync_gate: tokio::sync::Mutex<()>,
}

impl<T: TimeEndpoint> ClockSync<T> {
    pub fn new(endpoint: Arc<T>, max_age: Duration) -> Self {
        Self {
            endpoint,
            max_age,
            cached: RwLock::new(None),
            resync_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Local wall-clock time, seconds since the Unix epoch.
    pub fn local_time() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Local time corrected by the cached offset, resyncing first if stale.
    pub async fn corrected_time(&self) -> u64 {
        let offset = self.offset().await;
        (Self::local_time() as i64 + offset).max(0) as u64
    }

    /// The current offset in seconds. Resyncs lazily when the cached sample
    /// is older than the staleness window; on failure the previous (or zero)
    /// offset is returned and a warning logged, never an error.
    pub async fn offset(&self) -> i64 {
        if let Some(offset) = self.cached_offset(true) {
            return offset;
        }

        let _gate = self.resync_gate.lock().await;
        // Another caller may have resynced while this one waited.
        if let Some(offset) = self.cached_offset(true) {
            return offset;
        }

        match self.sample().await {
            Ok(offset) => offset,
            Err(e) => {
                warn!(error = %e, "clock resync failed, using last known offset");
                self.cached_offset(false).unwrap_or(0)
            }
        }
    }

    /// Force one round-trip to the time endpoint, replacing the cached
    /// offset. Failures are returned to the caller (unlike `offset`, which
    /// degrades silently).
    pub async fn resync(&self) -> Result<i64, Error> {
        let _gate = self.resync_gate.lock().await;
        self.sample().await
    }

    async fn sample(&self) -> Result<i64, Error> {
        let server_time = self
            .endpoint
            .server_time()
            .await
            .map_err(|e| Error::ClockSync(e.to_string()))?;
        // Sampled at response receipt; half the round-trip of slack is fine
        // for a 30-second code window.
        let offset_secs = server_time as i64 - Self::local_time() as i64;

        debug!(offset_secs, "clock offset updated");
        *self.cached.write().expect("clock offset lock poisoned") = Some(OffsetSample {
            offset_secs,
            synced_at: Instant::now(),
        });
        Ok(offset_secs)
    }

    fn cached_offset(&self, require_fresh: bool) -> Option<i64> {
        let sample = (*self.cached.read().expect("clock offset lock poisoned"))?;
        if require_fresh && sample.synced_at.elapsed() > self.max_age {
            return None;
        }
        Some(sample.offset_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Endpoint whose responses are scripted per call.
    struct ScriptedEndpoint {
        responses: Mutex<VecDeque<Result<i64, ()>>>,
        calls: AtomicUsize,
    }

    impl ScriptedEndpoint {
        fn new(responses: Vec<Result<i64, ()>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TimeEndpoint for ScriptedEndpoint {
        async fn server_time(&self) -> Result<u64, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.lock().unwrap().pop_front() {
                // Offsets are scripted relative to the local clock so the
                // computed offset is independent of when the test runs.
                Some(Ok(delta)) => {
                    Ok((ClockSync::<ScriptedEndpoint>::local_time() as i64 + delta) as u64)
                }
                Some(Err(())) => Err(Error::RemoteUnavailable("scripted failure".to_string())),
                None => panic!("endpoint called more often than scripted"),
            }
        }
    }

    fn assert_close(offset: i64, expected: i64) {
        assert!(
            (offset - expected).abs() <= 2,
            "offset {} not close to {}",
            offset,
            expected
        );
    }

    #[tokio::test]
    async fn test_offset_computed_from_server_time() {
        let endpoint = ScriptedEndpoint::new(vec![Ok(120)]);
        let clock = ClockSync::new(endpoint.clone(), Duration::from_secs(300));

        assert_close(clock.offset().await, 120);
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_fresh_offset_is_cached() {
        let endpoint = ScriptedEndpoint::new(vec![Ok(120)]);
        let clock = ClockSync::new(endpoint.clone(), Duration::from_secs(300));

        clock.offset().await;
        clock.offset().await;
        clock.offset().await;
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_degrades_to_zero() {
        let endpoint = ScriptedEndpoint::new(vec![Err(())]);
        let clock = ClockSync::new(endpoint.clone(), Duration::from_secs(300));

        // No prior sample: falls back to zero, does not error.
        assert_eq!(clock.offset().await, 0);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_offset() {
        let endpoint = ScriptedEndpoint::new(vec![Ok(120), Err(())]);
        // Zero max age forces a resync attempt on every call.
        let clock = ClockSync::new(endpoint.clone(), Duration::ZERO);

        assert_close(clock.offset().await, 120);
        assert_close(clock.offset().await, 120);
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test]
    async fn test_corrected_time_applies_offset() {
        let endpoint = ScriptedEndpoint::new(vec![Ok(600)]);
        let clock = ClockSync::new(endpoint.clone(), Duration::from_secs(300));

        let local = ClockSync::<ScriptedEndpoint>::local_time();
        let corrected = clock.corrected_time().await;
        assert!(corrected >= local + 598 && corrected <= local + 602);
    }

    #[tokio::test]
    async fn test_resync_surfaces_failure() {
        let endpoint = ScriptedEndpoint::new(vec![Err(())]);
        let clock = ClockSync::new(endpoint.clone(), Duration::from_secs(300));

        assert!(matches!(clock.resync().await, Err(Error::ClockSync(_))));
    }
}
