use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

const LOG_TARGET: &str = "   fetcher";

/// Limits concurrency, spaces out request starts, and supports temporary pausing of work dispatch.
///
/// Wrap in an `Arc` via [`Throttler::new`], then call [`Throttler::acquire`] before
/// each outbound request. At most `max_concurrent` requests will be in flight at once,
/// and consecutive request starts are at least `min_interval` apart.
/// Any task can call [`Throttler::pause_for`] to temporarily halt new dispatch
/// (e.g. after a rate-limit response).
///
/// When multiple tasks call [`Throttler::pause_for`] concurrently, the longest
/// pause wins. Shorter pauses are ignored if a longer one is already active.
#[derive(Debug)]
pub struct Throttler {
    semaphore: Arc<Semaphore>,
    min_interval: Duration,
    next_start: Mutex<Option<Instant>>,
    paused: AtomicBool,
    resume: Notify,
    /// Tracks when the current pause should expire.
    resume_at: Mutex<Option<Instant>>,
}

impl Throttler {
    /// Minimum extension required for a new pause to override an active one.
    /// Near-simultaneous callers that all saw the same rate-limit reset time
    /// would otherwise each "win" the pause due to clock drift between calls.
    const MIN_PAUSE_EXTENSION: Duration = Duration::from_secs(1);

    /// Create a new throttler.
    ///
    /// A `max_concurrent` of zero is treated as one so that work can always progress.
    #[must_use]
    pub fn new(max_concurrent: usize, min_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            min_interval,
            next_start: Mutex::new(None),
            paused: AtomicBool::new(false),
            resume: Notify::new(),
            resume_at: Mutex::new(None),
        })
    }

    /// A throttler that only bounds concurrency.
    #[must_use]
    pub fn unspaced(max_concurrent: usize) -> Arc<Self> {
        Self::new(max_concurrent, Duration::ZERO)
    }

    /// Wait until unpaused, acquire a concurrency slot, then wait for this request's start slot.
    ///
    /// The returned permit must be held for the duration of the request. When it
    /// is dropped, the slot becomes available for another task.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        loop {
            // Register interest before checking the flag so a resume between the
            // check and the await is not lost.
            let notified = self.resume.notified();
            if self.paused.load(Ordering::Acquire) {
                notified.await;
                continue;
            }

            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .expect("semaphore is never closed");

            // A pause may have started while we waited for the slot
            if self.paused.load(Ordering::Acquire) {
                drop(permit);
                continue;
            }

            if let Some(start) = self.reserve_start() {
                tokio::time::sleep_until(start).await;
            }

            return permit;
        }
    }

    /// Claim the next start slot, returning the instant to wait for when it lies in the future.
    fn reserve_start(&self) -> Option<Instant> {
        if self.min_interval.is_zero() {
            return None;
        }

        let now = Instant::now();
        let mut next = self.next_start.lock().unwrap_or_else(PoisonError::into_inner);
        let start = next.map_or(now, |n| n.max(now));
        *next = Some(start + self.min_interval);
        (start > now).then_some(start)
    }

    /// Returns whether the throttler is currently paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Pause dispatching for `duration`, then automatically resume.
    ///
    /// Requests already in flight are not interrupted. Tasks waiting in [`acquire`](Self::acquire)
    /// remain parked until the duration elapses. If a pause with a similar
    /// or longer duration is already active, this call is a no-op and returns `false`.
    /// Returns `true` only when a new pause is actually established.
    pub fn pause_for(self: &Arc<Self>, duration: Duration) -> bool {
        let new_resume_at = Instant::now() + duration;

        {
            let mut guard = self.resume_at.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.is_some_and(|existing| existing + Self::MIN_PAUSE_EXTENSION >= new_resume_at) {
                return false;
            }
            *guard = Some(new_resume_at);
        }

        log::warn!(target: LOG_TARGET, "Pausing outbound requests for {:.1}s", duration.as_secs_f64());

        self.paused.store(true, Ordering::Release);
        let this = Arc::clone(self);
        drop(tokio::spawn(async move {
            tokio::time::sleep_until(new_resume_at).await;

            let should_resume = {
                let mut guard = this.resume_at.lock().unwrap_or_else(PoisonError::into_inner);
                if guard.is_some_and(|t| Instant::now() >= t) {
                    *guard = None;
                    true
                } else {
                    false // a longer pause was scheduled after us
                }
            };

            if should_resume {
                log::info!(target: LOG_TARGET, "Resuming outbound requests");
                this.paused.store(false, Ordering::Release);
                this.resume.notify_waiters();
            }
        }));

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn limits_concurrency() {
        let throttler = Throttler::unspaced(2);
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let throttler = Arc::clone(&throttler);
                let active = Arc::clone(&active);
                let max_seen = Arc::clone(&max_seen);
                tokio::spawn(async move {
                    let _permit = throttler.acquire().await;
                    let current = active.fetch_add(1, Ordering::SeqCst) + 1;
                    _ = max_seen.fetch_max(current, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    _ = active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        _ = futures_util::future::join_all(tasks).await;

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
        assert!(max_seen.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn zero_concurrency_still_progresses() {
        let throttler = Throttler::unspaced(0);
        let _permit = throttler.acquire().await;
    }

    #[tokio::test]
    async fn pause_blocks_new_work() {
        let throttler = Throttler::unspaced(5);

        assert!(throttler.pause_for(Duration::from_millis(200)));
        assert!(throttler.is_paused());

        let start = Instant::now();
        let _permit = throttler.acquire().await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(150));
        assert!(!throttler.is_paused());
    }

    #[tokio::test]
    async fn shorter_pause_does_not_override_longer() {
        let throttler = Throttler::unspaced(1);

        assert!(throttler.pause_for(Duration::from_secs(5)));
        assert!(!throttler.pause_for(Duration::from_millis(10)));
        assert!(throttler.is_paused());
    }

    #[tokio::test]
    async fn spaces_out_request_starts() {
        let throttler = Throttler::new(10, Duration::from_millis(50));

        let start = Instant::now();
        for _ in 0..4 {
            drop(throttler.acquire().await);
        }

        // First start is immediate, the remaining three wait one interval each
        assert!(start.elapsed() >= Duration::from_millis(140));
    }
}
