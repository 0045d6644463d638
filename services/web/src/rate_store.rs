//! Counter storage shared by the throttling components
//!
//! Counters live only in process memory: each horizontally scaled instance
//! has its own view of rate limits and login attempts. The [`RateStore`]
//! trait is the seam where a shared backend could be substituted to close
//! that gap.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

/// Per-key request counter within a rolling window
#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u32,
    window_start: Instant,
    last_hit: Instant,
}

/// Which timestamp a window is judged stale from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// The window runs from the first request in it
    WindowStart,
    /// The window slides with the most recent request
    LastHit,
}

/// Outcome of recording a hit
#[derive(Debug, Clone, Copy)]
pub struct Hit {
    /// True when the cap was already reached and the counter was left untouched
    pub capped: bool,
    /// Count after the hit (or the standing count when capped)
    pub count: u32,
    /// Start of the current window
    pub window_start: Instant,
    /// Most recent counted hit
    pub last_hit: Instant,
}

/// Storage for per-key request counters
pub trait RateStore: Send + Sync {
    /// Record one hit for `key`, resetting the counter first when `window`
    /// has elapsed per `anchor`. When `cap` is given and the counter has
    /// already reached it inside the window, the counter is returned
    /// untouched with `capped` set. The read-modify-write is atomic per key.
    fn hit(
        &self,
        key: &str,
        window: Duration,
        anchor: Anchor,
        cap: Option<u32>,
    ) -> impl Future<Output = Hit> + Send;

    /// Drop the counter for `key`
    fn clear(&self, key: &str) -> impl Future<Output = ()> + Send;

    /// Drop counters that have not been hit for `idle_for`, returning how
    /// many were removed
    fn sweep(&self, idle_for: Duration) -> impl Future<Output = usize> + Send;
}

/// In-memory counter table
#[derive(Clone, Default)]
pub struct MemoryRateStore {
    entries: Arc<Mutex<HashMap<String, WindowCounter>>>,
}

impl MemoryRateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl RateStore for MemoryRateStore {
    async fn hit(
        &self,
        key: &str,
        window: Duration,
        anchor: Anchor,
        cap: Option<u32>,
    ) -> Hit {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let entry = entries.entry(key.to_string()).or_insert(WindowCounter {
            count: 0,
            window_start: now,
            last_hit: now,
        });

        let anchor_time = match anchor {
            Anchor::WindowStart => entry.window_start,
            Anchor::LastHit => entry.last_hit,
        };

        if now.duration_since(anchor_time) > window {
            entry.count = 0;
            entry.window_start = now;
        }

        if let Some(cap) = cap {
            if entry.count >= cap {
                return Hit {
                    capped: true,
                    count: entry.count,
                    window_start: entry.window_start,
                    last_hit: entry.last_hit,
                };
            }
        }

        entry.count += 1;
        entry.last_hit = now;

        Hit {
            capped: false,
            count: entry.count,
            window_start: entry.window_start,
            last_hit: entry.last_hit,
        }
    }

    async fn clear(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    async fn sweep(&self, idle_for: Duration) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, counter| now.duration_since(counter.last_hit) <= idle_for);
        before - entries.len()
    }
}

/// Start the periodic sweep of stale counters
///
/// Each entry pairs a store with the idle duration after which its
/// counters are expired.
pub async fn start_sweeper<S>(schedule: &str, stores: Vec<(S, Duration)>) -> Result<()>
where
    S: RateStore + Clone + 'static,
{
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let stores = stores.clone();
        Box::pin(async move {
            for (store, idle_for) in stores {
                let removed = store.sweep(idle_for).await;
                if removed > 0 {
                    info!("Swept {} stale rate counters", removed);
                }
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    info!("Started rate counter sweeper with schedule: {}", schedule);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(80);

    #[tokio::test]
    async fn test_hit_counts_per_key() {
        let store = MemoryRateStore::new();

        for expected in 1..=3 {
            let hit = store.hit("a", WINDOW, Anchor::WindowStart, None).await;
            assert!(!hit.capped);
            assert_eq!(hit.count, expected);
        }

        let other = store.hit("b", WINDOW, Anchor::WindowStart, None).await;
        assert_eq!(other.count, 1);
    }

    #[tokio::test]
    async fn test_window_start_anchor_resets_after_window() {
        let store = MemoryRateStore::new();

        store.hit("k", WINDOW, Anchor::WindowStart, None).await;
        store.hit("k", WINDOW, Anchor::WindowStart, None).await;

        tokio::time::sleep(WINDOW + Duration::from_millis(20)).await;

        let hit = store.hit("k", WINDOW, Anchor::WindowStart, None).await;
        assert_eq!(hit.count, 1, "expired window should start a fresh count");
    }

    #[tokio::test]
    async fn test_last_hit_anchor_slides_with_activity() {
        let store = MemoryRateStore::new();

        store.hit("k", WINDOW, Anchor::LastHit, None).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Still inside the window measured from the last hit.
        let hit = store.hit("k", WINDOW, Anchor::LastHit, None).await;
        assert_eq!(hit.count, 2);

        tokio::time::sleep(WINDOW + Duration::from_millis(20)).await;
        let hit = store.hit("k", WINDOW, Anchor::LastHit, None).await;
        assert_eq!(hit.count, 1);
    }

    #[tokio::test]
    async fn test_cap_leaves_counter_untouched() {
        let store = MemoryRateStore::new();

        for _ in 0..3 {
            let hit = store.hit("k", WINDOW, Anchor::LastHit, Some(3)).await;
            assert!(!hit.capped);
        }

        let before = store.hit("k", WINDOW, Anchor::LastHit, Some(3)).await;
        assert!(before.capped);
        assert_eq!(before.count, 3);

        let again = store.hit("k", WINDOW, Anchor::LastHit, Some(3)).await;
        assert_eq!(again.count, 3, "capped hits must not advance the counter");
        assert_eq!(before.last_hit, again.last_hit);
    }

    #[tokio::test]
    async fn test_clear_removes_key() {
        let store = MemoryRateStore::new();

        store.hit("k", WINDOW, Anchor::LastHit, None).await;
        store.hit("k", WINDOW, Anchor::LastHit, None).await;
        store.clear("k").await;

        let hit = store.hit("k", WINDOW, Anchor::LastHit, None).await;
        assert_eq!(hit.count, 1);
    }

    #[tokio::test]
    async fn test_sweep_drops_idle_entries() {
        let store = MemoryRateStore::new();

        store.hit("old", WINDOW, Anchor::WindowStart, None).await;
        tokio::time::sleep(WINDOW + Duration::from_millis(20)).await;
        store.hit("fresh", WINDOW, Anchor::WindowStart, None).await;

        let removed = store.sweep(WINDOW).await;
        assert_eq!(removed, 1);

        // The fresh entry keeps counting where it left off.
        let hit = store.hit("fresh", WINDOW, Anchor::WindowStart, None).await;
        assert_eq!(hit.count, 2);
    }
}
