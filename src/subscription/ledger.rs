use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

/// How long an observed join request stands in for membership.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
/// How often the background sweep removes stale requests.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// In-memory record of pending "user asked to join channel" events,
/// keyed by channel then user.
///
/// Telegram never tells the bot whether a join request was approved, so an
/// observed request plus a bounded time window stands in for membership.
/// Entries expire lazily on lookup and eagerly via a periodic sweep task
/// that `start` launches and `stop` tears down.
///
/// One instance is created in `main` and injected into the handlers; the
/// nested map is only ever touched under the internal mutex, which is never
/// held across a network call.
pub struct JoinRequestLedger {
    requests: Mutex<HashMap<i64, HashMap<u64, Instant>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
    request_timeout: Duration,
    sweep_interval: Duration,
    sweeps_done: AtomicU64,
}

impl JoinRequestLedger {
    pub fn new() -> Self {
        Self::with_config(REQUEST_TIMEOUT, SWEEP_INTERVAL)
    }

    pub fn with_config(request_timeout: Duration, sweep_interval: Duration) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            sweeper: Mutex::new(None),
            stopped: AtomicBool::new(false),
            request_timeout,
            sweep_interval,
            sweeps_done: AtomicU64::new(0),
        }
    }

    /// Launches the periodic sweep task. Calling `start` on a ledger that is
    /// already running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_some() {
            return;
        }
        self.stopped.store(false, Ordering::SeqCst);
        let ledger = Arc::clone(self);
        *sweeper = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(ledger.sweep_interval).await;
                if ledger.stopped.load(Ordering::SeqCst) {
                    break;
                }
                let removed = ledger.sweep().await;
                if removed > 0 {
                    log::debug!("sweep removed {} stale join requests", removed);
                }
            }
        }));
        log::info!("join-request sweeper started");
    }

    /// Cancels the sweep task, waits for it to unwind and clears all
    /// entries. Safe to call before `start` and more than once; after `stop`
    /// the ledger answers every query with the fail-closed result.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let task = self.sweeper.lock().await.take();
        if let Some(task) = task {
            task.abort();
            // The JoinError from an aborted task is expected control flow.
            let _ = task.await;
        }
        self.requests.lock().await.clear();
        log::info!(
            "join-request ledger stopped after {} sweeps",
            self.sweeps_done()
        );
    }

    /// Records that `user_id` asked to join `channel_id` just now. Repeated
    /// calls for the same pair refresh the expiry window.
    pub async fn record(&self, channel_id: i64, user_id: u64) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let mut requests = self.requests.lock().await;
        requests
            .entry(channel_id)
            .or_default()
            .insert(user_id, Instant::now());
        log::info!(
            "join request recorded: channel {}, user {}",
            channel_id,
            user_id
        );
    }

    /// True iff a request for the pair exists and has not timed out. An
    /// expired entry is deleted on the spot so it cannot resurrect.
    pub async fn is_pending(&self, channel_id: i64, user_id: u64) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        let mut requests = self.requests.lock().await;
        let Some(users) = requests.get_mut(&channel_id) else {
            return false;
        };
        let Some(&requested_at) = users.get(&user_id) else {
            return false;
        };
        if requested_at.elapsed() < self.request_timeout {
            return true;
        }
        users.remove(&user_id);
        if users.is_empty() {
            requests.remove(&channel_id);
        }
        false
    }

    /// Removes every expired entry and every channel left without entries.
    /// Returns the number of entries removed.
    pub async fn sweep(&self) -> usize {
        let mut requests = self.requests.lock().await;
        let before: usize = requests.values().map(HashMap::len).sum();
        for users in requests.values_mut() {
            users.retain(|_, requested_at| requested_at.elapsed() < self.request_timeout);
        }
        requests.retain(|_, users| !users.is_empty());
        let live: usize = requests.values().map(HashMap::len).sum();
        self.sweeps_done.fetch_add(1, Ordering::Relaxed);
        log::info!("join-request sweep done, {} live requests", live);
        before - live
    }

    /// Number of live (recorded, possibly expired-but-unswept) requests.
    pub async fn live_requests(&self) -> usize {
        self.requests.lock().await.values().map(HashMap::len).sum()
    }

    /// Number of channels currently holding at least one request.
    pub async fn channel_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    pub fn sweeps_done(&self) -> u64 {
        self.sweeps_done.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const TIMEOUT: Duration = Duration::from_secs(300);
    const INTERVAL: Duration = Duration::from_secs(60);

    fn ledger() -> Arc<JoinRequestLedger> {
        Arc::new(JoinRequestLedger::with_config(TIMEOUT, INTERVAL))
    }

    #[tokio::test(start_paused = true)]
    async fn record_is_immediately_pending() {
        let ledger = ledger();
        assert!(!ledger.is_pending(-100, 7).await);
        ledger.record(-100, 7).await;
        assert!(ledger.is_pending(-100, 7).await);
    }

    #[tokio::test(start_paused = true)]
    async fn request_expires_after_timeout_without_resurrection() {
        let ledger = ledger();
        ledger.record(-100, 7).await;
        advance(TIMEOUT + Duration::from_secs(1)).await;
        assert!(!ledger.is_pending(-100, 7).await);
        // Lazy expiry deleted the entry and pruned the empty channel.
        assert_eq!(ledger.live_requests().await, 0);
        assert_eq!(ledger.channel_count().await, 0);
        assert!(!ledger.is_pending(-100, 7).await);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_record_refreshes_expiry() {
        let ledger = ledger();
        ledger.record(-100, 7).await;
        advance(Duration::from_secs(200)).await;
        ledger.record(-100, 7).await;
        // Past the original deadline but within the refreshed window.
        advance(Duration::from_secs(200)).await;
        assert!(ledger.is_pending(-100, 7).await);
        advance(Duration::from_secs(101)).await;
        assert!(!ledger.is_pending(-100, 7).await);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_all_and_only_expired_entries() {
        let ledger = ledger();
        ledger.record(-100, 1).await;
        ledger.record(-100, 2).await;
        ledger.record(-200, 3).await;
        advance(Duration::from_secs(200)).await;
        ledger.record(-100, 2).await; // refreshed, must survive
        ledger.record(-300, 4).await;
        advance(Duration::from_secs(150)).await;

        // Users 1 and 3 are 350s old, users 2 and 4 are 150s old.
        let removed = ledger.sweep().await;
        assert_eq!(removed, 2);
        assert!(ledger.is_pending(-100, 2).await);
        assert!(ledger.is_pending(-300, 4).await);
        assert!(!ledger.is_pending(-100, 1).await);
        assert!(!ledger.is_pending(-200, 3).await);
        // Channel -200 lost its only entry and must be pruned.
        assert_eq!(ledger.channel_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweep_prunes_on_interval() {
        let ledger = ledger();
        ledger.start().await;
        ledger.record(-100, 7).await;
        advance(TIMEOUT + INTERVAL).await;
        tokio::task::yield_now().await;
        assert_eq!(ledger.live_requests().await, 0);
        ledger.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_spawns_a_single_sweeper() {
        let ledger = ledger();
        ledger.start().await;
        ledger.start().await;
        tokio::time::sleep(INTERVAL + Duration::from_millis(10)).await;
        assert_eq!(ledger.sweeps_done(), 1);
        ledger.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_start_is_safe() {
        let ledger = ledger();
        ledger.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_clears_entries_and_makes_operations_noops() {
        let ledger = ledger();
        ledger.start().await;
        ledger.record(-100, 7).await;
        ledger.stop().await;
        assert!(!ledger.is_pending(-100, 7).await);
        ledger.record(-100, 7).await;
        assert_eq!(ledger.live_requests().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_stop_resumes_service() {
        let ledger = ledger();
        ledger.start().await;
        ledger.stop().await;
        ledger.start().await;
        ledger.record(-100, 7).await;
        assert!(ledger.is_pending(-100, 7).await);
        ledger.stop().await;
    }
}
