use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::db::TokenStore;

/// Periodically deletes expired verification tokens.
///
/// Redemption already rejects expired tokens; this only keeps the table small.
pub fn spawn_expiry_sweeper(tokens: TokenStore, every: Duration) -> JoinHandle<()> {
    spawn_periodic(every, move || {
        let tokens = tokens.clone();
        async move { tokens.purge_expired().await }
    })
}

/// Runs `sweep` on every tick, starting immediately. Failures are logged and
/// the next tick runs as usual.
fn spawn_periodic<F, Fut>(every: Duration, mut sweep: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<u64, sqlx::Error>> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match sweep().await {
                Ok(0) => tracing::debug!("No expired verification tokens"),
                Ok(purged) => tracing::info!(purged, "Purged expired verification tokens"),
                Err(e) => tracing::warn!("Expiry sweep failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::codec::test_codec;
    use crate::db::{init_db, UserRepository};
    use std::future::Ready;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    const EVERY: Duration = Duration::from_secs(60);

    fn counting(
        fail: bool,
    ) -> (
        Arc<AtomicU64>,
        impl FnMut() -> Ready<Result<u64, sqlx::Error>> + Send + 'static,
    ) {
        let runs = Arc::new(AtomicU64::new(0));
        let counter = runs.clone();
        let sweep = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(if fail {
                Err(sqlx::Error::PoolTimedOut)
            } else {
                Ok(n)
            })
        };
        (runs, sweep)
    }

    /// Lets the spawned task observe any timers that have fired.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_runs_once_per_interval() {
        let (runs, sweep) = counting(false);
        let handle = spawn_periodic(EVERY, sweep);

        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::advance(EVERY - Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        tokio::time::advance(EVERY * 3).await;
        settle().await;
        // Missed ticks are delayed, not replayed in a burst
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_keeps_running_after_failure() {
        let (runs, sweep) = counting(true);
        let handle = spawn_periodic(EVERY, sweep);

        settle().await;
        tokio::time::advance(EVERY).await;
        settle().await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweeper_purges_expired_tokens() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        let users = UserRepository::new(pool.clone());
        let tokens = TokenStore::new(pool, test_codec());

        let (stale, _) = users.find_or_create("stale@example.com").await.unwrap();
        let (fresh, _) = users.find_or_create("fresh@example.com").await.unwrap();
        tokens.issue_for(stale.id, chrono::Duration::zero()).await.unwrap();
        tokens.issue_for(fresh.id, chrono::Duration::hours(1)).await.unwrap();

        // First tick fires immediately; the hour-long interval never ticks again here
        let handle = spawn_expiry_sweeper(tokens.clone(), Duration::from_secs(3600));
        tokio::time::timeout(Duration::from_secs(10), async {
            while tokens.len().await.unwrap() != 1 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("sweep did not run");
        handle.abort();

        assert!(tokens.find_by_owner(fresh.id).await.unwrap().is_some());
        assert!(tokens.find_by_owner(stale.id).await.unwrap().is_none());
    }
}
