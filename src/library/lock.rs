use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-episode async mutexes keyed by episode prefix.
///
/// Version allocation scans then writes; holding the episode's lock across
/// both steps serializes uploads to one episode inside this process. Entries
/// are dropped from the map once no task holds or waits on them, so the map
/// only ever contains episodes with an upload in flight.
#[derive(Clone, Default)]
pub struct EpisodeLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl EpisodeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the episode under `prefix`.
    pub async fn acquire(&self, prefix: &str) -> EpisodeGuard {
        let mutex = self
            .locks
            .entry(prefix.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        EpisodeGuard {
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
            prefix: prefix.to_string(),
        }
    }

    /// Number of episodes with a holder or waiter.
    pub fn active(&self) -> usize {
        self.locks.len()
    }
}

/// Held while an upload allocates and writes a version.
pub struct EpisodeGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    prefix: String,
}

impl Drop for EpisodeGuard {
    fn drop(&mut self) {
        // Release first so the map holds the only remaining reference when
        // nobody else is waiting.
        self.guard.take();
        self.locks
            .remove_if(&self.prefix, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
