//! Per-session timer scheduling
//!
//! Each session owns at most one live timer per kind. Arming a kind
//! always disposes the previous instance first, so duplicate firings
//! cannot happen by construction rather than by call-site discipline.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::tasks;

/// Timer purposes a session can arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Fires when no successful connect/login happened in time
    ConnectionFailure,
    /// Periodic liveness watchdog
    Heartbeat,
    /// Clears the playing-blocked flag after the grace period
    PlayingBlocked,
    /// Periodic loot run to the first master
    SendItems,
}

/// Owner of one session's timers, keyed by purpose
#[derive(Default)]
pub struct Scheduler {
    timers: Mutex<HashMap<TimerKind, JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot timer, replacing any live timer of the same kind
    pub fn arm_oneshot<F, Fut>(&self, kind: TimerKind, delay: Duration, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tasks::spawn_detached("oneshot timer", async move {
            tokio::time::sleep(delay).await;
            task().await;
        });
        self.replace(kind, handle);
    }

    /// Arm a periodic timer, replacing any live timer of the same kind
    pub fn arm_periodic<F, Fut>(&self, kind: TimerKind, delay: Duration, period: Duration, task: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tasks::spawn_detached("periodic timer", async move {
            tokio::time::sleep(delay).await;
            loop {
                task().await;
                tokio::time::sleep(period).await;
            }
        });
        self.replace(kind, handle);
    }

    /// Dispose the live timer of `kind`, if any
    pub fn cancel(&self, kind: TimerKind) {
        if let Some(handle) = self.timers.lock().unwrap().remove(&kind) {
            handle.abort();
        }
    }

    /// Dispose every live timer
    pub fn cancel_all(&self) {
        let mut timers = self.timers.lock().unwrap();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }

    /// Whether a timer of `kind` is currently armed
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.timers
            .lock()
            .unwrap()
            .get(&kind)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn replace(&self, kind: TimerKind, handle: JoinHandle<()>) {
        if let Some(old) = self.timers.lock().unwrap().insert(kind, handle) {
            old.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_oneshot_fires_once() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&fired);
        scheduler.arm_oneshot(TimerKind::ConnectionFailure, Duration::from_secs(5), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_disposes_previous_timer() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&fired);
            scheduler.arm_oneshot(TimerKind::Heartbeat, Duration::from_secs(5), move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        tokio::time::sleep(Duration::from_secs(30)).await;
        // Only the last armed instance may fire
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&fired);
        scheduler.arm_oneshot(TimerKind::SendItems, Duration::from_secs(5), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert!(scheduler.is_armed(TimerKind::SendItems));
        scheduler.cancel(TimerKind::SendItems);
        assert!(!scheduler.is_armed(TimerKind::SendItems));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_fires_repeatedly() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&fired);
        scheduler.arm_periodic(
            TimerKind::Heartbeat,
            Duration::from_secs(1),
            Duration::from_secs(10),
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        tokio::time::sleep(Duration::from_secs(32)).await;
        assert!(fired.load(Ordering::SeqCst) >= 3);
        scheduler.cancel_all();
    }
}
