//! Fleet-wide rate limiting for sensitive request categories
//!
//! The throttled resource is the remote service's abuse heuristics, which
//! see the whole process as one actor. Limiter state is therefore shared
//! across every session and injected at construction, never per-session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::config::GlobalConfig;

/// Sensitive request category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterKind {
    /// Connection/login attempts
    Login,
    /// Gift-like free actions (accepting gifts, redeeming free licenses)
    Gifts,
}

struct Slot {
    semaphore: Semaphore,
    delay: Duration,
}

/// One counting-semaphore-backed throttle per category.
///
/// `acquire` guarantees a minimum spacing between consecutive requests of
/// the same category across the whole fleet: the permit is taken before
/// the protected call and handed back by a background task only after the
/// configured delay has elapsed.
pub struct RateLimiter {
    login: Slot,
    gifts: Slot,
}

impl RateLimiter {
    pub fn new(config: &GlobalConfig) -> Self {
        Self {
            login: Slot {
                semaphore: Semaphore::new(1),
                delay: config.login_limiter_delay(),
            },
            gifts: Slot {
                semaphore: Semaphore::new(1),
                delay: config.gifts_limiter_delay(),
            },
        }
    }

    /// Wait for a slot in `kind`. A zero delay disables the category
    /// entirely and returns immediately.
    pub async fn acquire(self: &Arc<Self>, kind: LimiterKind) {
        let slot = self.slot(kind);
        if slot.delay.is_zero() {
            return;
        }

        // Semaphore::acquire only fails when the semaphore is closed,
        // which never happens here
        let permit = slot
            .semaphore
            .acquire()
            .await
            .expect("limiter semaphore closed");
        permit.forget();

        debug!(?kind, delay = ?slot.delay, "rate limiter slot taken");

        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let slot = limiter.slot(kind);
            tokio::time::sleep(slot.delay).await;
            slot.semaphore.add_permits(1);
        });
    }

    fn slot(&self, kind: LimiterKind) -> &Slot {
        match kind {
            LimiterKind::Login => &self.login,
            LimiterKind::Gifts => &self.gifts,
        }
    }
}
