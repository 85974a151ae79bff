//! Fleet registry and command fan-out
//!
//! The registry is an explicit injected service holding every live
//! session by name. Selector resolution works on a point-in-time snapshot
//! of the map; a slow session only ever delays the aggregate reply, never
//! another session's progress.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};

use futures::future::join_all;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::client::NetEvent;
use crate::commands;
use crate::config::{GlobalConfig, OptimizationMode, SessionConfig};
use crate::error::FleetError;
use crate::limiter::RateLimiter;
use crate::session::{Session, SessionServices};
use crate::tasks;

/// Selector token expanding to every registered session
pub const FLEET_WILDCARD: &str = "fleet";

/// Builds the collaborator set for a newly registered session name.
///
/// Recovery re-invokes this, so a fresh call must produce fresh protocol
/// state rather than hand back a previously used client.
pub type ServiceFactory =
    Box<dyn Fn(&str) -> (SessionServices, UnboundedReceiver<NetEvent>) + Send + Sync>;

/// The full set of concurrently managed sessions
pub struct Fleet {
    global: Arc<GlobalConfig>,
    limiter: Arc<RateLimiter>,
    factory: ServiceFactory,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    pumps: StdMutex<HashMap<String, JoinHandle<()>>>,
    recovery_tx: mpsc::UnboundedSender<String>,
}

impl Fleet {
    pub fn new(global: Arc<GlobalConfig>, factory: ServiceFactory) -> Arc<Self> {
        let limiter = Arc::new(RateLimiter::new(&global));
        let (recovery_tx, mut recovery_rx) = mpsc::unbounded_channel::<String>();

        let fleet = Arc::new(Self {
            global,
            limiter,
            factory,
            sessions: RwLock::new(HashMap::new()),
            pumps: StdMutex::new(HashMap::new()),
            recovery_tx,
        });

        let weak = Arc::downgrade(&fleet);
        tasks::spawn_detached("session recovery", async move {
            while let Some(name) = recovery_rx.recv().await {
                let Some(fleet) = weak.upgrade() else { break };
                fleet.recover(&name).await;
            }
        });

        fleet
    }

    pub fn global(&self) -> &GlobalConfig {
        &self.global
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Register a new session under `name`, failing if the name is taken.
    /// An enabled session starts connecting in the background immediately.
    pub async fn register(
        self: &Arc<Self>,
        name: &str,
        config: SessionConfig,
    ) -> Result<Arc<Session>, FleetError> {
        if name.is_empty() {
            error!("attempted to register a session with an empty name");
            return Err(FleetError::EmptyName);
        }

        let session = {
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(name) {
                return Err(FleetError::NameTaken(name.to_string()));
            }

            let (services, events) = (self.factory)(name);
            let session = Session::new(
                name.to_string(),
                config,
                Arc::clone(&self.global),
                Arc::clone(&self.limiter),
                services,
                self.recovery_tx.clone(),
            );
            sessions.insert(name.to_string(), Arc::clone(&session));
            self.spawn_event_pump(&session, events);
            session
        };

        info!("[{}] session registered", name);

        if session.config().enabled {
            let starting = Arc::clone(&session);
            tasks::spawn_detached("session start", async move {
                starting.start().await;
            });
        } else {
            info!("[{}] not starting, disabled by configuration", name);
        }

        Ok(session)
    }

    /// Remove a session explicitly; sessions are never removed implicitly
    pub async fn remove(&self, name: &str) -> Result<(), FleetError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(name)
            .ok_or_else(|| FleetError::UnknownSession(name.to_string()))?;

        if let Some(pump) = self.pumps.lock().unwrap().remove(name) {
            pump.abort();
        }

        session.shutdown().await;
        info!("[{}] session removed", name);
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Every registered session in name sort order
    pub async fn all_sorted(&self) -> Vec<Arc<Session>> {
        let sessions = self.sessions.read().await;
        let mut sorted: Vec<Arc<Session>> = sessions.values().cloned().collect();
        sorted.sort_by(|a, b| a.name().cmp(b.name()));
        sorted
    }

    /// JSON snapshot of the whole fleet, for the status surface
    pub async fn status_json(&self) -> String {
        let snapshots: Vec<_> = self
            .all_sorted()
            .await
            .iter()
            .map(|session| session.snapshot())
            .collect();
        serde_json::to_string(&snapshots).unwrap_or_else(|e| {
            error!("failed to serialize fleet status: {}", e);
            String::from("[]")
        })
    }

    /// Expand a selector into sessions.
    ///
    /// Comma-separated tokens, each either the fleet wildcard, a
    /// `first..last` range over name sort order (both endpoints must be
    /// registered), or a single name. Unknown names are silently skipped.
    pub async fn resolve_selector(&self, selector: &str) -> Vec<Arc<Session>> {
        if selector.is_empty() {
            error!("empty session selector");
            return Vec::new();
        }

        let sorted = self.all_sorted().await;

        let mut result: Vec<Arc<Session>> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut push = |session: &Arc<Session>, result: &mut Vec<Arc<Session>>| {
            if seen.insert(session.name().to_string()) {
                result.push(Arc::clone(session));
            }
        };

        for token in selector.split(',').filter(|token| !token.is_empty()) {
            if token.eq_ignore_ascii_case(FLEET_WILDCARD) {
                return sorted;
            }

            if let Some((first, last)) = token.split_once("..") {
                if !first.is_empty()
                    && !last.is_empty()
                    && sorted.iter().any(|s| s.name() == first)
                    && sorted.iter().any(|s| s.name() == last)
                {
                    let mut in_range = false;
                    for session in &sorted {
                        if session.name() == first {
                            in_range = true;
                        } else if !in_range {
                            continue;
                        }

                        push(session, &mut result);

                        if session.name() == last {
                            break;
                        }
                    }
                    continue;
                }
            }

            if let Some(session) = sorted.iter().find(|s| s.name() == token) {
                push(session, &mut result);
            }
        }

        result
    }

    /// Fan a per-session operation out over a selector and aggregate the
    /// non-empty replies. Ordinary callers get silence for an empty
    /// resolution; the fleet owner gets a short diagnostic.
    pub async fn dispatch<F, Fut>(&self, caller_id: u64, selector: &str, op: F) -> Option<String>
    where
        F: Fn(Arc<Session>) -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        let resolved = self.resolve_selector(selector).await;
        if resolved.is_empty() {
            return self
                .is_owner(caller_id)
                .then(|| format!("No session found for \"{selector}\""));
        }

        let results: Vec<Option<String>> = match self.global.optimization_mode {
            OptimizationMode::MinMemoryUsage => {
                let mut results = Vec::with_capacity(resolved.len());
                for session in resolved {
                    results.push(op(session).await);
                }
                results
            }
            OptimizationMode::MaxPerformance => join_all(resolved.into_iter().map(op)).await,
        };

        let responses: Vec<String> = results
            .into_iter()
            .flatten()
            .filter(|response| !response.is_empty())
            .collect();

        (!responses.is_empty()).then(|| responses.join("\n"))
    }

    pub fn is_owner(&self, caller_id: u64) -> bool {
        caller_id != 0 && caller_id == self.global.owner_id
    }

    fn spawn_event_pump(
        self: &Arc<Self>,
        session: &Arc<Session>,
        mut events: UnboundedReceiver<NetEvent>,
    ) {
        let fleet = Arc::downgrade(self);
        let session = Arc::clone(session);
        let name = session.name().to_string();

        let pump = tasks::spawn_detached("session event pump", async move {
            while let Some(event) = events.recv().await {
                match event {
                    NetEvent::Message { caller_id, text } => {
                        let Some(fleet) = fleet.upgrade() else { break };
                        if let Some(reply) =
                            commands::response(&fleet, &session, caller_id, &text).await
                        {
                            session.send_message(caller_id, &reply).await;
                        }
                    }
                    other => session.handle_event(other).await,
                }
            }
        });

        self.pumps.lock().unwrap().insert(name, pump);
    }

    /// Permanent-connection-failure recovery: destroy the session and
    /// register a fresh one under the same name, discarding whatever
    /// protocol state the old instance accumulated.
    async fn recover(self: &Arc<Self>, name: &str) {
        let config = match self.get(name).await {
            Some(session) => session.config().clone(),
            None => return,
        };

        if self.remove(name).await.is_err() {
            return;
        }

        match self.register(name, config).await {
            Ok(_) => info!("[{}] session recreated after connection failure", name),
            Err(e) => error!("[{}] failed to recreate session: {}", name, e),
        }
    }
}
