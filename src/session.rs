//! Session lifecycle state machine
//!
//! One session is one authenticated identity on the network. It owns its
//! connection/login lifecycle, a heartbeat watchdog, a connection-failure
//! escalation timer, and the per-account trade and confirmation work.
//! Every wait in here is checked against `keep_running` rather than
//! cancelled from outside: stopping a session flips the flag and closes
//! the connection, and in-flight work exits on its next check.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::client::{
    ConfirmationStore, Farmer, InputKind, InputSource, LogOnDetails, NetEvent, NetworkClient,
    WebSession,
};
use crate::config::{GlobalConfig, SessionConfig};
use crate::limiter::{LimiterKind, RateLimiter};
use crate::reconciler::{self, ReconcileFilter};
use crate::scheduler::{Scheduler, TimerKind};
use crate::tasks;
use crate::trading::Trading;
use crate::types::{ConfirmationKind, ItemKind, LoginResult, Permission, SessionSnapshot};

/// Consecutive two-factor mismatches treated as a corrupted shared secret
const MAX_TWO_FACTOR_FAILURES: u8 = 3;

/// Sentinel marking a heartbeat escalation already in progress
const HEARTBEAT_ESCALATED: u8 = u8::MAX;

/// Grace period between submitting a trade offer and querying the
/// authenticator for its confirmation
const TRADE_CONFIRMATION_GRACE: Duration = Duration::from_secs(3);

/// Item kinds included in a loot run
const LOOTABLE_KINDS: [ItemKind; 4] = [
    ItemKind::BoosterPack,
    ItemKind::FoilTradingCard,
    ItemKind::TradingCard,
    ItemKind::Gems,
];

/// Connection/login lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    /// Transport up, not yet authenticated
    Connected,
    LoggedOn,
    Disconnected,
    /// Operator-initiated stop; only an explicit start leaves this state
    Stopped,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::LoggedOn => "logged_on",
            SessionState::Disconnected => "disconnected",
            SessionState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Collaborators injected into every session at construction
pub struct SessionServices {
    pub net: Arc<dyn NetworkClient>,
    pub web: Arc<dyn WebSession>,
    pub store: Arc<dyn ConfirmationStore>,
    pub input: Arc<dyn InputSource>,
    pub farmer: Arc<dyn Farmer>,
}

/// One authenticated identity managed by the fleet
pub struct Session {
    // NOTE: see manual `Debug` impl below; trait-object fields prevent a derive.
    name: String,
    config: SessionConfig,
    global: Arc<GlobalConfig>,
    limiter: Arc<RateLimiter>,
    net: Arc<dyn NetworkClient>,
    web: Arc<dyn WebSession>,
    store: Arc<dyn ConfirmationStore>,
    input: Arc<dyn InputSource>,
    farmer: Arc<dyn Farmer>,
    scheduler: Scheduler,
    trading: Trading,

    state: StdMutex<SessionState>,
    keep_running: AtomicBool,
    playing_blocked: AtomicBool,
    first_trade_sent: AtomicBool,
    heartbeat_failures: AtomicU8,
    two_factor_failures: AtomicU8,
    last_login_result: StdMutex<LoginResult>,

    /// Cached long-lived credential, preferred over the password
    login_key: StdMutex<Option<String>>,
    cached_login: StdMutex<Option<String>>,
    cached_password: StdMutex<Option<String>>,
    guard_code: StdMutex<Option<String>>,
    two_factor_code: StdMutex<Option<String>>,
    handled_gifts: StdMutex<HashSet<u64>>,

    /// Serializes loot and operator-driven confirmation work
    ops_lock: Mutex<()>,

    /// Tells the fleet to tear this session down and register a fresh one
    recovery_tx: UnboundedSender<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        name: String,
        config: SessionConfig,
        global: Arc<GlobalConfig>,
        limiter: Arc<RateLimiter>,
        services: SessionServices,
        recovery_tx: UnboundedSender<String>,
    ) -> Arc<Self> {
        let trading = Trading::new(
            Arc::clone(&services.web),
            Arc::clone(&services.store),
            config.clone(),
            global.optimization_mode,
        );

        Arc::new(Self {
            name,
            config,
            global,
            limiter,
            net: services.net,
            web: services.web,
            store: services.store,
            input: services.input,
            farmer: services.farmer,
            scheduler: Scheduler::new(),
            trading,
            state: StdMutex::new(SessionState::Idle),
            keep_running: AtomicBool::new(false),
            playing_blocked: AtomicBool::new(false),
            first_trade_sent: AtomicBool::new(false),
            heartbeat_failures: AtomicU8::new(0),
            two_factor_failures: AtomicU8::new(0),
            last_login_result: StdMutex::new(LoginResult::Invalid),
            login_key: StdMutex::new(None),
            cached_login: StdMutex::new(None),
            cached_password: StdMutex::new(None),
            guard_code: StdMutex::new(None),
            two_factor_code: StdMutex::new(None),
            handled_gifts: StdMutex::new(HashSet::new()),
            ops_lock: Mutex::new(()),
            recovery_tx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    pub fn is_running(&self) -> bool {
        self.keep_running.load(Ordering::SeqCst)
    }

    pub fn is_logged_on(&self) -> bool {
        self.state() == SessionState::LoggedOn
    }

    pub fn is_playing_blocked(&self) -> bool {
        self.playing_blocked.load(Ordering::SeqCst)
    }

    /// Permission rank of `caller_id` against this session's account
    pub fn permission_for(&self, caller_id: u64) -> Permission {
        if caller_id == 0 {
            error!("[{}] permission check for zero caller id", self.name);
            return Permission::None;
        }

        if caller_id == self.global.owner_id {
            return Permission::Owner;
        }

        self.config.permission_for(caller_id)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            name: self.name.clone(),
            state: self.state().to_string(),
            keep_running: self.is_running(),
            playing_blocked: self.is_playing_blocked(),
            captured_at: Utc::now(),
        }
    }

    /// Start the session: flip `keep_running`, arm periodic work, connect
    pub async fn start(self: &Arc<Self>) {
        if !self.keep_running.swap(true, Ordering::SeqCst) {
            info!("[{}] starting", self.name);
        }

        self.arm_heartbeat();
        self.arm_send_items();

        if self.config.paused {
            self.farmer.pause(true).await;
        }

        self.connect(false).await;
    }

    /// Operator-intended stop; transient disconnect handling never fires this
    pub async fn stop(&self) {
        if !self.keep_running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("[{}] stopping", self.name);
        *self.state.lock().unwrap() = SessionState::Stopped;

        if self.net.is_connected() {
            self.scheduler.cancel(TimerKind::ConnectionFailure);
            self.net.disconnect().await;
        }
    }

    /// Tear down timers on removal from the fleet
    pub(crate) async fn shutdown(&self) {
        self.stop().await;
        self.scheduler.cancel_all();
    }

    /// Connect to the network, guarded by `keep_running` unless forced
    pub async fn connect(self: &Arc<Self>, force: bool) {
        if !force && (!self.is_running() || self.net.is_connected()) {
            return;
        }

        self.limiter.acquire(LimiterKind::Login).await;

        // Re-check: the fleet may have stopped us while we waited for a slot
        if !force && (!self.is_running() || self.net.is_connected()) {
            return;
        }

        info!("[{}] connecting", self.name);
        *self.state.lock().unwrap() = SessionState::Connecting;
        self.arm_connection_failure_timer();

        if let Err(e) = self.net.connect().await {
            // The failure timer will escalate if no Connected event follows
            warn!("[{}] connect attempt failed: {}", self.name, e);
        }
    }

    /// Dispatch one network event. The fleet's event pump calls this for
    /// everything except chat messages, which go to the command surface.
    pub async fn handle_event(self: &Arc<Self>, event: NetEvent) {
        match event {
            NetEvent::Connected => self.on_connected().await,
            NetEvent::Disconnected { user_initiated } => {
                self.on_disconnected(user_initiated).await
            }
            NetEvent::LoggedOn { result, extended } => self.on_logged_on(result, extended).await,
            NetEvent::LoginKey(key) => self.on_login_key(key),
            NetEvent::PlayingSession { blocked } => self.on_playing_session(blocked).await,
            NetEvent::Gifts { gift_ids } => self.on_gifts(gift_ids).await,
            NetEvent::Message { .. } => {
                debug!("[{}] message event outside the command pump", self.name);
            }
        }
    }

    async fn on_connected(self: &Arc<Self>) {
        self.heartbeat_failures.store(0, Ordering::SeqCst);
        self.scheduler.cancel(TimerKind::ConnectionFailure);
        *self.state.lock().unwrap() = SessionState::Connected;

        info!("[{}] connected", self.name);

        if !self.is_running() {
            info!("[{}] disconnecting, stop was requested meanwhile", self.name);
            self.net.disconnect().await;
            return;
        }

        let login_key = self.login_key.lock().unwrap().clone();

        let Some(details) = self.build_logon_details(login_key).await else {
            // Required input unavailable; do not retry indefinitely
            self.stop().await;
            return;
        };

        info!("[{}] logging in", self.name);
        self.arm_connection_failure_timer();
        self.net.log_on(details).await;
    }

    /// Assemble credentials in priority order: login key, then password.
    /// Returns `None` when required interactive input is unavailable.
    async fn build_logon_details(&self, login_key: Option<String>) -> Option<LogOnDetails> {
        let username = match self.resolve_credential(
            &self.cached_login,
            self.config.login.clone(),
            InputKind::Login,
        ).await {
            Some(username) => username,
            None => return None,
        };

        let password = if login_key.is_none() {
            match self.resolve_credential(
                &self.cached_password,
                self.config.password.clone(),
                InputKind::Password,
            ).await {
                Some(password) => Some(password),
                None => return None,
            }
        } else {
            None
        };

        let mut two_factor_code = self.two_factor_code.lock().unwrap().take();
        if two_factor_code.is_none() && self.store.has_authenticator() {
            // The authenticator can supply the token even when the service
            // would not strictly require it
            two_factor_code = self.store.generate_token().await;
        }

        Some(LogOnDetails {
            username,
            password,
            login_key,
            guard_code: self.guard_code.lock().unwrap().take(),
            two_factor_code,
        })
    }

    async fn resolve_credential(
        &self,
        cache: &StdMutex<Option<String>>,
        configured: Option<String>,
        kind: InputKind,
    ) -> Option<String> {
        if let Some(configured) = configured {
            return Some(configured);
        }
        if let Some(cached) = cache.lock().unwrap().clone() {
            return Some(cached);
        }

        let value = self.input.request_input(kind, &self.name).await?;
        *cache.lock().unwrap() = Some(value.clone());
        Some(value)
    }

    async fn on_logged_on(self: &Arc<Self>, result: LoginResult, extended: u16) {
        // Keep the result around for on_disconnected's classification
        *self.last_login_result.lock().unwrap() = result;

        self.heartbeat_failures.store(0, Ordering::SeqCst);
        self.scheduler.cancel(TimerKind::ConnectionFailure);

        match result {
            LoginResult::Ok => self.on_login_success().await,
            LoginResult::NeedsGuardCode => {
                match self.input.request_input(InputKind::GuardCode, &self.name).await {
                    Some(code) => *self.guard_code.lock().unwrap() = Some(code),
                    None => self.stop().await,
                }
            }
            LoginResult::NeedsTwoFactor => {
                if self.store.has_authenticator() {
                    // Token generation happens on the next connect
                    return;
                }
                match self
                    .input
                    .request_input(InputKind::TwoFactorCode, &self.name)
                    .await
                {
                    Some(code) => *self.two_factor_code.lock().unwrap() = Some(code),
                    None => self.stop().await,
                }
            }
            LoginResult::TwoFactorMismatch => {
                warn!("[{}] unable to log in: {} ({})", self.name, result, extended);
                if self.store.has_authenticator() {
                    let failures = self.two_factor_failures.fetch_add(1, Ordering::SeqCst) + 1;
                    if failures >= MAX_TWO_FACTOR_FAILURES {
                        self.two_factor_failures.store(0, Ordering::SeqCst);
                        error!(
                            "[{}] {} consecutive two-factor mismatches, assuming corrupted authenticator secret",
                            self.name, MAX_TWO_FACTOR_FAILURES
                        );
                        self.stop().await;
                    }
                }
            }
            LoginResult::InvalidPassword
            | LoginResult::RateLimited
            | LoginResult::NoConnection
            | LoginResult::Timeout
            | LoginResult::ServiceUnavailable
            | LoginResult::TryAnotherEndpoint => {
                // Transient: the disconnect that follows schedules the retry
                warn!("[{}] unable to log in: {} ({})", self.name, result, extended);
            }
            LoginResult::AccountDisabled => {
                warn!("[{}] unable to log in: {} ({})", self.name, result, extended);
                self.stop().await;
            }
            LoginResult::Invalid | LoginResult::Other(_) => {
                // Unknown results are never silently retried forever
                error!("[{}] unable to log in: {} ({})", self.name, result, extended);
                self.stop().await;
            }
        }
    }

    async fn on_login_success(self: &Arc<Self>) {
        info!("[{}] logged on", self.name);

        self.two_factor_failures.store(0, Ordering::SeqCst);
        *self.state.lock().unwrap() = SessionState::LoggedOn;

        if self.is_playing_blocked() {
            // The account was occupied during our disconnect; give the
            // other client session a grace period before declaring it gone
            let session = Arc::downgrade(self);
            self.scheduler
                .arm_oneshot(TimerKind::PlayingBlocked, self.global.blocked_ttl(), move || async move {
                    if let Some(session) = session.upgrade() {
                        session.playing_blocked.store(false, Ordering::SeqCst);
                        debug!("[{}] playing-blocked grace period over", session.name);
                    }
                });
        }

        if !self.web.refresh().await {
            warn!("[{}] failed to refresh web session", self.name);
        }

        if self.config.group_chat_id != 0 {
            let session = Arc::clone(self);
            tasks::spawn_detached("join group chat", async move {
                session.net.join_chat(session.config.group_chat_id).await;
            });
        }

        let session = Arc::clone(self);
        tasks::spawn_detached("dismiss notifications", async move {
            session.web.mark_notifications_seen().await;
        });

        let session = Arc::clone(self);
        tasks::spawn_detached("post-login trade check", async move {
            session.check_trades().await;
        });

        self.farmer.start().await;
    }

    async fn on_disconnected(self: &Arc<Self>, user_initiated: bool) {
        let last_result = {
            let mut last = self.last_login_result.lock().unwrap();
            std::mem::replace(&mut *last, LoginResult::Invalid)
        };

        self.heartbeat_failures.store(0, Ordering::SeqCst);
        self.scheduler.cancel(TimerKind::ConnectionFailure);
        self.scheduler.cancel(TimerKind::PlayingBlocked);

        if self.is_running() {
            *self.state.lock().unwrap() = SessionState::Disconnected;
        }

        info!("[{}] disconnected", self.name);

        self.farmer.on_disconnected().await;
        self.first_trade_sent.store(false, Ordering::SeqCst);
        self.handled_gifts.lock().unwrap().clear();

        if user_initiated {
            return;
        }

        // Dispatch on the previous login result, not the disconnect reason
        match last_result {
            LoginResult::Invalid => {
                // No logon completed at all, so the service is down;
                // one-time codes would be stale by the next attempt
                *self.guard_code.lock().unwrap() = None;
                *self.two_factor_code.lock().unwrap() = None;
            }
            LoginResult::InvalidPassword => {
                let had_login_key = self.login_key.lock().unwrap().take().is_some();
                if had_login_key {
                    info!("[{}] removed expired login key", self.name);
                } else {
                    // Without a login key in play this is nearly always
                    // rate limiting in disguise
                    info!(
                        "[{}] rate limited, cooling down for {:?}",
                        self.name,
                        self.global.login_cooldown()
                    );
                    tokio::time::sleep(self.global.login_cooldown()).await;
                }
            }
            LoginResult::RateLimited => {
                info!(
                    "[{}] rate limited, cooling down for {:?}",
                    self.name,
                    self.global.login_cooldown()
                );
                tokio::time::sleep(self.global.login_cooldown()).await;
            }
            LoginResult::NoConnection
            | LoginResult::Timeout
            | LoginResult::ServiceUnavailable
            | LoginResult::TryAnotherEndpoint => {
                tokio::time::sleep(self.global.reconnect_delay()).await;
            }
            LoginResult::AccountDisabled => {
                // Permanent; never reconnect
                return;
            }
            _ => {}
        }

        if !self.is_running() || self.net.is_connected() {
            return;
        }

        info!("[{}] reconnecting", self.name);
        self.connect(false).await;
    }

    fn on_login_key(&self, key: String) {
        debug!("[{}] received fresh login key", self.name);
        *self.login_key.lock().unwrap() = Some(key);
    }

    async fn on_playing_session(&self, blocked: bool) {
        self.scheduler.cancel(TimerKind::PlayingBlocked);
        self.playing_blocked.store(blocked, Ordering::SeqCst);

        if blocked {
            info!("[{}] account occupied by another session", self.name);
        } else {
            info!("[{}] account is free again", self.name);
            self.farmer.resume(false).await;
        }
    }

    async fn on_gifts(&self, gift_ids: Vec<u64>) {
        for gift_id in gift_ids {
            if !self.handled_gifts.lock().unwrap().insert(gift_id) {
                continue;
            }

            self.limiter.acquire(LimiterKind::Gifts).await;

            match self.net.accept_gift(gift_id).await {
                Ok(()) => info!("[{}] accepted gift {}", self.name, gift_id),
                Err(e) => warn!("[{}] failed to accept gift {}: {}", self.name, gift_id, e),
            }
        }
    }

    /// Periodic liveness check; escalates to a forced reconnect once the
    /// failure counter crosses the timeout-derived threshold
    pub async fn heartbeat(self: &Arc<Self>) {
        let failures = self.heartbeat_failures.load(Ordering::SeqCst);
        if !self.is_running() || !self.is_logged_on() || failures == HEARTBEAT_ESCALATED {
            return;
        }

        if self.net.idle_time() <= self.global.heartbeat_ttl() {
            // The transport is visibly alive; nothing to probe
            self.heartbeat_failures.store(0, Ordering::SeqCst);
            return;
        }

        match self.net.probe().await {
            Ok(()) => {
                self.heartbeat_failures.store(0, Ordering::SeqCst);
            }
            Err(e) => {
                if !self.is_running() || !self.is_logged_on() {
                    return;
                }

                let failures = self.heartbeat_failures.fetch_add(1, Ordering::SeqCst) + 1;
                debug!("[{}] heartbeat failure {}: {}", self.name, failures, e);

                if failures >= self.global.max_heartbeat_failures() {
                    self.heartbeat_failures.store(HEARTBEAT_ESCALATED, Ordering::SeqCst);
                    warn!("[{}] connection is silently dead, reconnecting", self.name);
                    self.connect(true).await;
                }
            }
        }
    }

    /// Send everything lootable to the first configured master
    pub async fn loot(&self) -> anyhow::Result<&'static str> {
        let _guard = self.ops_lock.lock().await;

        if !self.is_logged_on() {
            return Ok("not connected");
        }

        let Some(master_id) = self.config.first_master_id() else {
            return Ok("no master configured");
        };

        let inventory = self
            .web
            .fetch_inventory(Some(&LOOTABLE_KINDS))
            .await
            .map_err(|e| anyhow::anyhow!("inventory fetch failed: {e}"))?;

        if inventory.is_empty() {
            return Ok("nothing to loot");
        }

        let token = self.web.fetch_trade_token().await;
        self.web
            .send_trade_offer(master_id, &inventory, token.as_deref())
            .await
            .map_err(|e| anyhow::anyhow!("trade offer failed: {e}"))?;

        info!(
            "[{}] sent {} asset stacks to master {}",
            self.name,
            inventory.len(),
            master_id
        );

        if self.store.has_authenticator() {
            // Give the remote service a moment to materialize the
            // confirmation before we start polling for it
            tokio::time::sleep(TRADE_CONFIRMATION_GRACE).await;

            let filter = ReconcileFilter {
                kind: Some(ConfirmationKind::Trade),
                counterparty_id: Some(master_id),
                ..ReconcileFilter::default()
            };
            if !reconciler::reconcile(&self.store, self.global.optimization_mode, true, &filter)
                .await
            {
                return Err(anyhow::anyhow!("confirmation reconciliation failed"));
            }
        }

        Ok("done")
    }

    /// Resolve every pending confirmation for this session
    pub async fn reconcile_confirmations(&self, accept: bool) -> bool {
        let _guard = self.ops_lock.lock().await;
        reconciler::reconcile(
            &self.store,
            self.global.optimization_mode,
            accept,
            &ReconcileFilter::default(),
        )
        .await
    }

    pub fn has_authenticator(&self) -> bool {
        self.store.has_authenticator()
    }

    pub async fn generate_token(&self) -> Option<String> {
        self.store.generate_token().await
    }

    /// Evaluate pending trade proposals; called after login and whenever
    /// the network signals new trade activity
    pub async fn check_trades(self: &Arc<Self>) {
        let result = self.trading.check_trades().await;
        if !result.accepted.is_empty() {
            // Freshly received items may change what is worth idling
            self.farmer.start().await;
        }
    }

    pub async fn pause_farming(&self, sticky: bool) {
        self.farmer.pause(sticky).await;
    }

    pub async fn resume_farming(&self, user_action: bool) -> bool {
        self.farmer.resume(user_action).await
    }

    pub async fn restart_farming(&self) {
        self.farmer.start().await;
    }

    pub fn is_farming_paused(&self) -> bool {
        self.farmer.is_paused()
    }

    pub async fn send_message(&self, target: u64, text: &str) {
        if target == 0 || text.is_empty() {
            error!("[{}] refusing to send an empty or unaddressed message", self.name);
            return;
        }
        self.net.send_message(target, text).await;
    }

    /// Farming scheduler callback: a farming round ended
    pub async fn on_farming_finished(self: &Arc<Self>, farmed_anything: bool) {
        self.on_farming_stopped().await;

        if farmed_anything || !self.first_trade_sent.load(Ordering::SeqCst) {
            self.first_trade_sent.store(true, Ordering::SeqCst);
            if self.config.send_on_farming_finished {
                if let Err(e) = self.loot().await {
                    warn!("[{}] loot after farming failed: {:#}", self.name, e);
                }
            }
        }

        if self.config.shutdown_on_farming_finished {
            self.stop().await;
        }
    }

    /// Farming scheduler callback: idling stopped without finishing
    pub async fn on_farming_stopped(&self) {
        debug!("[{}] farming stopped", self.name);
    }

    #[cfg(test)]
    pub(crate) fn timer_armed(&self, kind: TimerKind) -> bool {
        self.scheduler.is_armed(kind)
    }

    fn arm_connection_failure_timer(self: &Arc<Self>) {
        if self.scheduler.is_armed(TimerKind::ConnectionFailure) {
            return;
        }

        let session = Arc::downgrade(self);
        self.scheduler.arm_oneshot(
            TimerKind::ConnectionFailure,
            self.global.connection_failure_delay(),
            move || async move {
                if let Some(session) = session.upgrade() {
                    session.on_permanent_connection_failure().await;
                }
            },
        );
    }

    /// No successful connect/login before the failure timer fired.
    /// Partial protocol state is not safely resumable, so the fleet is
    /// asked to destroy this session and register a fresh one.
    async fn on_permanent_connection_failure(&self) {
        if !self.is_running() {
            return;
        }

        warn!("[{}] connection failure escalated, recreating session", self.name);
        if self.recovery_tx.send(self.name.clone()).is_err() {
            error!("[{}] fleet recovery channel is gone", self.name);
        }
    }

    fn arm_heartbeat(self: &Arc<Self>) {
        let session = Arc::downgrade(self);
        let period = Duration::from_secs(60);
        self.scheduler
            .arm_periodic(TimerKind::Heartbeat, period, period, move || {
                let session = session.clone();
                async move {
                    if let Some(session) = session.upgrade() {
                        session.heartbeat().await;
                    }
                }
            });
    }

    fn arm_send_items(self: &Arc<Self>) {
        let Some(period) = self.config.send_trade_period() else {
            self.scheduler.cancel(TimerKind::SendItems);
            return;
        };

        let session = Arc::downgrade(self);
        self.scheduler
            .arm_periodic(TimerKind::SendItems, period, period, move || {
                let session = session.clone();
                async move {
                    if let Some(session) = session.upgrade() {
                        if let Err(e) = session.loot().await {
                            warn!("[{}] scheduled loot failed: {:#}", session.name, e);
                        }
                    }
                }
            });
    }
}
