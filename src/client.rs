//! External collaborator interfaces
//!
//! The core owns none of the wire protocol, web API or authenticator
//! state. Each is an injected trait object; sessions receive network
//! events over a channel and issue typed calls back.

use async_trait::async_trait;

use crate::error::{NetError, WebError};
use crate::types::{
    Asset, Confirmation, ConfirmationDetails, ItemKind, LoginResult, TradeProposal,
};

/// Credentials handed to the network client for a login attempt
#[derive(Debug, Clone, Default)]
pub struct LogOnDetails {
    pub username: String,
    /// Ignored when a login key is present
    pub password: Option<String>,
    /// Long-lived credential issued by the remote service
    pub login_key: Option<String>,
    /// One-time email guard code
    pub guard_code: Option<String>,
    /// One-time second-factor code
    pub two_factor_code: Option<String>,
}

/// Event delivered by the network client to its owning session
#[derive(Debug, Clone)]
pub enum NetEvent {
    Connected,
    Disconnected {
        /// True when we initiated the disconnect ourselves
        user_initiated: bool,
    },
    LoggedOn {
        result: LoginResult,
        /// Extended result code, only meaningful for diagnostics
        extended: u16,
    },
    /// Fresh long-lived credential to cache for future logins
    LoginKey(String),
    /// Another client session on the same account started or stopped playing
    PlayingSession { blocked: bool },
    /// Pending gift passes waiting to be redeemed
    Gifts { gift_ids: Vec<u64> },
    /// Inbound chat message, the command surface input
    Message { caller_id: u64, text: String },
}

/// Low-level connection/login surface, one instance per session.
///
/// `connect` may be called on a transport the core considers silently
/// dead; implementations reset any stale connection state first.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Start connecting; completion arrives as a `Connected` event
    async fn connect(&self) -> Result<(), NetError>;

    /// Tear the connection down; emits `Disconnected { user_initiated: true }`
    async fn disconnect(&self);

    /// Attempt a login; the outcome arrives as a `LoggedOn` event
    async fn log_on(&self, details: LogOnDetails);

    /// Active liveness probe; an error counts as one heartbeat failure
    async fn probe(&self) -> Result<(), NetError>;

    /// Time since the transport last received anything
    fn idle_time(&self) -> std::time::Duration;

    /// Join a group chat on the network
    async fn join_chat(&self, chat_id: u64);

    /// Deliver a chat message to another identity
    async fn send_message(&self, target: u64, text: &str);

    /// Redeem one pending gift pass
    async fn accept_gift(&self, gift_id: u64) -> Result<(), NetError>;
}

/// HTTP-session-based web API surface
#[async_trait]
pub trait WebSession: Send + Sync {
    /// Re-establish the web session after a successful logon
    async fn refresh(&self) -> bool;

    /// Everything currently held, optionally restricted to the given kinds
    async fn fetch_inventory(&self, kinds: Option<&[ItemKind]>) -> Result<Vec<Asset>, WebError>;

    async fn fetch_trade_proposals(&self) -> Result<Vec<TradeProposal>, WebError>;

    async fn accept_trade(&self, trade_id: u64) -> Result<(), WebError>;

    async fn decline_trade(&self, trade_id: u64) -> Result<(), WebError>;

    /// Offer `assets` to `target`; `token` is required for non-friends
    async fn send_trade_offer(
        &self,
        target: u64,
        assets: &[Asset],
        token: Option<&str>,
    ) -> Result<(), WebError>;

    async fn fetch_trade_token(&self) -> Option<String>;

    async fn mark_notifications_seen(&self);
}

/// Authenticator-backed confirmation store
#[async_trait]
pub trait ConfirmationStore: Send + Sync {
    /// Whether this session has an authenticator attached at all
    fn has_authenticator(&self) -> bool;

    async fn list_confirmations(&self) -> Vec<Confirmation>;

    /// Resolve counterparty/trade association; `None` when the fetch failed
    async fn confirmation_details(
        &self,
        confirmation: &Confirmation,
    ) -> Option<ConfirmationDetails>;

    /// Accept or reject the whole batch; false aborts the reconciliation
    async fn resolve(&self, confirmations: &[Confirmation], accept: bool) -> bool;

    /// Current one-time second-factor token
    async fn generate_token(&self) -> Option<String>;
}

/// What kind of interactive input the operator is being asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Login,
    Password,
    GuardCode,
    TwoFactorCode,
}

/// Operator-interactive input, requested at most once per login attempt.
///
/// Implementations bound the wait; returning `None` stops the session
/// instead of retrying indefinitely.
#[async_trait]
pub trait InputSource: Send + Sync {
    async fn request_input(&self, kind: InputKind, session_name: &str) -> Option<String>;
}

/// Idle/farming scheduler surface the core drives
#[async_trait]
pub trait Farmer: Send + Sync {
    /// Begin or re-plan idling after a successful login
    async fn start(&self);

    /// Pause idling; `sticky` pauses survive reconnects until resumed
    async fn pause(&self, sticky: bool);

    /// Resume idling. A sticky pause only yields to `user_action`;
    /// returns false when the pause stays in effect.
    async fn resume(&self, user_action: bool) -> bool;

    async fn on_disconnected(&self);

    fn is_paused(&self) -> bool;
}
