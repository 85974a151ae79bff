//! Fleet Core
//!
//! Orchestration layer for a fleet of independent network-client
//! sessions: per-session connection/login state machines, process-wide
//! rate limiting, confirmation reconciliation, trade-fairness decisions,
//! and fleet-wide command fan-out. The wire protocol, web API and
//! authenticator state live behind injected collaborator traits.

pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod fleet;
pub mod limiter;
pub mod reconciler;
pub mod scheduler;
pub mod session;
pub mod tasks;
pub mod trading;
pub mod types;

// Re-export main types for convenience
pub use client::{
    ConfirmationStore, Farmer, InputKind, InputSource, LogOnDetails, NetEvent, NetworkClient,
    WebSession,
};
pub use config::{GlobalConfig, OptimizationMode, SessionConfig, TradeAcceptMode};
pub use error::{FleetError, NetError, WebError};
pub use fleet::{Fleet, ServiceFactory, FLEET_WILDCARD};
pub use limiter::{LimiterKind, RateLimiter};
pub use reconciler::ReconcileFilter;
pub use scheduler::{Scheduler, TimerKind};
pub use session::{Session, SessionServices, SessionState};
pub use trading::is_trade_neutral_or_better;
pub use types::{
    Asset, Confirmation, ConfirmationDetails, ConfirmationKind, FailureClass, ItemKind,
    LoginResult, Permission, SessionSnapshot, TradeProposal,
};
