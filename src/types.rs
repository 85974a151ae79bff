//! Core types shared across the fleet
//!
//! These types define the contract between sessions, the trade decision
//! engine, and the external collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One item instance held, offered or requested in a trade.
///
/// `class_id` is shared by all fungible copies of the same item
/// definition; `amount` counts how many copies this instance carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Umbrella game/application the item economically belongs to
    pub real_app_id: u32,
    /// Item kind tag (card, emoticon, booster, ...)
    pub kind: ItemKind,
    /// Opaque identity shared by all fungible copies
    pub class_id: u64,
    /// Number of fungible units
    pub amount: u32,
}

impl Asset {
    pub fn new(real_app_id: u32, kind: ItemKind, class_id: u64, amount: u32) -> Self {
        Self {
            real_app_id,
            kind,
            class_id,
            amount,
        }
    }
}

/// Item kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Unknown,
    BoosterPack,
    Emoticon,
    FoilTradingCard,
    ProfileBackground,
    TradingCard,
    Gems,
}

/// A pending out-of-band authorization for a sensitive action
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Confirmation {
    /// Confirmation identifier within the authenticator state
    pub id: u64,
    /// Nonce required to resolve this confirmation
    pub key: u64,
    /// What kind of action this confirmation guards
    pub kind: ConfirmationKind,
}

/// Confirmation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationKind {
    Unknown,
    /// Catch-all kind that survives every kind filter
    Generic,
    Trade,
    Market,
}

/// Resolved details for a single confirmation
#[derive(Debug, Clone)]
pub struct ConfirmationDetails {
    pub confirmation: Confirmation,
    /// Counterparty network id, 0 when not associated
    pub counterparty_id: u64,
    /// Trade offer id, 0 when not associated
    pub trade_id: u64,
}

/// An incoming exchange proposed by another identity on the network
#[derive(Debug, Clone)]
pub struct TradeProposal {
    pub id: u64,
    /// Identity proposing the exchange
    pub partner_id: u64,
    /// Assets the proposal takes from us
    pub to_give: Vec<Asset>,
    /// Assets the proposal hands to us
    pub to_receive: Vec<Asset>,
}

/// Result code delivered by the network client after a login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginResult {
    /// Placeholder meaning no login attempt completed
    Invalid,
    Ok,
    /// Email guard code required and none cached
    NeedsGuardCode,
    /// Second factor required and none cached
    NeedsTwoFactor,
    TwoFactorMismatch,
    InvalidPassword,
    RateLimited,
    NoConnection,
    Timeout,
    ServiceUnavailable,
    TryAnotherEndpoint,
    AccountDisabled,
    /// Raw result code the core has no dedicated handling for
    Other(u16),
}

/// Failure classification driving reconnect behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Wait a cooldown, then reconnect automatically
    Transient,
    /// Stop the session, no retry
    Permanent,
    /// Never silently retried
    Unknown,
}

impl LoginResult {
    /// Classify this result for reconnect handling.
    ///
    /// `InvalidPassword` lands in the transient class here; the session
    /// refines it at the call site, where it knows whether a cached login
    /// key was in play (stale credential) or not (rate limiting).
    pub fn classification(self) -> FailureClass {
        match self {
            LoginResult::TwoFactorMismatch
            | LoginResult::InvalidPassword
            | LoginResult::RateLimited
            | LoginResult::NoConnection
            | LoginResult::Timeout
            | LoginResult::ServiceUnavailable
            | LoginResult::TryAnotherEndpoint => FailureClass::Transient,
            LoginResult::AccountDisabled => FailureClass::Permanent,
            _ => FailureClass::Unknown,
        }
    }
}

impl std::fmt::Display for LoginResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoginResult::Other(code) => write!(f, "other({code})"),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}

/// Permission rank for a caller against one session, compared numerically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    #[default]
    None,
    FamilySharing,
    Operator,
    Master,
    Owner,
}

/// Point-in-time status snapshot of one session, for the status surface
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub name: String,
    pub state: String,
    pub keep_running: bool,
    pub playing_blocked: bool,
    pub captured_at: DateTime<Utc>,
}
