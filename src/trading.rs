//! Trade evaluation and the per-session trade check loop
//!
//! The decision core is a pure function over multiset inventories: a
//! proposal is acceptable when no `(game, kind)` bucket ends up with
//! fewer distinct item identities than it started with. Gains in one
//! bucket never offset losses in another, so a partner cannot extract
//! net diversity loss by bundling across games.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::{ConfirmationStore, WebSession};
use crate::config::{OptimizationMode, SessionConfig};
use crate::reconciler::{self, ReconcileFilter};
use crate::types::{Asset, ConfirmationKind, ItemKind, Permission, TradeProposal};

/// True when the exchange keeps every bucket's identity diversity intact.
///
/// Buckets are keyed by `(real_app_id, kind)` and judged independently:
/// each passes iff the number of distinct identities held with positive
/// quantity after simulating the trade is at least the number before.
pub fn is_trade_neutral_or_better(
    inventory: &[Asset],
    to_give: &[Asset],
    to_receive: &[Asset],
) -> bool {
    type Bucket = (u32, ItemKind);

    let mut state: HashMap<Bucket, HashMap<u64, i64>> = HashMap::new();
    for asset in inventory {
        *state
            .entry((asset.real_app_id, asset.kind))
            .or_default()
            .entry(asset.class_id)
            .or_insert(0) += i64::from(asset.amount);
    }

    let before: HashMap<Bucket, usize> = state
        .iter()
        .map(|(bucket, classes)| {
            (
                *bucket,
                classes.values().filter(|amount| **amount > 0).count(),
            )
        })
        .collect();

    for asset in to_give {
        *state
            .entry((asset.real_app_id, asset.kind))
            .or_default()
            .entry(asset.class_id)
            .or_insert(0) -= i64::from(asset.amount);
    }

    for asset in to_receive {
        *state
            .entry((asset.real_app_id, asset.kind))
            .or_default()
            .entry(asset.class_id)
            .or_insert(0) += i64::from(asset.amount);
    }

    state.iter().all(|(bucket, classes)| {
        let after = classes.values().filter(|amount| **amount > 0).count();
        after >= before.get(bucket).copied().unwrap_or(0)
    })
}

/// Outcome of one pass over the pending proposals
#[derive(Debug, Default, Clone)]
pub struct TradeCheckResult {
    pub accepted: Vec<u64>,
    pub declined: Vec<u64>,
}

/// Per-session trade loop.
///
/// `check_trades` never runs concurrently with itself; a check requested
/// while one is in flight is coalesced into a single follow-up pass.
pub struct Trading {
    web: Arc<dyn WebSession>,
    store: Arc<dyn ConfirmationStore>,
    config: SessionConfig,
    mode: OptimizationMode,
    check_lock: Mutex<()>,
    check_scheduled: StdMutex<bool>,
}

impl Trading {
    pub fn new(
        web: Arc<dyn WebSession>,
        store: Arc<dyn ConfirmationStore>,
        config: SessionConfig,
        mode: OptimizationMode,
    ) -> Self {
        Self {
            web,
            store,
            config,
            mode,
            check_lock: Mutex::new(()),
            check_scheduled: StdMutex::new(false),
        }
    }

    /// Evaluate every pending proposal, accepting or declining each
    pub async fn check_trades(&self) -> TradeCheckResult {
        {
            let mut scheduled = self.check_scheduled.lock().unwrap();
            if *scheduled {
                // A queued pass will pick up whatever triggered us
                return TradeCheckResult::default();
            }
            *scheduled = true;
        }

        let _guard = self.check_lock.lock().await;
        *self.check_scheduled.lock().unwrap() = false;

        let proposals = match self.web.fetch_trade_proposals().await {
            Ok(proposals) => proposals,
            Err(e) => {
                warn!("failed to fetch trade proposals: {}", e);
                return TradeCheckResult::default();
            }
        };

        let mut result = TradeCheckResult::default();

        for proposal in proposals {
            if self.should_accept(&proposal).await {
                match self.web.accept_trade(proposal.id).await {
                    Ok(()) => {
                        info!("accepted trade {} from {}", proposal.id, proposal.partner_id);
                        result.accepted.push(proposal.id);
                    }
                    Err(e) => warn!("failed to accept trade {}: {}", proposal.id, e),
                }
            } else {
                match self.web.decline_trade(proposal.id).await {
                    Ok(()) => {
                        debug!("declined trade {} from {}", proposal.id, proposal.partner_id);
                        result.declined.push(proposal.id);
                    }
                    Err(e) => warn!("failed to decline trade {}: {}", proposal.id, e),
                }
            }
        }

        // Accepting a trade parks a confirmation in the authenticator;
        // resolve exactly the ones belonging to the trades we accepted
        if !result.accepted.is_empty() && self.store.has_authenticator() {
            let filter = ReconcileFilter {
                kind: Some(ConfirmationKind::Trade),
                trade_ids: Some(result.accepted.iter().copied().collect()),
                ..ReconcileFilter::default()
            };
            if !reconciler::reconcile(&self.store, self.mode, true, &filter).await {
                warn!("confirmation reconciliation failed for accepted trades");
            }
        }

        result
    }

    async fn should_accept(&self, proposal: &TradeProposal) -> bool {
        // A proposal that takes nothing from us is a gift
        if proposal.to_give.is_empty() {
            return true;
        }

        let partner = self.config.permission_for(proposal.partner_id);
        if partner >= Permission::Master && self.config.trade_accept.accepts_from_master() {
            return true;
        }

        if !self.config.trade_accept.requires_fairness() {
            return false;
        }

        // Evaluate fairness against a fresh snapshot restricted to the
        // kinds the proposal touches
        let kinds: HashSet<ItemKind> = proposal
            .to_give
            .iter()
            .chain(proposal.to_receive.iter())
            .map(|asset| asset.kind)
            .collect();
        let kinds: Vec<ItemKind> = kinds.into_iter().collect();

        let inventory = match self.web.fetch_inventory(Some(&kinds)).await {
            Ok(inventory) => inventory,
            Err(e) => {
                warn!("failed to fetch inventory for trade {}: {}", proposal.id, e);
                return false;
            }
        };

        is_trade_neutral_or_better(&inventory, &proposal.to_give, &proposal.to_receive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemKind::{Emoticon, TradingCard};

    const GAME_A: u32 = 570;
    const GAME_B: u32 = 730;

    fn card(game: u32, class_id: u64, amount: u32) -> Asset {
        Asset::new(game, TradingCard, class_id, amount)
    }

    fn emote(game: u32, class_id: u64, amount: u32) -> Asset {
        Asset::new(game, Emoticon, class_id, amount)
    }

    #[test]
    fn test_single_game_neutral_accept() {
        // Swapping our only card for a different one keeps diversity at 1
        let inventory = [card(GAME_A, 1, 1)];
        let give = [card(GAME_A, 1, 1)];
        let receive = [card(GAME_A, 2, 1)];
        assert!(is_trade_neutral_or_better(&inventory, &give, &receive));
    }

    #[test]
    fn test_single_game_good_accept() {
        // Giving one of two copies while gaining a new identity
        let inventory = [card(GAME_A, 1, 2)];
        let give = [card(GAME_A, 1, 1)];
        let receive = [card(GAME_A, 2, 1)];
        assert!(is_trade_neutral_or_better(&inventory, &give, &receive));
    }

    #[test]
    fn test_single_game_bad_reject() {
        // Losing the last copy of identity 1 for a duplicate of identity 2
        let inventory = [card(GAME_A, 1, 1), card(GAME_A, 2, 1)];
        let give = [card(GAME_A, 1, 1)];
        let receive = [card(GAME_A, 2, 1)];
        assert!(!is_trade_neutral_or_better(&inventory, &give, &receive));
    }

    #[test]
    fn test_multi_game_neutral_accept() {
        let inventory = [card(GAME_A, 1, 2), card(GAME_B, 1, 1)];
        let give = [card(GAME_A, 1, 1), card(GAME_B, 1, 1)];
        let receive = [card(GAME_A, 2, 1), card(GAME_B, 2, 1)];
        assert!(is_trade_neutral_or_better(&inventory, &give, &receive));
    }

    #[test]
    fn test_multi_game_bad_reject() {
        // Game A improves, but game B drops a unique identity with no
        // replacement; a gain in one bucket never pays for another's loss
        let inventory = [card(GAME_A, 1, 9), card(GAME_B, 3, 1), card(GAME_B, 4, 1)];
        let give = [card(GAME_A, 1, 1), card(GAME_B, 3, 1)];
        let receive = [card(GAME_A, 2, 1), card(GAME_B, 4, 1)];
        assert!(!is_trade_neutral_or_better(&inventory, &give, &receive));
    }

    #[test]
    fn test_single_game_multi_kind_neutral_accept() {
        let inventory = [card(GAME_A, 1, 9), emote(GAME_A, 3, 1)];
        let give = [card(GAME_A, 1, 1), emote(GAME_A, 3, 1)];
        let receive = [card(GAME_A, 2, 1), emote(GAME_A, 4, 1)];
        assert!(is_trade_neutral_or_better(&inventory, &give, &receive));
    }

    #[test]
    fn test_single_game_multi_kind_bad_reject() {
        // Kinds bucket separately: the emoticon bucket loses identity 4
        // for a duplicate of 3, and the card gain cannot compensate
        let inventory = [card(GAME_A, 1, 9), emote(GAME_A, 3, 9), emote(GAME_A, 4, 1)];
        let give = [card(GAME_A, 1, 1), emote(GAME_A, 4, 1)];
        let receive = [card(GAME_A, 2, 1), emote(GAME_A, 3, 1)];
        assert!(!is_trade_neutral_or_better(&inventory, &give, &receive));
    }

    #[test]
    fn test_multi_game_multi_kind_bad_reject() {
        let inventory = [card(GAME_A, 1, 9), emote(GAME_B, 3, 9), emote(GAME_B, 4, 1)];
        let give = [card(GAME_A, 1, 1), emote(GAME_B, 4, 1)];
        let receive = [card(GAME_A, 2, 1), emote(GAME_B, 3, 1)];
        assert!(!is_trade_neutral_or_better(&inventory, &give, &receive));
    }

    #[test]
    fn test_multi_game_multi_kind_neutral_accept() {
        let inventory = [card(GAME_A, 1, 9), emote(GAME_B, 3, 1)];
        let give = [card(GAME_A, 1, 1), emote(GAME_B, 3, 1)];
        let receive = [card(GAME_A, 2, 1), emote(GAME_B, 4, 1)];
        assert!(is_trade_neutral_or_better(&inventory, &give, &receive));
    }

    #[test]
    fn test_order_never_matters() {
        let inventory = [card(GAME_A, 1, 2), card(GAME_A, 2, 1), card(GAME_B, 5, 1)];
        let give = [card(GAME_A, 1, 1), card(GAME_B, 5, 1)];
        let receive = [card(GAME_B, 6, 1), card(GAME_A, 3, 1)];

        let forward = is_trade_neutral_or_better(&inventory, &give, &receive);

        let mut inventory_rev = inventory.to_vec();
        inventory_rev.reverse();
        let mut give_rev = give.to_vec();
        give_rev.reverse();
        let mut receive_rev = receive.to_vec();
        receive_rev.reverse();

        assert_eq!(
            forward,
            is_trade_neutral_or_better(&inventory_rev, &give_rev, &receive_rev)
        );
    }

    #[test]
    fn test_partial_stock_never_flips_to_reject() {
        // Giving strictly fewer copies than held keeps the identity alive
        let inventory = [card(GAME_A, 1, 5)];
        let give = [card(GAME_A, 1, 4)];
        let receive: [Asset; 0] = [];
        assert!(is_trade_neutral_or_better(&inventory, &give, &receive));
    }

    #[test]
    fn test_receiving_duplicates_is_harmless() {
        let inventory = [card(GAME_A, 1, 1)];
        let give: [Asset; 0] = [];
        let receive = [card(GAME_A, 1, 3)];
        assert!(is_trade_neutral_or_better(&inventory, &give, &receive));
    }

    #[test]
    fn test_split_quantities_accumulate() {
        // The same identity split across asset instances is one multiset
        let inventory = [card(GAME_A, 1, 1), card(GAME_A, 1, 1)];
        let give = [card(GAME_A, 1, 1)];
        let receive: [Asset; 0] = [];
        assert!(is_trade_neutral_or_better(&inventory, &give, &receive));
    }

    #[test]
    fn test_empty_trade_is_neutral() {
        let inventory = [card(GAME_A, 1, 1)];
        assert!(is_trade_neutral_or_better(&inventory, &[], &[]));
    }
}
