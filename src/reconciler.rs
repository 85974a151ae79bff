//! Confirmation reconciliation
//!
//! Pulls pending confirmations from the authenticator store, filters them
//! down to the ones the caller is interested in, and resolves them in
//! batches until the store reports none left.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::client::ConfirmationStore;
use crate::config::OptimizationMode;
use crate::types::{Confirmation, ConfirmationDetails, ConfirmationKind};

/// Filters narrowing which pending confirmations a call may resolve
#[derive(Debug, Clone, Default)]
pub struct ReconcileFilter {
    /// Only confirmations of this kind (the generic kind always survives)
    pub kind: Option<ConfirmationKind>,
    /// Only confirmations whose resolved counterparty matches
    pub counterparty_id: Option<u64>,
    /// Only confirmations whose resolved trade id is in this set
    pub trade_ids: Option<HashSet<u64>>,
}

impl ReconcileFilter {
    fn needs_details(&self) -> bool {
        self.counterparty_id.is_some()
            || self.trade_ids.as_ref().map(|ids| !ids.is_empty()).unwrap_or(false)
    }

    fn excludes(&self, details: &ConfirmationDetails) -> bool {
        if let Some(counterparty_id) = self.counterparty_id {
            if details.counterparty_id != 0 && details.counterparty_id != counterparty_id {
                return true;
            }
        }

        if let Some(trade_ids) = &self.trade_ids {
            if details.trade_id != 0 && !trade_ids.contains(&details.trade_id) {
                return true;
            }
        }

        false
    }
}

/// Resolve every matching pending confirmation, accepting or rejecting.
///
/// Loops until a fetch comes back empty, since new confirmations may
/// appear while a batch is being resolved. A failed resolve aborts the
/// whole call; already-resolved batches keep their outcome.
pub async fn reconcile(
    store: &Arc<dyn ConfirmationStore>,
    mode: OptimizationMode,
    accept: bool,
    filter: &ReconcileFilter,
) -> bool {
    if !store.has_authenticator() {
        return false;
    }

    loop {
        let mut confirmations = store.list_confirmations().await;
        if confirmations.is_empty() {
            return true;
        }

        if let Some(kind) = filter.kind {
            confirmations.retain(|confirmation| {
                confirmation.kind == kind || confirmation.kind == ConfirmationKind::Generic
            });
            if confirmations.is_empty() {
                return true;
            }
        }

        if !filter.needs_details() {
            if !store.resolve(&confirmations, accept).await {
                warn!("failed to resolve a batch of {} confirmations", confirmations.len());
                return false;
            }
            continue;
        }

        let details = fetch_details(store, mode, &confirmations).await;

        let ignored: HashSet<Confirmation> = details
            .iter()
            .flatten()
            .filter(|details| filter.excludes(details))
            .map(|details| details.confirmation.clone())
            .collect();

        if !ignored.is_empty() {
            debug!("ignoring {} confirmations outside the filter", ignored.len());
            confirmations.retain(|confirmation| !ignored.contains(confirmation));
            if confirmations.is_empty() {
                return true;
            }
        }

        if !store.resolve(&confirmations, accept).await {
            warn!("failed to resolve a batch of {} confirmations", confirmations.len());
            return false;
        }
    }
}

async fn fetch_details(
    store: &Arc<dyn ConfirmationStore>,
    mode: OptimizationMode,
    confirmations: &[Confirmation],
) -> Vec<Option<ConfirmationDetails>> {
    match mode {
        OptimizationMode::MinMemoryUsage => {
            let mut results = Vec::with_capacity(confirmations.len());
            for confirmation in confirmations {
                results.push(store.confirmation_details(confirmation).await);
            }
            results
        }
        OptimizationMode::MaxPerformance => {
            join_all(
                confirmations
                    .iter()
                    .map(|confirmation| store.confirmation_details(confirmation)),
            )
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted store: one Vec of pending confirmations per fetch
    struct ScriptedStore {
        batches: Mutex<Vec<Vec<Confirmation>>>,
        resolved: Mutex<Vec<(Vec<Confirmation>, bool)>>,
        details: Vec<ConfirmationDetails>,
        fail_resolve: bool,
        authenticator: bool,
    }

    impl ScriptedStore {
        fn new(batches: Vec<Vec<Confirmation>>) -> Self {
            Self {
                batches: Mutex::new(batches),
                resolved: Mutex::new(Vec::new()),
                details: Vec::new(),
                fail_resolve: false,
                authenticator: true,
            }
        }

        fn with_details(mut self, details: Vec<ConfirmationDetails>) -> Self {
            self.details = details;
            self
        }

        fn resolved(&self) -> Vec<(Vec<Confirmation>, bool)> {
            self.resolved.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConfirmationStore for ScriptedStore {
        fn has_authenticator(&self) -> bool {
            self.authenticator
        }

        async fn list_confirmations(&self) -> Vec<Confirmation> {
            let mut batches = self.batches.lock().unwrap();
            if batches.is_empty() {
                Vec::new()
            } else {
                batches.remove(0)
            }
        }

        async fn confirmation_details(
            &self,
            confirmation: &Confirmation,
        ) -> Option<ConfirmationDetails> {
            self.details
                .iter()
                .find(|details| details.confirmation == *confirmation)
                .cloned()
        }

        async fn resolve(&self, confirmations: &[Confirmation], accept: bool) -> bool {
            self.resolved
                .lock()
                .unwrap()
                .push((confirmations.to_vec(), accept));
            !self.fail_resolve
        }

        async fn generate_token(&self) -> Option<String> {
            None
        }
    }

    fn confirmation(id: u64, kind: ConfirmationKind) -> Confirmation {
        Confirmation { id, key: id * 10, kind }
    }

    #[tokio::test]
    async fn test_zero_pending_is_immediate_success() {
        let store: Arc<dyn ConfirmationStore> = Arc::new(ScriptedStore::new(vec![]));
        let ok = reconcile(
            &store,
            OptimizationMode::MaxPerformance,
            true,
            &ReconcileFilter::default(),
        )
        .await;
        assert!(ok);
    }

    #[tokio::test]
    async fn test_no_resolve_call_when_nothing_pending() {
        let scripted = Arc::new(ScriptedStore::new(vec![]));
        let store: Arc<dyn ConfirmationStore> = scripted.clone();
        reconcile(
            &store,
            OptimizationMode::MaxPerformance,
            true,
            &ReconcileFilter::default(),
        )
        .await;
        assert!(scripted.resolved().is_empty());
    }

    #[tokio::test]
    async fn test_kind_filter_keeps_generic() {
        let scripted = Arc::new(ScriptedStore::new(vec![vec![
            confirmation(1, ConfirmationKind::Trade),
            confirmation(2, ConfirmationKind::Market),
            confirmation(3, ConfirmationKind::Generic),
        ]]));
        let store: Arc<dyn ConfirmationStore> = scripted.clone();

        let filter = ReconcileFilter {
            kind: Some(ConfirmationKind::Trade),
            ..ReconcileFilter::default()
        };
        assert!(reconcile(&store, OptimizationMode::MaxPerformance, true, &filter).await);

        let resolved = scripted.resolved();
        assert_eq!(resolved.len(), 1);
        let ids: Vec<u64> = resolved[0].0.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(resolved[0].1);
    }

    #[tokio::test]
    async fn test_loops_until_fetch_is_empty() {
        let scripted = Arc::new(ScriptedStore::new(vec![
            vec![confirmation(1, ConfirmationKind::Trade)],
            // Appeared while the first batch was being resolved
            vec![confirmation(2, ConfirmationKind::Trade)],
        ]));
        let store: Arc<dyn ConfirmationStore> = scripted.clone();

        assert!(
            reconcile(
                &store,
                OptimizationMode::MaxPerformance,
                false,
                &ReconcileFilter::default()
            )
            .await
        );
        assert_eq!(scripted.resolved().len(), 2);
    }

    #[tokio::test]
    async fn test_trade_id_filter_drops_unrelated() {
        let trade = confirmation(1, ConfirmationKind::Trade);
        let unrelated = confirmation(2, ConfirmationKind::Trade);
        let scripted = Arc::new(
            ScriptedStore::new(vec![vec![trade.clone(), unrelated.clone()]]).with_details(vec![
                ConfirmationDetails {
                    confirmation: trade.clone(),
                    counterparty_id: 0,
                    trade_id: 77,
                },
                ConfirmationDetails {
                    confirmation: unrelated.clone(),
                    counterparty_id: 0,
                    trade_id: 88,
                },
            ]),
        );
        let store: Arc<dyn ConfirmationStore> = scripted.clone();

        let filter = ReconcileFilter {
            trade_ids: Some(HashSet::from([77])),
            ..ReconcileFilter::default()
        };
        assert!(reconcile(&store, OptimizationMode::MinMemoryUsage, true, &filter).await);

        let resolved = scripted.resolved();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].0, vec![trade]);
    }

    #[tokio::test]
    async fn test_failed_resolve_aborts() {
        let mut inner = ScriptedStore::new(vec![
            vec![confirmation(1, ConfirmationKind::Trade)],
            vec![confirmation(2, ConfirmationKind::Trade)],
        ]);
        inner.fail_resolve = true;
        let scripted = Arc::new(inner);
        let store: Arc<dyn ConfirmationStore> = scripted.clone();

        assert!(
            !reconcile(
                &store,
                OptimizationMode::MaxPerformance,
                true,
                &ReconcileFilter::default()
            )
            .await
        );
        // Aborted after the first failed batch, no retry within the call
        assert_eq!(scripted.resolved().len(), 1);
    }

    #[tokio::test]
    async fn test_without_authenticator_reports_failure() {
        let mut inner = ScriptedStore::new(vec![]);
        inner.authenticator = false;
        let store: Arc<dyn ConfirmationStore> = Arc::new(inner);
        assert!(
            !reconcile(
                &store,
                OptimizationMode::MaxPerformance,
                true,
                &ReconcileFilter::default()
            )
            .await
        );
    }
}
