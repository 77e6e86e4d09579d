//! Coordination Engine
//!
//! The single entry point for callers. Each collection sits behind its own
//! `RwLock`; operations touching several collections acquire them in the
//! fixed order offers → datasets → requests → escrow, so concurrent calls
//! cannot deadlock. Reads clone out of the lock and nothing is awaited while
//! a guard is held except other guards.

use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use super::events::{EngineEvent, EscrowDisposition};
use super::settlement::SettlementGateway;
use crate::catalog::DatasetCatalog;
use crate::config::{EngineConfig, EscrowDeletePolicy};
use crate::domain::{
    AccessResult, Address, ContextId, DatasetId, DatasetListing, EscrowEntry, EscrowStatus,
    IdSequence, NewListing, NewOffer, OfferId, RequestId, RequestStatus, ResourceOffer,
    SettleOutcome, TrainingRequest,
};
use crate::error::{ErrorKind, Result, TrustrainError};
use crate::escrow::EscrowLedger;
use crate::lifecycle::RequestLifecycle;
use crate::persistence::{EngineSnapshot, IdCounters, SNAPSHOT_VERSION};
use crate::registry::ResourceRegistry;

/// A deleted request and what became of its escrow obligation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedRequest {
    pub request: TrainingRequest,
    pub disposition: EscrowDisposition,
}

/// A fulfilled request whose training obligation is still open
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentDue {
    pub request: TrainingRequest,
    pub entry: EscrowEntry,
}

fn resume_after(stored: u64, ids: impl Iterator<Item = u64>) -> IdSequence {
    IdSequence::resume_after(ids.max().unwrap_or(0).max(stored))
}

pub struct CoordinationEngine {
    offers: RwLock<ResourceRegistry>,
    datasets: RwLock<DatasetCatalog>,
    requests: RwLock<RequestLifecycle>,
    escrow: RwLock<EscrowLedger>,
    config: EngineConfig,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl CoordinationEngine {
    /// Create an empty engine
    pub fn new(config: EngineConfig) -> Self {
        Self::assemble(
            config,
            ResourceRegistry::new(),
            DatasetCatalog::new(),
            RequestLifecycle::new(),
            EscrowLedger::new(),
        )
    }

    /// Rebuild an engine from a snapshot.
    ///
    /// Id counters resume after the highest id present even if the stored
    /// counter is behind, so restored ids are never handed out again.
    /// Duplicate ids or escrow contexts are a `Persistence` error.
    pub fn from_snapshot(config: EngineConfig, snapshot: EngineSnapshot) -> Result<Self> {
        let offer_ids = resume_after(
            snapshot.counters.offers,
            snapshot.offers.iter().map(|o| o.id.value()),
        );
        let dataset_ids = resume_after(
            snapshot.counters.datasets,
            snapshot.datasets.iter().map(|d| d.id.value()),
        );
        let request_ids = resume_after(
            snapshot.counters.requests,
            snapshot.requests.iter().map(|r| r.id.value()),
        );

        info!(
            "Restoring engine: {} offers, {} datasets, {} requests, {} escrow entries",
            snapshot.offers.len(),
            snapshot.datasets.len(),
            snapshot.requests.len(),
            snapshot.escrow.len()
        );

        Ok(Self::assemble(
            config,
            ResourceRegistry::restore(snapshot.offers, offer_ids)?,
            DatasetCatalog::restore(snapshot.datasets, dataset_ids)?,
            RequestLifecycle::restore(snapshot.requests, request_ids)?,
            EscrowLedger::restore(snapshot.escrow, snapshot.escrow_history)?,
        ))
    }

    fn assemble(
        config: EngineConfig,
        registry: ResourceRegistry,
        catalog: DatasetCatalog,
        lifecycle: RequestLifecycle,
        ledger: EscrowLedger,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            offers: RwLock::new(registry),
            datasets: RwLock::new(catalog),
            requests: RwLock::new(lifecycle),
            escrow: RwLock::new(ledger),
            config,
            event_tx,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to committed state changes
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: EngineEvent) {
        debug!("Engine event: {}", event.name());
        // Sending without subscribers is fine
        let _ = self.event_tx.send(event);
    }

    // ==================== Offers ====================

    pub async fn register_offer(&self, owner: &Address, offer: NewOffer) -> Result<OfferId> {
        let mut offers = self.offers.write().await;
        let id = offers.register(owner, offer)?;
        self.emit(EngineEvent::OfferRegistered {
            offer: id,
            owner: owner.clone(),
        });
        Ok(id)
    }

    pub async fn list_offers(&self) -> Vec<ResourceOffer> {
        self.offers.read().await.list()
    }

    pub async fn offers_by(&self, owner: &Address) -> Vec<ResourceOffer> {
        self.offers.read().await.offers_by(owner)
    }

    pub async fn remove_offer(&self, id: OfferId, caller: &Address) -> Result<ResourceOffer> {
        let mut offers = self.offers.write().await;
        let removed = offers.remove(id, caller)?;
        self.emit(EngineEvent::OfferRemoved {
            offer: id,
            owner: removed.owner.clone(),
        });
        Ok(removed)
    }

    // ==================== Datasets ====================

    pub async fn publish_dataset(&self, owner: &Address, listing: NewListing) -> Result<DatasetId> {
        let free = listing.free;
        let mut datasets = self.datasets.write().await;
        let id = datasets.publish(owner, listing)?;
        self.emit(EngineEvent::DatasetPublished {
            dataset: id,
            owner: owner.clone(),
            free,
        });
        Ok(id)
    }

    pub async fn list_datasets(&self) -> Vec<DatasetListing> {
        self.datasets.read().await.list()
    }

    pub async fn withdraw_dataset(
        &self,
        id: DatasetId,
        caller: &Address,
    ) -> Result<DatasetListing> {
        let mut datasets = self.datasets.write().await;
        let removed = datasets.withdraw(id, caller)?;
        self.emit(EngineEvent::DatasetWithdrawn {
            dataset: id,
            owner: removed.owner.clone(),
        });
        Ok(removed)
    }

    /// Check or establish `requester`'s access to a listing
    pub async fn request_access(&self, id: DatasetId, requester: &Address) -> Result<AccessResult> {
        let datasets = self.datasets.read().await;
        let mut ledger = self.escrow.write().await;

        let context = ContextId::dataset_access(id, requester.clone());
        let existed = ledger.contains(&context);
        let result = datasets.request_access(id, requester, &mut ledger)?;

        match &result {
            AccessResult::Granted { .. } => self.emit(EngineEvent::AccessGranted {
                dataset: id,
                requester: requester.clone(),
            }),
            AccessResult::PendingPayment {
                context,
                amount_owed,
            } => {
                if !existed {
                    if let Some(entry) = ledger.get(context) {
                        self.emit(EngineEvent::EscrowOpened {
                            context: context.clone(),
                            payer: entry.payer.clone(),
                            payee: entry.payee.clone(),
                            amount: entry.amount_owed,
                        });
                    }
                }
                self.emit(EngineEvent::AccessPending {
                    dataset: id,
                    requester: requester.clone(),
                    amount_owed: *amount_owed,
                });
            }
        }
        Ok(result)
    }

    // ==================== Training requests ====================

    /// Submit a request to `provider`, who must own a registered offer
    pub async fn submit_request(
        &self,
        requester: &Address,
        provider: &Address,
        model_link: &str,
        dataset_link: &str,
    ) -> Result<RequestId> {
        let offers = self.offers.read().await;
        let mut requests = self.requests.write().await;

        let id = requests.submit(requester, provider, model_link, dataset_link, &offers)?;
        self.emit(EngineEvent::RequestSubmitted {
            request: id,
            requester: requester.clone(),
            provider: provider.clone(),
        });
        Ok(id)
    }

    /// Provider accepts or rejects a pending request; opens no escrow
    pub async fn decide(
        &self,
        id: RequestId,
        caller: &Address,
        accept: bool,
    ) -> Result<RequestStatus> {
        let mut requests = self.requests.write().await;
        let status = requests.decide(id, caller, accept)?;
        self.emit(EngineEvent::RequestDecided {
            request: id,
            status,
        });
        Ok(status)
    }

    /// Accept a pending request and open its training obligation in one step.
    ///
    /// Either both happen or neither does.
    pub async fn accept_with_escrow(
        &self,
        id: RequestId,
        caller: &Address,
        amount: u64,
    ) -> Result<EscrowEntry> {
        let mut requests = self.requests.write().await;
        let mut ledger = self.escrow.write().await;

        let (payer, payee) = {
            let request = requests.check_decide(id, caller)?;
            (request.requester.clone(), request.provider.clone())
        };
        let context = ContextId::training(id);
        ledger.check_can_open(&context, amount)?;

        let status = requests.decide(id, caller, true)?;
        let entry = ledger.open(&payer, &payee, context, amount)?;

        self.emit(EngineEvent::RequestDecided {
            request: id,
            status,
        });
        self.emit(EngineEvent::EscrowOpened {
            context: entry.context.clone(),
            payer,
            payee,
            amount,
        });
        Ok(entry)
    }

    pub async fn return_weights(
        &self,
        id: RequestId,
        caller: &Address,
        weights_link: &str,
    ) -> Result<()> {
        let mut requests = self.requests.write().await;
        requests.return_weights(id, caller, weights_link)?;
        self.emit(EngineEvent::WeightsReturned {
            request: id,
            weights_link: weights_link.to_string(),
        });
        Ok(())
    }

    /// Delete a request, applying the configured escrow policy to an open
    /// training obligation. Settled obligations are never touched.
    pub async fn delete_request(&self, id: RequestId, caller: &Address) -> Result<DeletedRequest> {
        let mut requests = self.requests.write().await;
        let mut ledger = self.escrow.write().await;

        requests.check_delete(id, caller)?;
        let context = ContextId::training(id);
        let policy = self.config.escrow_on_delete;

        if let (EscrowStatus::Open { amount_owed }, EscrowDeletePolicy::Refuse) =
            (ledger.status(&context), policy)
        {
            warn!(
                "Refusing to delete {} while {} is still owed",
                id, amount_owed
            );
            return Err(TrustrainError::conflict(
                id,
                format!("has an open escrow obligation of {}", amount_owed),
            ));
        }

        let request = requests.delete(id, caller)?;
        let disposition = match (ledger.status(&context), policy) {
            (EscrowStatus::NoObligation, _) => EscrowDisposition::None,
            (EscrowStatus::Settled { .. }, _) => EscrowDisposition::SettledKept,
            (EscrowStatus::Open { amount_owed }, EscrowDeletePolicy::Cancel) => {
                ledger.cancel_open(&context)?;
                EscrowDisposition::Cancelled { amount_owed }
            }
            (EscrowStatus::Open { amount_owed }, _) => {
                warn!(
                    "Deleted {} with {} still owed; escrow {} is now orphaned",
                    id, amount_owed, context
                );
                EscrowDisposition::Orphaned { amount_owed }
            }
        };

        self.emit(EngineEvent::RequestDeleted {
            request: id,
            by: caller.clone(),
            disposition,
        });
        Ok(DeletedRequest {
            request,
            disposition,
        })
    }

    pub async fn get_request(&self, id: RequestId) -> Result<TrainingRequest> {
        self.requests
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TrustrainError::not_found(id))
    }

    pub async fn list_requests(&self) -> Vec<TrainingRequest> {
        self.requests.read().await.list()
    }

    pub async fn list_requests_with_status(&self, status: RequestStatus) -> Vec<TrainingRequest> {
        self.requests.read().await.with_status(status)
    }

    /// Requests waiting on `provider`'s decision
    pub async fn list_pending_for(&self, provider: &Address) -> Vec<TrainingRequest> {
        self.requests.read().await.pending_for(provider)
    }

    pub async fn list_assigned_to(&self, provider: &Address) -> Vec<TrainingRequest> {
        self.requests.read().await.assigned_to(provider)
    }

    pub async fn list_submitted_by(&self, requester: &Address) -> Vec<TrainingRequest> {
        self.requests.read().await.submitted_by(requester)
    }

    // ==================== Escrow ====================

    /// Open the training obligation for a request accepted without one
    pub async fn open_training_escrow(
        &self,
        id: RequestId,
        caller: &Address,
        amount: u64,
    ) -> Result<EscrowEntry> {
        let requests = self.requests.read().await;
        let mut ledger = self.escrow.write().await;

        let request = requests.get(id).ok_or_else(|| TrustrainError::not_found(id))?;
        if !request.is_party(caller) {
            warn!("{} attempted to open escrow for {} without being a party", caller, id);
            return Err(TrustrainError::unauthorized(id, caller));
        }
        if !request.status.is_engaged() {
            return Err(TrustrainError::invalid_state(
                id,
                request.status,
                "open escrow for",
            ));
        }

        let entry = ledger.open(
            &request.requester,
            &request.provider,
            ContextId::training(id),
            amount,
        )?;
        self.emit(EngineEvent::EscrowOpened {
            context: entry.context.clone(),
            payer: entry.payer.clone(),
            payee: entry.payee.clone(),
            amount,
        });
        Ok(entry)
    }

    /// Record a payment confirmed by the payer. Retrying with the same
    /// amount after success returns [`SettleOutcome::AlreadySettled`].
    pub async fn settle(
        &self,
        caller: &Address,
        context: &ContextId,
        amount: u64,
    ) -> Result<SettleOutcome> {
        let mut ledger = self.escrow.write().await;

        let entry = ledger
            .get(context)
            .ok_or_else(|| TrustrainError::not_found(context.clone()))?;
        if &entry.payer != caller {
            warn!("{} attempted to settle {} owed by {}", caller, context, entry.payer);
            return Err(TrustrainError::unauthorized(context.clone(), caller));
        }

        let outcome = ledger.mark_settled(context, amount, None)?;
        if outcome == SettleOutcome::Settled {
            self.emit(EngineEvent::EscrowSettled {
                context: context.clone(),
                amount,
                reference: None,
            });
        }
        Ok(outcome)
    }

    /// Settle through an external gateway.
    ///
    /// The gateway is awaited with no lock held and bounded by
    /// `settlement_timeout_ms`. A gateway failure or timeout leaves the entry
    /// open and every other collection untouched.
    pub async fn settle_via<G>(
        &self,
        gateway: &G,
        caller: &Address,
        context: &ContextId,
    ) -> Result<SettleOutcome>
    where
        G: SettlementGateway + ?Sized,
    {
        let entry = self
            .escrow
            .read()
            .await
            .get(context)
            .cloned()
            .ok_or_else(|| TrustrainError::not_found(context.clone()))?;

        if &entry.payer != caller {
            warn!("{} attempted to settle {} owed by {}", caller, context, entry.payer);
            return Err(TrustrainError::unauthorized(context.clone(), caller));
        }
        if entry.settled {
            debug!("Escrow {} already settled, skipping gateway", context);
            return Ok(SettleOutcome::AlreadySettled);
        }

        let timeout_ms = self.config.settlement_timeout_ms;
        let receipt = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            gateway.confirm(&entry),
        )
        .await
        {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                warn!("Settlement gateway failed for {}: {}", context, e);
                return Err(match e.kind() {
                    ErrorKind::Settlement => e,
                    _ => TrustrainError::Settlement {
                        context: context.clone(),
                        reason: e.to_string(),
                    },
                });
            }
            Err(_) => {
                warn!("Settlement for {} timed out after {}ms", context, timeout_ms);
                return Err(TrustrainError::SettlementTimeout {
                    context: context.clone(),
                    timeout_ms,
                });
            }
        };

        let mut ledger = self.escrow.write().await;
        let outcome = ledger.mark_settled(
            context,
            receipt.confirmed_amount,
            Some(receipt.reference.clone()),
        )?;
        if outcome == SettleOutcome::Settled {
            self.emit(EngineEvent::EscrowSettled {
                context: context.clone(),
                amount: receipt.confirmed_amount,
                reference: Some(receipt.reference),
            });
        }
        Ok(outcome)
    }

    /// Settlement state of a context; absence is reported as no obligation
    pub async fn escrow_status(&self, context: &ContextId) -> EscrowStatus {
        self.escrow.read().await.status(context)
    }

    pub async fn escrow_entry(&self, context: &ContextId) -> Result<EscrowEntry> {
        self.escrow
            .read()
            .await
            .get(context)
            .cloned()
            .ok_or_else(|| TrustrainError::not_found(context.clone()))
    }

    pub async fn list_escrow(&self) -> Vec<EscrowEntry> {
        self.escrow.read().await.entries()
    }

    /// Open obligations `payer` still has to settle
    pub async fn owed_by(&self, payer: &Address) -> Vec<EscrowEntry> {
        self.escrow.read().await.open_for_payer(payer)
    }

    /// Open obligations owed to `payee`
    pub async fn owed_to(&self, payee: &Address) -> Vec<EscrowEntry> {
        self.escrow.read().await.open_for_payee(payee)
    }

    // ==================== Recovery ====================

    /// Accepted or fulfilled requests with no training obligation
    pub async fn accepted_without_escrow(&self) -> Vec<TrainingRequest> {
        let requests = self.requests.read().await;
        let ledger = self.escrow.read().await;

        requests
            .list()
            .into_iter()
            .filter(|r| r.status.is_engaged() && !ledger.contains(&ContextId::training(r.id)))
            .collect()
    }

    /// Fulfilled requests submitted by `requester` whose obligation is open
    pub async fn awaiting_payment(&self, requester: &Address) -> Vec<PaymentDue> {
        let requests = self.requests.read().await;
        let ledger = self.escrow.read().await;

        requests
            .submitted_by(requester)
            .into_iter()
            .filter(|r| r.status == RequestStatus::WeightsReturned)
            .filter_map(|request| {
                let entry = ledger.get(&ContextId::training(request.id))?;
                entry.is_open().then(|| PaymentDue {
                    entry: entry.clone(),
                    request,
                })
            })
            .collect()
    }

    /// Open obligations whose request or listing no longer exists
    pub async fn orphaned_obligations(&self) -> Vec<EscrowEntry> {
        let datasets = self.datasets.read().await;
        let requests = self.requests.read().await;
        let ledger = self.escrow.read().await;

        ledger
            .open_entries()
            .into_iter()
            .filter(|entry| match &entry.context {
                ContextId::Training { request } => requests.get(*request).is_none(),
                ContextId::DatasetAccess { dataset, .. } => datasets.get(*dataset).is_none(),
            })
            .collect()
    }

    // ==================== State ====================

    /// Consistent copy of every collection
    pub async fn snapshot(&self) -> EngineSnapshot {
        let offers = self.offers.read().await;
        let datasets = self.datasets.read().await;
        let requests = self.requests.read().await;
        let ledger = self.escrow.read().await;

        EngineSnapshot {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            offers: offers.list(),
            datasets: datasets.list(),
            requests: requests.list(),
            escrow: ledger.entries(),
            escrow_history: ledger.settled_history().to_vec(),
            counters: IdCounters {
                offers: offers.id_sequence().last_issued(),
                datasets: datasets.id_sequence().last_issued(),
                requests: requests.id_sequence().last_issued(),
            },
        }
    }
}
