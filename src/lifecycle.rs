//! Training Request Lifecycle
//!
//! State machine for a training engagement between a requester and a
//! provider:
//!
//! ```text
//! Pending ──accept──▶ Accepted ──weights──▶ WeightsReturned
//!    └────reject────▶ Rejected
//! ```
//!
//! Only the named provider drives the machine forward. Either party may
//! delete a request in any state. Payment is tracked separately in the
//! escrow ledger and layered on top by the coordinator.

use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::domain::{Address, IdSequence, RequestId, RequestStatus, TrainingRequest};
use crate::error::{EntityRef, Result, TrustrainError};
use crate::registry::ResourceRegistry;

#[derive(Debug, Clone, Default)]
pub struct RequestLifecycle {
    requests: Vec<TrainingRequest>,
    ids: IdSequence,
}

impl RequestLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted requests (in enumeration order)
    pub fn restore(requests: Vec<TrainingRequest>, ids: IdSequence) -> Result<Self> {
        let mut seen = BTreeSet::new();
        if let Some(dup) = requests.iter().find(|r| !seen.insert(r.id)) {
            return Err(TrustrainError::Persistence(format!("duplicate {}", dup.id)));
        }
        Ok(Self { requests, ids })
    }

    /// Create a `Pending` request addressed to a registered provider
    pub fn submit(
        &mut self,
        requester: &Address,
        provider: &Address,
        model_link: &str,
        dataset_link: &str,
        registry: &ResourceRegistry,
    ) -> Result<RequestId> {
        let entity = EntityRef::Unassigned("request");
        if requester.is_blank() {
            return Err(TrustrainError::invalid_input(entity, "requester address is blank"));
        }
        if model_link.trim().is_empty() {
            return Err(TrustrainError::invalid_input(entity, "model link is blank"));
        }
        if dataset_link.trim().is_empty() {
            return Err(TrustrainError::invalid_input(entity, "dataset link is blank"));
        }
        if !registry.has_owner(provider) {
            warn!("{} submitted a request to unregistered provider {}", requester, provider);
            return Err(TrustrainError::UnknownProvider {
                provider: provider.clone(),
            });
        }

        let id = RequestId(self.ids.next());
        self.requests.push(TrainingRequest::new(
            id,
            requester.clone(),
            provider.clone(),
            model_link.to_string(),
            dataset_link.to_string(),
        ));

        info!("Submitted {} from {} to provider {}", id, requester, provider);
        Ok(id)
    }

    /// Provider accepts or rejects a pending request
    pub fn decide(
        &mut self,
        id: RequestId,
        caller: &Address,
        accept: bool,
    ) -> Result<RequestStatus> {
        self.check_decide(id, caller)?;

        let (target, reason) = if accept {
            (RequestStatus::Accepted, "accepted by provider")
        } else {
            (RequestStatus::Rejected, "rejected by provider")
        };
        self.apply(id, target, reason, "decide")?;

        info!("{} {} by {}", id, target, caller);
        Ok(target)
    }

    /// Validate a `decide` without applying it
    pub fn check_decide(&self, id: RequestId, caller: &Address) -> Result<&TrainingRequest> {
        let request = self.require(id)?;
        if &request.provider != caller {
            warn!("{} attempted to decide {} without being its provider", caller, id);
            return Err(TrustrainError::unauthorized(id, caller));
        }
        if request.status != RequestStatus::Pending {
            return Err(TrustrainError::invalid_state(id, request.status, "decide"));
        }
        Ok(request)
    }

    /// Provider delivers trained weights for an accepted request
    pub fn return_weights(
        &mut self,
        id: RequestId,
        caller: &Address,
        weights_link: &str,
    ) -> Result<()> {
        let request = self.require(id)?;
        if &request.provider != caller {
            warn!(
                "{} attempted to return weights for {} without being its provider",
                caller, id
            );
            return Err(TrustrainError::unauthorized(id, caller));
        }
        if request.status != RequestStatus::Accepted {
            return Err(TrustrainError::invalid_state(id, request.status, "return weights for"));
        }
        if weights_link.trim().is_empty() {
            return Err(TrustrainError::invalid_input(id, "weights link is blank"));
        }

        self.apply(id, RequestStatus::WeightsReturned, "weights returned", "return weights for")?;
        if let Some(request) = self.find_mut(id) {
            request.weights_link = Some(weights_link.to_string());
        }

        info!("{} fulfilled by {}: {}", id, caller, weights_link);
        Ok(())
    }

    /// Validate a `delete` without applying it
    pub fn check_delete(&self, id: RequestId, caller: &Address) -> Result<&TrainingRequest> {
        let request = self.require(id)?;
        if !request.is_party(caller) {
            warn!("{} attempted to delete {} without being a party", caller, id);
            return Err(TrustrainError::unauthorized(id, caller));
        }
        Ok(request)
    }

    /// Remove a request from the active set; allowed in any state
    pub fn delete(&mut self, id: RequestId, caller: &Address) -> Result<TrainingRequest> {
        self.check_delete(id, caller)?;
        let position = self
            .requests
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| TrustrainError::not_found(id))?;

        let removed = self.requests.remove(position);
        info!("Deleted {} ({}) by {}", id, removed.status, caller);
        Ok(removed)
    }

    fn apply(
        &mut self,
        id: RequestId,
        to: RequestStatus,
        reason: &str,
        operation: &'static str,
    ) -> Result<()> {
        let request = self
            .find_mut(id)
            .ok_or_else(|| TrustrainError::not_found(id))?;
        let from = request.status;
        request
            .transition(to, reason)
            .map_err(|_| TrustrainError::invalid_state(id, from, operation))
    }

    fn require(&self, id: RequestId) -> Result<&TrainingRequest> {
        self.get(id).ok_or_else(|| TrustrainError::not_found(id))
    }

    fn find_mut(&mut self, id: RequestId) -> Option<&mut TrainingRequest> {
        self.requests.iter_mut().find(|r| r.id == id)
    }

    pub fn get(&self, id: RequestId) -> Option<&TrainingRequest> {
        self.requests.iter().find(|r| r.id == id)
    }

    /// Active requests in submission order
    pub fn list(&self) -> Vec<TrainingRequest> {
        self.requests.clone()
    }

    /// Requests waiting on `provider`'s decision
    pub fn pending_for(&self, provider: &Address) -> Vec<TrainingRequest> {
        self.filtered(|r| r.status == RequestStatus::Pending && &r.provider == provider)
    }

    pub fn submitted_by(&self, requester: &Address) -> Vec<TrainingRequest> {
        self.filtered(|r| &r.requester == requester)
    }

    pub fn assigned_to(&self, provider: &Address) -> Vec<TrainingRequest> {
        self.filtered(|r| &r.provider == provider)
    }

    pub fn with_status(&self, status: RequestStatus) -> Vec<TrainingRequest> {
        self.filtered(|r| r.status == status)
    }

    fn filtered(&self, keep: impl Fn(&TrainingRequest) -> bool) -> Vec<TrainingRequest> {
        self.requests.iter().filter(|r| keep(*r)).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn id_sequence(&self) -> IdSequence {
        self.ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewOffer, StorageType};
    use crate::error::ErrorKind;

    fn provider() -> Address {
        Address::from("0xprovider")
    }

    fn trainer() -> Address {
        Address::from("0xtrainer")
    }

    fn registry() -> ResourceRegistry {
        let mut registry = ResourceRegistry::new();
        registry
            .register(
                &provider(),
                NewOffer {
                    cpu: "Xeon".to_string(),
                    gpu: "RTX 4090".to_string(),
                    ram_gb: 16,
                    storage_gb: 100,
                    storage_type: StorageType::Ssd,
                    is_external: true,
                },
            )
            .unwrap();
        registry
    }

    fn submitted() -> (RequestLifecycle, RequestId) {
        let mut lifecycle = RequestLifecycle::new();
        let id = lifecycle
            .submit(&trainer(), &provider(), "ipfs://m1", "ipfs://d1", &registry())
            .unwrap();
        (lifecycle, id)
    }

    #[test]
    fn test_submit_requires_registered_provider() {
        let mut lifecycle = RequestLifecycle::new();
        let err = lifecycle
            .submit(
                &trainer(),
                &Address::from("0xghost"),
                "ipfs://m1",
                "ipfs://d1",
                &registry(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownProvider);
        assert!(lifecycle.is_empty());
    }

    #[test]
    fn test_submit_rejects_blank_links() {
        let mut lifecycle = RequestLifecycle::new();
        let err = lifecycle
            .submit(&trainer(), &provider(), "", "ipfs://d1", &registry())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_happy_path() {
        let (mut lifecycle, id) = submitted();
        assert_eq!(lifecycle.get(id).unwrap().status, RequestStatus::Pending);

        lifecycle.decide(id, &provider(), true).unwrap();
        assert_eq!(lifecycle.get(id).unwrap().status, RequestStatus::Accepted);

        lifecycle.return_weights(id, &provider(), "ipfs://w1").unwrap();
        let request = lifecycle.get(id).unwrap();
        assert_eq!(request.status, RequestStatus::WeightsReturned);
        assert_eq!(request.weights_link.as_deref(), Some("ipfs://w1"));
    }

    #[test]
    fn test_only_provider_decides() {
        let (mut lifecycle, id) = submitted();
        let err = lifecycle.decide(id, &trainer(), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(lifecycle.get(id).unwrap().status, RequestStatus::Pending);
    }

    #[test]
    fn test_second_decide_is_invalid_state() {
        let (mut lifecycle, id) = submitted();
        lifecycle.decide(id, &provider(), false).unwrap();

        let err = lifecycle.decide(id, &provider(), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(lifecycle.get(id).unwrap().status, RequestStatus::Rejected);
    }

    #[test]
    fn test_weights_require_acceptance() {
        let (mut lifecycle, id) = submitted();
        let err = lifecycle
            .return_weights(id, &provider(), "ipfs://w1")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        lifecycle.decide(id, &provider(), false).unwrap();
        let err = lifecycle
            .return_weights(id, &provider(), "ipfs://w1")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(lifecycle.get(id).unwrap().weights_link.is_none());
    }

    #[test]
    fn test_only_provider_returns_weights() {
        let (mut lifecycle, id) = submitted();
        lifecycle.decide(id, &provider(), true).unwrap();

        let err = lifecycle
            .return_weights(id, &trainer(), "ipfs://w1")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_history_is_a_legal_prefix() {
        use RequestStatus::*;

        let (mut lifecycle, accepted) = submitted();
        let rejected = lifecycle
            .submit(&trainer(), &provider(), "ipfs://m2", "ipfs://d2", &registry())
            .unwrap();

        lifecycle.decide(accepted, &provider(), true).unwrap();
        let _ = lifecycle.decide(accepted, &provider(), false);
        lifecycle.return_weights(accepted, &provider(), "ipfs://w").unwrap();
        lifecycle.decide(rejected, &provider(), false).unwrap();
        let _ = lifecycle.return_weights(rejected, &provider(), "ipfs://w");

        let forward = [Pending, Accepted, WeightsReturned];
        let declined = [Pending, Rejected];
        for request in lifecycle.list() {
            let trail = request.status_trail();
            assert!(
                forward.starts_with(&trail) || declined.starts_with(&trail),
                "unexpected trail {:?}",
                trail
            );
        }
    }

    #[test]
    fn test_delete_by_either_party_in_any_state() {
        let (mut lifecycle, id) = submitted();
        let err = lifecycle.delete(id, &Address::from("0xstranger")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        lifecycle.decide(id, &provider(), true).unwrap();
        let removed = lifecycle.delete(id, &trainer()).unwrap();
        assert_eq!(removed.status, RequestStatus::Accepted);
        assert!(lifecycle.get(id).is_none());

        let err = lifecycle.delete(id, &trainer()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_pending_for_filters_by_provider_and_status() {
        let (mut lifecycle, first) = submitted();
        let second = lifecycle
            .submit(&trainer(), &provider(), "ipfs://m2", "ipfs://d2", &registry())
            .unwrap();
        lifecycle.decide(first, &provider(), true).unwrap();

        let pending: Vec<_> = lifecycle
            .pending_for(&provider())
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(pending, vec![second]);
        assert!(lifecycle.pending_for(&trainer()).is_empty());
        assert_eq!(lifecycle.submitted_by(&trainer()).len(), 2);
    }
}
