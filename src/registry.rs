//! Resource Registry
//!
//! Stores provider resource offers in registration order. Offers are
//! addressed by their stable [`OfferId`]; removing one never shifts the
//! identity of the others.

use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::domain::{Address, IdSequence, NewOffer, OfferId, ResourceOffer};
use crate::error::{EntityRef, Result, TrustrainError};

#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    offers: Vec<ResourceOffer>,
    ids: IdSequence,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted offers (in enumeration order)
    pub fn restore(offers: Vec<ResourceOffer>, ids: IdSequence) -> Result<Self> {
        let mut seen = BTreeSet::new();
        if let Some(dup) = offers.iter().find(|o| !seen.insert(o.id)) {
            return Err(TrustrainError::Persistence(format!("duplicate {}", dup.id)));
        }
        Ok(Self { offers, ids })
    }

    /// Register a new offer for `owner`, appended after existing offers
    pub fn register(&mut self, owner: &Address, offer: NewOffer) -> Result<OfferId> {
        Self::validate(owner, &offer)?;

        let id = OfferId(self.ids.next());
        self.offers
            .push(ResourceOffer::from_new(id, owner.clone(), offer));

        info!("Registered {} for provider {}", id, owner);
        Ok(id)
    }

    fn validate(owner: &Address, offer: &NewOffer) -> Result<()> {
        let entity = EntityRef::Unassigned("offer");
        if owner.is_blank() {
            return Err(TrustrainError::invalid_input(entity, "owner address is blank"));
        }
        if offer.cpu.trim().is_empty() {
            return Err(TrustrainError::invalid_input(entity, "cpu descriptor is blank"));
        }
        if offer.gpu.trim().is_empty() {
            return Err(TrustrainError::invalid_input(entity, "gpu descriptor is blank"));
        }
        Ok(())
    }

    /// Current offers in registration order
    pub fn list(&self) -> Vec<ResourceOffer> {
        self.offers.clone()
    }

    pub fn get(&self, id: OfferId) -> Option<&ResourceOffer> {
        self.offers.iter().find(|o| o.id == id)
    }

    pub fn offers_by(&self, owner: &Address) -> Vec<ResourceOffer> {
        self.offers
            .iter()
            .filter(|o| o.is_owned_by(owner))
            .cloned()
            .collect()
    }

    /// Whether `address` currently owns at least one offer
    pub fn has_owner(&self, address: &Address) -> bool {
        self.offers.iter().any(|o| o.is_owned_by(address))
    }

    /// Remove an offer; only its owner may do so
    pub fn remove(&mut self, id: OfferId, caller: &Address) -> Result<ResourceOffer> {
        let position = self
            .offers
            .iter()
            .position(|o| o.id == id)
            .ok_or_else(|| TrustrainError::not_found(id))?;

        if !self.offers[position].is_owned_by(caller) {
            warn!("{} attempted to remove {} owned by someone else", caller, id);
            return Err(TrustrainError::unauthorized(id, caller));
        }

        let removed = self.offers.remove(position);
        info!("Removed {} (provider {})", id, removed.owner);
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }

    pub fn id_sequence(&self) -> IdSequence {
        self.ids
    }
}
