//! Dataset Catalog
//!
//! Free and priced dataset listings plus the access check that gates paid
//! content behind a settled escrow obligation.

use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::domain::{
    AccessResult, Address, ContextId, DatasetId, DatasetListing, EscrowStatus, IdSequence,
    NewListing,
};
use crate::error::{EntityRef, Result, TrustrainError};
use crate::escrow::EscrowLedger;

#[derive(Debug, Clone, Default)]
pub struct DatasetCatalog {
    listings: Vec<DatasetListing>,
    ids: IdSequence,
}

impl DatasetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted listings (in enumeration order)
    pub fn restore(listings: Vec<DatasetListing>, ids: IdSequence) -> Result<Self> {
        let mut seen = BTreeSet::new();
        if let Some(dup) = listings.iter().find(|l| !seen.insert(l.id)) {
            return Err(TrustrainError::Persistence(format!("duplicate {}", dup.id)));
        }
        Ok(Self { listings, ids })
    }

    pub fn publish(&mut self, owner: &Address, listing: NewListing) -> Result<DatasetId> {
        let entity = EntityRef::Unassigned("dataset");
        if owner.is_blank() {
            return Err(TrustrainError::invalid_input(entity, "owner address is blank"));
        }
        if listing.description.trim().is_empty() {
            return Err(TrustrainError::invalid_input(entity, "description is blank"));
        }
        if listing.content_link.trim().is_empty() {
            return Err(TrustrainError::invalid_input(entity, "content link is blank"));
        }
        if !listing.free && listing.price == 0 {
            return Err(TrustrainError::invalid_input(
                entity,
                "paid dataset requires a positive price",
            ));
        }

        let id = DatasetId(self.ids.next());
        let free = listing.free;
        let price = listing.price;
        self.listings
            .push(DatasetListing::from_new(id, owner.clone(), listing));

        if free {
            info!("Published free {} by {}", id, owner);
        } else {
            info!("Published {} by {} at price {}", id, owner, price);
        }
        Ok(id)
    }

    pub fn list(&self) -> Vec<DatasetListing> {
        self.listings.clone()
    }

    pub fn get(&self, id: DatasetId) -> Option<&DatasetListing> {
        self.listings.iter().find(|l| l.id == id)
    }

    /// Owner-initiated delete. Access obligations already opened against
    /// the listing stay in the ledger.
    pub fn withdraw(&mut self, id: DatasetId, caller: &Address) -> Result<DatasetListing> {
        let position = self
            .listings
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| TrustrainError::not_found(id))?;

        if &self.listings[position].owner != caller {
            warn!("{} attempted to withdraw {} owned by someone else", caller, id);
            return Err(TrustrainError::unauthorized(id, caller));
        }

        let removed = self.listings.remove(position);
        info!("Withdrew {} (owner {})", id, removed.owner);
        Ok(removed)
    }

    /// Check or establish access to a listing for `requester`.
    ///
    /// Free listings and the owner's own listings are granted outright.
    /// Paid listings open one obligation per requester and grant access
    /// only once that obligation is settled; repeated calls while it is
    /// open return the same pending obligation.
    pub fn request_access(
        &self,
        id: DatasetId,
        requester: &Address,
        ledger: &mut EscrowLedger,
    ) -> Result<AccessResult> {
        if requester.is_blank() {
            return Err(TrustrainError::invalid_input(id, "requester address is blank"));
        }
        let listing = self.get(id).ok_or_else(|| TrustrainError::not_found(id))?;

        let granted = || AccessResult::Granted {
            content_link: listing.content_link.clone(),
        };

        let price = match listing.access_price() {
            None => {
                debug!("{} is free, granting {}", id, requester);
                return Ok(granted());
            }
            Some(_) if &listing.owner == requester => return Ok(granted()),
            Some(price) => price,
        };

        let context = ContextId::dataset_access(id, requester.clone());
        match ledger.status(&context) {
            EscrowStatus::Settled { .. } => {
                debug!("{} paid for {}, granting", requester, id);
                Ok(granted())
            }
            EscrowStatus::Open { amount_owed } => Ok(AccessResult::PendingPayment {
                context,
                amount_owed,
            }),
            EscrowStatus::NoObligation => {
                let entry = ledger.open(requester, &listing.owner, context, price)?;
                Ok(AccessResult::PendingPayment {
                    context: entry.context,
                    amount_owed: entry.amount_owed,
                })
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    pub fn id_sequence(&self) -> IdSequence {
        self.ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn owner() -> Address {
        Address::from("0xowner")
    }

    fn reader() -> Address {
        Address::from("0xreader")
    }

    #[test]
    fn test_paid_listing_requires_price() {
        let mut catalog = DatasetCatalog::new();
        let err = catalog
            .publish(&owner(), NewListing::paid("cifar", "ipfs://cifar", 0))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_free_listing_with_zero_price_is_fine() {
        let mut catalog = DatasetCatalog::new();
        assert!(catalog
            .publish(&owner(), NewListing::free("cifar", "ipfs://cifar"))
            .is_ok());
    }

    #[test]
    fn test_blank_requester_opens_nothing() {
        let mut catalog = DatasetCatalog::new();
        let mut ledger = EscrowLedger::new();
        let id = catalog
            .publish(&owner(), NewListing::paid("cifar", "ipfs://cifar", 4))
            .unwrap();

        for blank in ["", "  "] {
            let err = catalog
                .request_access(id, &Address::from(blank), &mut ledger)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_free_access_creates_no_escrow() {
        let mut catalog = DatasetCatalog::new();
        let mut ledger = EscrowLedger::new();
        let id = catalog
            .publish(&owner(), NewListing::free("cifar", "ipfs://cifar"))
            .unwrap();

        for _ in 0..3 {
            let result = catalog.request_access(id, &reader(), &mut ledger).unwrap();
            assert_eq!(
                result,
                AccessResult::Granted {
                    content_link: "ipfs://cifar".to_string()
                }
            );
        }
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_paid_access_opens_single_obligation() {
        let mut catalog = DatasetCatalog::new();
        let mut ledger = EscrowLedger::new();
        let id = catalog
            .publish(&owner(), NewListing::paid("imagenet", "ipfs://inet", 10))
            .unwrap();

        let first = catalog.request_access(id, &reader(), &mut ledger).unwrap();
        let expected_ctx = ContextId::dataset_access(id, reader());
        assert_eq!(
            first,
            AccessResult::PendingPayment {
                context: expected_ctx.clone(),
                amount_owed: 10
            }
        );

        let entry = ledger.get(&expected_ctx).unwrap();
        assert_eq!(entry.payer, reader());
        assert_eq!(entry.payee, owner());
        assert_eq!(entry.amount_owed, 10);
        assert!(!entry.settled);

        let second = catalog.request_access(id, &reader(), &mut ledger).unwrap();
        assert_eq!(second, first);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_paid_access_granted_after_settlement() {
        let mut catalog = DatasetCatalog::new();
        let mut ledger = EscrowLedger::new();
        let id = catalog
            .publish(&owner(), NewListing::paid("imagenet", "ipfs://inet", 10))
            .unwrap();

        catalog.request_access(id, &reader(), &mut ledger).unwrap();
        ledger
            .mark_settled(&ContextId::dataset_access(id, reader()), 10, None)
            .unwrap();

        let result = catalog.request_access(id, &reader(), &mut ledger).unwrap();
        assert!(result.is_granted());
    }

    #[test]
    fn test_owner_reads_own_paid_listing() {
        let mut catalog = DatasetCatalog::new();
        let mut ledger = EscrowLedger::new();
        let id = catalog
            .publish(&owner(), NewListing::paid("imagenet", "ipfs://inet", 10))
            .unwrap();

        assert!(catalog
            .request_access(id, &owner(), &mut ledger)
            .unwrap()
            .is_granted());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_withdraw_requires_owner() {
        let mut catalog = DatasetCatalog::new();
        let id = catalog
            .publish(&owner(), NewListing::free("cifar", "ipfs://cifar"))
            .unwrap();

        let err = catalog.withdraw(id, &reader()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(catalog.len(), 1);

        catalog.withdraw(id, &owner()).unwrap();
        assert!(catalog.get(id).is_none());

        let err = catalog.withdraw(id, &owner()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_access_to_missing_listing() {
        let catalog = DatasetCatalog::new();
        let mut ledger = EscrowLedger::new();
        let err = catalog
            .request_access(DatasetId(4), &reader(), &mut ledger)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
