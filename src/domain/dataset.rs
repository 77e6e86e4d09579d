use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Address, ContextId, DatasetId};

/// What an owner submits when publishing a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewListing {
    pub description: String,
    pub content_link: String,
    pub free: bool,
    /// Ignored for access control when `free` is set, kept for audit
    pub price: u64,
}

impl NewListing {
    pub fn free(description: impl Into<String>, content_link: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            content_link: content_link.into(),
            free: true,
            price: 0,
        }
    }

    pub fn paid(
        description: impl Into<String>,
        content_link: impl Into<String>,
        price: u64,
    ) -> Self {
        Self {
            description: description.into(),
            content_link: content_link.into(),
            free: false,
            price,
        }
    }
}

/// A published dataset, immutable after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetListing {
    pub id: DatasetId,
    pub owner: Address,
    pub description: String,
    pub content_link: String,
    pub free: bool,
    pub price: u64,
    pub published_at: DateTime<Utc>,
}

impl DatasetListing {
    pub fn from_new(id: DatasetId, owner: Address, listing: NewListing) -> Self {
        Self {
            id,
            owner,
            description: listing.description,
            content_link: listing.content_link,
            free: listing.free,
            price: listing.price,
            published_at: Utc::now(),
        }
    }

    /// Amount a non-owner must settle before the content link is exposed
    pub fn access_price(&self) -> Option<u64> {
        if self.free {
            None
        } else {
            Some(self.price)
        }
    }
}

/// Outcome of an access request against a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AccessResult {
    /// Content may be fetched
    Granted { content_link: String },
    /// An obligation is open; re-check once it is settled
    PendingPayment { context: ContextId, amount_owed: u64 },
}

impl AccessResult {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessResult::Granted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_price_ignores_price_on_free_listing() {
        let mut new = NewListing::free("mnist", "ipfs://mnist");
        new.price = 42;
        let listing = DatasetListing::from_new(DatasetId(1), Address::from("0xowner"), new);

        assert_eq!(listing.access_price(), None);
        // Retained for audit
        assert_eq!(listing.price, 42);
    }

    #[test]
    fn test_access_price_on_paid_listing() {
        let listing = DatasetListing::from_new(
            DatasetId(2),
            Address::from("0xowner"),
            NewListing::paid("imagenet subset", "ipfs://inet", 10),
        );
        assert_eq!(listing.access_price(), Some(10));
    }
}
