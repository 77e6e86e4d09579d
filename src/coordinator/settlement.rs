//! Settlement Gateway
//!
//! Seam to whatever external ledger confirms that an obligation was paid.
//! The engine awaits [`SettlementGateway::confirm`] without holding any
//! lock and applies the receipt afterwards.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::domain::{EscrowEntry, SettlementReceipt};
use crate::error::Result;

/// Confirms payment of an open escrow entry
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    /// Confirm payment for `entry`.
    ///
    /// The receipt's amount is checked against the amount owed; a mismatch
    /// leaves the entry open.
    async fn confirm(&self, entry: &EscrowEntry) -> Result<SettlementReceipt>;
}

/// Gateway for payments attested by the caller out of band
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualSettlement;

#[async_trait]
impl SettlementGateway for ManualSettlement {
    async fn confirm(&self, entry: &EscrowEntry) -> Result<SettlementReceipt> {
        let reference = format!("manual-{}", Uuid::new_v4());
        info!(
            "Manual settlement attested by {} for {}: {}",
            entry.payer, entry.context, reference
        );
        Ok(SettlementReceipt {
            confirmed_amount: entry.amount_owed,
            reference,
        })
    }
}
