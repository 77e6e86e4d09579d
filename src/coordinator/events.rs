use serde::Serialize;
use std::fmt;

use crate::domain::{Address, ContextId, DatasetId, OfferId, RequestId, RequestStatus};

/// What happened to a training request's escrow obligation when the
/// request was deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "escrow", rename_all = "snake_case")]
pub enum EscrowDisposition {
    /// No obligation was ever opened
    None,
    /// The obligation was already settled and stays in the ledger
    SettledKept,
    /// The open obligation stays in the ledger without its request
    Orphaned { amount_owed: u64 },
    /// The open obligation was removed with the request
    Cancelled { amount_owed: u64 },
}

impl fmt::Display for EscrowDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscrowDisposition::None => write!(f, "no escrow obligation"),
            EscrowDisposition::SettledKept => write!(f, "settled escrow kept in the ledger"),
            EscrowDisposition::Orphaned { amount_owed } => {
                write!(f, "escrow of {} still owed, left open without its request", amount_owed)
            }
            EscrowDisposition::Cancelled { amount_owed } => {
                write!(f, "open escrow of {} cancelled", amount_owed)
            }
        }
    }
}

/// Committed state changes, broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    OfferRegistered {
        offer: OfferId,
        owner: Address,
    },
    OfferRemoved {
        offer: OfferId,
        owner: Address,
    },
    DatasetPublished {
        dataset: DatasetId,
        owner: Address,
        free: bool,
    },
    DatasetWithdrawn {
        dataset: DatasetId,
        owner: Address,
    },
    AccessGranted {
        dataset: DatasetId,
        requester: Address,
    },
    AccessPending {
        dataset: DatasetId,
        requester: Address,
        amount_owed: u64,
    },
    RequestSubmitted {
        request: RequestId,
        requester: Address,
        provider: Address,
    },
    RequestDecided {
        request: RequestId,
        status: RequestStatus,
    },
    WeightsReturned {
        request: RequestId,
        weights_link: String,
    },
    RequestDeleted {
        request: RequestId,
        by: Address,
        disposition: EscrowDisposition,
    },
    EscrowOpened {
        context: ContextId,
        payer: Address,
        payee: Address,
        amount: u64,
    },
    EscrowSettled {
        context: ContextId,
        amount: u64,
        reference: Option<String>,
    },
}

impl EngineEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::OfferRegistered { .. } => "offer_registered",
            EngineEvent::OfferRemoved { .. } => "offer_removed",
            EngineEvent::DatasetPublished { .. } => "dataset_published",
            EngineEvent::DatasetWithdrawn { .. } => "dataset_withdrawn",
            EngineEvent::AccessGranted { .. } => "access_granted",
            EngineEvent::AccessPending { .. } => "access_pending",
            EngineEvent::RequestSubmitted { .. } => "request_submitted",
            EngineEvent::RequestDecided { .. } => "request_decided",
            EngineEvent::WeightsReturned { .. } => "weights_returned",
            EngineEvent::RequestDeleted { .. } => "request_deleted",
            EngineEvent::EscrowOpened { .. } => "escrow_opened",
            EngineEvent::EscrowSettled { .. } => "escrow_settled",
        }
    }
}
