use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Address, ContextId};

/// An amount owed from payer to payee for one engagement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowEntry {
    pub payer: Address,
    pub payee: Address,
    pub context: ContextId,
    pub amount_owed: u64,
    pub settled: bool,
    pub opened_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    /// Reference handed back by the external confirmation, if any
    pub settlement_ref: Option<String>,
}

impl EscrowEntry {
    pub fn open(payer: Address, payee: Address, context: ContextId, amount_owed: u64) -> Self {
        Self {
            payer,
            payee,
            context,
            amount_owed,
            settled: false,
            opened_at: Utc::now(),
            settled_at: None,
            settlement_ref: None,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.settled
    }
}

/// Settlement state of a context as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EscrowStatus {
    /// Nothing is owed for this context
    NoObligation,
    /// An obligation exists and has not been paid
    Open { amount_owed: u64 },
    /// The obligation has been paid
    Settled { amount: u64 },
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::NoObligation => "NO_OBLIGATION",
            EscrowStatus::Open { .. } => "OPEN",
            EscrowStatus::Settled { .. } => "SETTLED",
        }
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscrowStatus::NoObligation => write!(f, "no obligation"),
            EscrowStatus::Open { amount_owed } => write!(f, "open ({} owed)", amount_owed),
            EscrowStatus::Settled { amount } => write!(f, "settled ({})", amount),
        }
    }
}

/// Result of a successful settlement call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettleOutcome {
    /// This call settled the entry
    Settled,
    /// The entry was already settled for the same amount; nothing changed
    AlreadySettled,
}

/// Confirmation returned by the external settlement layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub confirmed_amount: u64,
    pub reference: String,
}
