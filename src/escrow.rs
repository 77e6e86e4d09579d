//! Escrow Ledger
//!
//! Tracks what is owed between a payer and a payee for each engagement
//! context, and whether it has been settled. At most one obligation is
//! open per context. A settled entry is never mutated again; reopening its
//! context moves it to the settled history first.

use chrono::Utc;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::{debug, info, warn};

use crate::domain::{Address, ContextId, EscrowEntry, EscrowStatus, SettleOutcome};
use crate::error::{Result, TrustrainError};

#[derive(Debug, Clone, Default)]
pub struct EscrowLedger {
    entries: BTreeMap<ContextId, EscrowEntry>,
    /// Settled entries displaced by a later obligation on the same context
    settled_history: Vec<EscrowEntry>,
}

impl EscrowLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries. Two current entries for one context
    /// mean the snapshot is corrupt.
    pub fn restore(entries: Vec<EscrowEntry>, settled_history: Vec<EscrowEntry>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            match map.entry(entry.context.clone()) {
                Entry::Occupied(_) => {
                    return Err(TrustrainError::Persistence(format!(
                        "duplicate escrow entry for {}",
                        entry.context
                    )));
                }
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                }
            }
        }
        if let Some(entry) = settled_history.iter().find(|e| !e.settled) {
            return Err(TrustrainError::Persistence(format!(
                "unsettled entry for {} in settled history",
                entry.context
            )));
        }

        Ok(Self {
            entries: map,
            settled_history,
        })
    }

    /// Open an obligation for `context`.
    ///
    /// An open entry for the same context is a conflict. A settled one is
    /// moved unchanged to the settled history and replaced.
    pub fn open(
        &mut self,
        payer: &Address,
        payee: &Address,
        context: ContextId,
        amount: u64,
    ) -> Result<EscrowEntry> {
        self.check_can_open(&context, amount)?;

        let entry = EscrowEntry::open(payer.clone(), payee.clone(), context.clone(), amount);
        if let Some(previous) = self.entries.insert(context.clone(), entry.clone()) {
            debug!("Archived settled escrow {} before reopening", context);
            self.settled_history.push(previous);
        }

        info!(
            "Opened escrow {}: {} owes {} to {}",
            context, payer, amount, payee
        );
        Ok(entry)
    }

    /// Validate an `open` without applying it
    pub fn check_can_open(&self, context: &ContextId, amount: u64) -> Result<()> {
        if amount == 0 {
            return Err(TrustrainError::invalid_input(
                context.clone(),
                "escrow amount must be positive",
            ));
        }
        match self.entries.get(context) {
            Some(existing) if existing.is_open() => Err(TrustrainError::conflict(
                context.clone(),
                format!("already has an open obligation of {}", existing.amount_owed),
            )),
            _ => Ok(()),
        }
    }

    /// Mark the obligation for `context` as paid.
    ///
    /// Repeating the call with the same amount after it succeeded is a
    /// no-op success, so at-least-once confirmations are tolerated.
    pub fn mark_settled(
        &mut self,
        context: &ContextId,
        confirmed_amount: u64,
        reference: Option<String>,
    ) -> Result<SettleOutcome> {
        let entry = self
            .entries
            .get_mut(context)
            .ok_or_else(|| TrustrainError::not_found(context.clone()))?;

        if confirmed_amount != entry.amount_owed {
            warn!(
                "Settlement amount mismatch for {}: owed {}, confirmed {}",
                context, entry.amount_owed, confirmed_amount
            );
            return Err(TrustrainError::AmountMismatch {
                context: context.clone(),
                expected: entry.amount_owed,
                confirmed: confirmed_amount,
            });
        }

        if entry.settled {
            debug!("Escrow {} already settled, ignoring repeat", context);
            return Ok(SettleOutcome::AlreadySettled);
        }

        entry.settled = true;
        entry.settled_at = Some(Utc::now());
        entry.settlement_ref = reference;

        info!("Settled escrow {} for {}", context, confirmed_amount);
        Ok(SettleOutcome::Settled)
    }

    /// Remove an unsettled obligation. Settled entries cannot be cancelled.
    pub fn cancel_open(&mut self, context: &ContextId) -> Result<EscrowEntry> {
        match self.entries.get(context) {
            None => Err(TrustrainError::not_found(context.clone())),
            Some(entry) if entry.settled => Err(TrustrainError::invalid_state(
                context.clone(),
                "settled",
                "cancel",
            )),
            Some(_) => {
                let removed = self
                    .entries
                    .remove(context)
                    .ok_or_else(|| TrustrainError::not_found(context.clone()))?;
                info!(
                    "Cancelled open escrow {} ({} owed)",
                    context, removed.amount_owed
                );
                Ok(removed)
            }
        }
    }

    /// `false` both when the entry is open and when no obligation exists;
    /// use [`EscrowLedger::status`] to tell those apart.
    pub fn is_settled(&self, context: &ContextId) -> bool {
        self.entries.get(context).map(|e| e.settled).unwrap_or(false)
    }

    pub fn status(&self, context: &ContextId) -> EscrowStatus {
        match self.entries.get(context) {
            None => EscrowStatus::NoObligation,
            Some(entry) if entry.settled => EscrowStatus::Settled {
                amount: entry.amount_owed,
            },
            Some(entry) => EscrowStatus::Open {
                amount_owed: entry.amount_owed,
            },
        }
    }

    pub fn get(&self, context: &ContextId) -> Option<&EscrowEntry> {
        self.entries.get(context)
    }

    pub fn contains(&self, context: &ContextId) -> bool {
        self.entries.contains_key(context)
    }

    /// Settled entries replaced by a reopened context, oldest first
    pub fn settled_history(&self) -> &[EscrowEntry] {
        &self.settled_history
    }

    /// Current entries ordered by context
    pub fn entries(&self) -> Vec<EscrowEntry> {
        self.entries.values().cloned().collect()
    }

    pub fn open_entries(&self) -> Vec<EscrowEntry> {
        self.entries
            .values()
            .filter(|e| e.is_open())
            .cloned()
            .collect()
    }

    pub fn open_for_payer(&self, payer: &Address) -> Vec<EscrowEntry> {
        self.entries
            .values()
            .filter(|e| e.is_open() && &e.payer == payer)
            .cloned()
            .collect()
    }

    pub fn open_for_payee(&self, payee: &Address) -> Vec<EscrowEntry> {
        self.entries
            .values()
            .filter(|e| e.is_open() && &e.payee == payee)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DatasetId, RequestId};
    use crate::error::ErrorKind;

    fn payer() -> Address {
        Address::from("0xtrainer")
    }

    fn payee() -> Address {
        Address::from("0xprovider")
    }

    fn ctx(id: u64) -> ContextId {
        ContextId::training(RequestId(id))
    }

    #[test]
    fn test_open_rejects_zero_amount() {
        let mut ledger = EscrowLedger::new();
        let err = ledger.open(&payer(), &payee(), ctx(1), 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_open_twice_conflicts() {
        let mut ledger = EscrowLedger::new();
        ledger.open(&payer(), &payee(), ctx(1), 10).unwrap();

        let err = ledger.open(&payer(), &payee(), ctx(1), 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_open_new_context_after_settlement() {
        let mut ledger = EscrowLedger::new();
        ledger.open(&payer(), &payee(), ctx(1), 10).unwrap();
        ledger.mark_settled(&ctx(1), 10, None).unwrap();

        assert!(ledger.open(&payer(), &payee(), ctx(2), 4).is_ok());
    }

    #[test]
    fn test_settled_context_reopens_and_keeps_record() {
        let mut ledger = EscrowLedger::new();
        ledger.open(&payer(), &payee(), ctx(1), 10).unwrap();
        ledger.mark_settled(&ctx(1), 10, Some("tx-1".into())).unwrap();
        let settled = ledger.get(&ctx(1)).unwrap().clone();

        let reopened = ledger.open(&payer(), &payee(), ctx(1), 10).unwrap();
        assert!(!reopened.settled);
        assert_eq!(ledger.status(&ctx(1)), EscrowStatus::Open { amount_owed: 10 });
        assert_eq!(ledger.settled_history(), &[settled]);
        assert_eq!(ledger.len(), 1);

        // Still only one open obligation per context
        let err = ledger.open(&payer(), &payee(), ctx(1), 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(ledger.settled_history().len(), 1);
    }

    #[test]
    fn test_restore_rejects_duplicate_context() {
        let entry = EscrowEntry::open(payer(), payee(), ctx(1), 10);
        let err = EscrowLedger::restore(vec![entry.clone(), entry.clone()], Vec::new()).unwrap_err();
        assert!(matches!(err, TrustrainError::Persistence(_)));

        let err = EscrowLedger::restore(Vec::new(), vec![entry.clone()]).unwrap_err();
        assert!(matches!(err, TrustrainError::Persistence(_)));

        let ledger = EscrowLedger::restore(vec![entry], Vec::new()).unwrap();
        assert_eq!(ledger.status(&ctx(1)), EscrowStatus::Open { amount_owed: 10 });
    }

    #[test]
    fn test_mark_settled_amount_mismatch_keeps_entry_open() {
        let mut ledger = EscrowLedger::new();
        ledger.open(&payer(), &payee(), ctx(1), 10).unwrap();

        let err = ledger.mark_settled(&ctx(1), 5, None).unwrap_err();
        assert!(matches!(
            err,
            TrustrainError::AmountMismatch {
                expected: 10,
                confirmed: 5,
                ..
            }
        ));
        assert!(!ledger.get(&ctx(1)).unwrap().settled);
    }

    #[test]
    fn test_mark_settled_missing_entry() {
        let mut ledger = EscrowLedger::new();
        let err = ledger.mark_settled(&ctx(9), 10, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_mark_settled_is_idempotent() {
        let mut ledger = EscrowLedger::new();
        ledger.open(&payer(), &payee(), ctx(1), 10).unwrap();

        assert_eq!(
            ledger.mark_settled(&ctx(1), 10, Some("tx-1".into())).unwrap(),
            SettleOutcome::Settled
        );
        let settled = ledger.get(&ctx(1)).unwrap().clone();

        assert_eq!(
            ledger.mark_settled(&ctx(1), 10, Some("tx-2".into())).unwrap(),
            SettleOutcome::AlreadySettled
        );
        // The settled entry is never touched again
        assert_eq!(ledger.get(&ctx(1)).unwrap(), &settled);

        let err = ledger.mark_settled(&ctx(1), 11, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmountMismatch);
    }

    #[test]
    fn test_status_distinguishes_absent_from_open() {
        let mut ledger = EscrowLedger::new();
        assert_eq!(ledger.status(&ctx(1)), EscrowStatus::NoObligation);
        assert!(!ledger.is_settled(&ctx(1)));

        ledger.open(&payer(), &payee(), ctx(1), 7).unwrap();
        assert_eq!(ledger.status(&ctx(1)), EscrowStatus::Open { amount_owed: 7 });
        assert!(!ledger.is_settled(&ctx(1)));

        ledger.mark_settled(&ctx(1), 7, None).unwrap();
        assert_eq!(ledger.status(&ctx(1)), EscrowStatus::Settled { amount: 7 });
        assert!(ledger.is_settled(&ctx(1)));
    }

    #[test]
    fn test_cancel_open_only() {
        let mut ledger = EscrowLedger::new();
        ledger.open(&payer(), &payee(), ctx(1), 3).unwrap();
        ledger.open(&payer(), &payee(), ctx(2), 3).unwrap();
        ledger.mark_settled(&ctx(2), 3, None).unwrap();

        assert!(ledger.cancel_open(&ctx(1)).is_ok());
        assert!(!ledger.contains(&ctx(1)));

        let err = ledger.cancel_open(&ctx(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(ledger.contains(&ctx(2)));
    }

    #[test]
    fn test_open_queries_by_party() {
        let mut ledger = EscrowLedger::new();
        let reader = Address::from("0xreader");
        ledger.open(&payer(), &payee(), ctx(1), 3).unwrap();
        ledger
            .open(
                &reader,
                &payee(),
                ContextId::dataset_access(DatasetId(1), reader.clone()),
                8,
            )
            .unwrap();

        assert_eq!(ledger.open_for_payer(&payer()).len(), 1);
        assert_eq!(ledger.open_for_payer(&reader).len(), 1);
        assert_eq!(ledger.open_for_payee(&payee()).len(), 2);
    }
}
