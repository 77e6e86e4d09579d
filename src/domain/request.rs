use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Address, RequestId};

/// Training request state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Submitted, waiting for the provider's decision
    Pending,
    /// Provider agreed to train
    Accepted,
    /// Provider delivered trained weights
    WeightsReturned,
    /// Provider declined
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Accepted => "ACCEPTED",
            RequestStatus::WeightsReturned => "WEIGHTS_RETURNED",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: RequestStatus) -> bool {
        use RequestStatus::*;

        match (self, target) {
            (Pending, Accepted) => true,
            (Pending, Rejected) => true,
            (Accepted, WeightsReturned) => true,
            _ => false,
        }
    }

    /// Get valid next states from current state
    pub fn valid_transitions(&self) -> Vec<RequestStatus> {
        use RequestStatus::*;

        match self {
            Pending => vec![Accepted, Rejected],
            Accepted => vec![WeightsReturned],
            WeightsReturned | Rejected => vec![],
        }
    }

    /// No further caller-driven transition exists
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::WeightsReturned | RequestStatus::Rejected)
    }

    /// The provider has committed to the engagement
    pub fn is_engaged(&self) -> bool {
        matches!(self, RequestStatus::Accepted | RequestStatus::WeightsReturned)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for RequestStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(RequestStatus::Pending),
            "ACCEPTED" => Ok(RequestStatus::Accepted),
            "WEIGHTS_RETURNED" => Ok(RequestStatus::WeightsReturned),
            "REJECTED" => Ok(RequestStatus::Rejected),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

/// One applied status change, kept for audit and replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// `None` for the initial `Pending` entry
    pub from: Option<RequestStatus>,
    pub to: RequestStatus,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl StatusChange {
    pub fn initial(reason: impl Into<String>) -> Self {
        Self {
            from: None,
            to: RequestStatus::Pending,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn new(from: RequestStatus, to: RequestStatus, reason: impl Into<String>) -> Self {
        Self {
            from: Some(from),
            to,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A training engagement between a requester and a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub id: RequestId,
    pub requester: Address,
    pub provider: Address,
    pub model_link: String,
    pub dataset_link: String,
    pub status: RequestStatus,
    /// Set only by fulfillment
    pub weights_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub history: Vec<StatusChange>,
}

impl TrainingRequest {
    pub fn new(
        id: RequestId,
        requester: Address,
        provider: Address,
        model_link: String,
        dataset_link: String,
    ) -> Self {
        Self {
            id,
            requester,
            provider,
            model_link,
            dataset_link,
            status: RequestStatus::Pending,
            weights_link: None,
            created_at: Utc::now(),
            history: vec![StatusChange::initial("submitted")],
        }
    }

    pub fn is_party(&self, caller: &Address) -> bool {
        &self.requester == caller || &self.provider == caller
    }

    /// Observed status sequence, starting with `Pending`
    pub fn status_trail(&self) -> Vec<RequestStatus> {
        self.history.iter().map(|change| change.to).collect()
    }

    /// Apply a status change if the state machine allows it.
    ///
    /// Returns the rejected target on an illegal transition; nothing is
    /// mutated in that case.
    pub(crate) fn transition(
        &mut self,
        to: RequestStatus,
        reason: impl Into<String>,
    ) -> Result<(), RequestStatus> {
        if !self.status.can_transition_to(to) {
            return Err(to);
        }
        self.history.push(StatusChange::new(self.status, to, reason));
        self.status = to;
        Ok(())
    }
}
