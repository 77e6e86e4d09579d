use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} #{}", $label, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

entity_id!(
    /// Stable identifier of a registered resource offer
    OfferId,
    "offer"
);
entity_id!(
    /// Stable identifier of a dataset listing
    DatasetId,
    "dataset"
);
entity_id!(
    /// Stable identifier of a training request
    RequestId,
    "request"
);

/// Opaque participant identity supplied by the wallet/identity layer.
///
/// Comparison is exact; no normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for Address {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// The engagement an escrow obligation is attached to.
///
/// This is a weak reference: the ledger never owns the request or listing
/// it points at, and the target may be deleted while the entry survives.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextId {
    /// Payment for a training engagement
    Training { request: RequestId },
    /// Paid access to one listing by one requester
    DatasetAccess {
        dataset: DatasetId,
        requester: Address,
    },
}

impl ContextId {
    pub fn training(request: RequestId) -> Self {
        ContextId::Training { request }
    }

    pub fn dataset_access(dataset: DatasetId, requester: Address) -> Self {
        ContextId::DatasetAccess { dataset, requester }
    }

    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            ContextId::Training { request } => Some(*request),
            ContextId::DatasetAccess { .. } => None,
        }
    }

    pub fn dataset_id(&self) -> Option<DatasetId> {
        match self {
            ContextId::Training { .. } => None,
            ContextId::DatasetAccess { dataset, .. } => Some(*dataset),
        }
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextId::Training { request } => write!(f, "training:{}", request.0),
            ContextId::DatasetAccess { dataset, requester } => {
                write!(f, "dataset:{}:{}", dataset.0, requester)
            }
        }
    }
}

impl FromStr for ContextId {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        // Only the prefix and id are trimmed; the requester is kept verbatim
        let raw = raw.trim_start();
        let parse_id = |s: &str| {
            s.trim()
                .parse::<u64>()
                .map_err(|_| format!("Invalid id '{}' in context '{}'", s, raw))
        };

        match raw.split_once(':') {
            Some(("training", id)) => Ok(ContextId::training(RequestId(parse_id(id)?))),
            Some(("dataset", rest)) => {
                // Requester addresses may themselves contain ':'
                let (id, requester) = rest
                    .split_once(':')
                    .ok_or_else(|| format!("Missing requester in context '{}'", raw))?;
                if requester.trim().is_empty() {
                    return Err(format!("Missing requester in context '{}'", raw));
                }
                Ok(ContextId::dataset_access(
                    DatasetId(parse_id(id)?),
                    Address::from(requester),
                ))
            }
            _ => Err(format!(
                "Unknown context '{}': expected training:<id> or dataset:<id>:<requester>",
                raw
            )),
        }
    }
}

/// Monotonic id allocator; ids start at 1 and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdSequence(u64);

impl IdSequence {
    pub fn new() -> Self {
        Self(0)
    }

    /// Resume after the highest id already issued
    pub fn resume_after(last_issued: u64) -> Self {
        Self(last_issued)
    }

    pub fn next(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }

    pub fn last_issued(&self) -> u64 {
        self.0
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_round_trips_through_display() {
        let training = ContextId::training(RequestId(7));
        assert_eq!(training.to_string(), "training:7");
        assert_eq!("training:7".parse::<ContextId>().unwrap(), training);

        let access = ContextId::dataset_access(DatasetId(3), Address::from("0xabc"));
        assert_eq!(access.to_string(), "dataset:3:0xabc");
        assert_eq!("dataset:3:0xabc".parse::<ContextId>().unwrap(), access);
    }

    #[test]
    fn test_context_keeps_requester_whitespace() {
        let access = ContextId::dataset_access(DatasetId(5), Address::from("0xabc "));
        assert_eq!(access.to_string().parse::<ContextId>().unwrap(), access);
        assert_eq!(" training:7 ".parse::<ContextId>().unwrap(), ContextId::training(RequestId(7)));
    }

    #[test]
    fn test_context_requester_may_contain_colon() {
        let parsed: ContextId = "dataset:2:did:key:z6Mk".parse().unwrap();
        assert_eq!(
            parsed,
            ContextId::dataset_access(DatasetId(2), Address::from("did:key:z6Mk"))
        );
    }

    #[test]
    fn test_context_rejects_garbage() {
        assert!("escrow:1".parse::<ContextId>().is_err());
        assert!("training:abc".parse::<ContextId>().is_err());
        assert!("dataset:4".parse::<ContextId>().is_err());
        assert!("dataset:4:".parse::<ContextId>().is_err());
    }

    #[test]
    fn test_id_sequence_is_monotonic() {
        let mut seq = IdSequence::new();
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);

        let mut resumed = IdSequence::resume_after(seq.last_issued());
        assert_eq!(resumed.next(), 3);
    }

    #[test]
    fn test_id_display_names_entity() {
        assert_eq!(OfferId(4).to_string(), "offer #4");
        assert_eq!(RequestId(9).to_string(), "request #9");
    }
}
