use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Address, OfferId};

/// Storage medium backing an offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StorageType {
    Ssd,
    Hdd,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Ssd => "SSD",
            StorageType::Hdd => "HDD",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SSD" => Ok(StorageType::Ssd),
            "HDD" => Ok(StorageType::Hdd),
            _ => Err(format!("Unknown storage type: {} (expected ssd|hdd)", raw)),
        }
    }
}

/// What a provider submits when registering capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOffer {
    pub cpu: String,
    pub gpu: String,
    pub ram_gb: u64,
    pub storage_gb: u64,
    pub storage_type: StorageType,
    pub is_external: bool,
}

/// A registered unit of shareable compute/storage capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOffer {
    pub id: OfferId,
    pub owner: Address,
    pub cpu: String,
    pub gpu: String,
    pub ram_gb: u64,
    pub storage_gb: u64,
    pub storage_type: StorageType,
    pub is_external: bool,
    pub registered_at: DateTime<Utc>,
}

impl ResourceOffer {
    pub fn from_new(id: OfferId, owner: Address, offer: NewOffer) -> Self {
        Self {
            id,
            owner,
            cpu: offer.cpu,
            gpu: offer.gpu,
            ram_gb: offer.ram_gb,
            storage_gb: offer.storage_gb,
            storage_type: offer.storage_type,
            is_external: offer.is_external,
            registered_at: Utc::now(),
        }
    }

    pub fn is_owned_by(&self, caller: &Address) -> bool {
        &self.owner == caller
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_type_from_str() {
        assert_eq!("ssd".parse::<StorageType>().unwrap(), StorageType::Ssd);
        assert_eq!(" HDD ".parse::<StorageType>().unwrap(), StorageType::Hdd);
        assert!("nvme".parse::<StorageType>().is_err());
    }

    #[test]
    fn test_storage_type_serializes_uppercase() {
        let json = serde_json::to_string(&StorageType::Ssd).unwrap();
        assert_eq!(json, "\"SSD\"");
    }
}
