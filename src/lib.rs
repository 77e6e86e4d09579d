pub mod catalog;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod escrow;
pub mod lifecycle;
pub mod persistence;
pub mod registry;

pub use catalog::DatasetCatalog;
pub use config::{AppConfig, EngineConfig, EscrowDeletePolicy};
pub use coordinator::{
    CoordinationEngine, DeletedRequest, EngineEvent, EscrowDisposition, ManualSettlement,
    PaymentDue, SettlementGateway,
};
pub use domain::*;
pub use error::{EntityRef, ErrorKind, Result, TrustrainError};
pub use escrow::EscrowLedger;
pub use lifecycle::RequestLifecycle;
pub use persistence::{EngineSnapshot, SnapshotFile};
pub use registry::ResourceRegistry;
