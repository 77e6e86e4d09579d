//! Coordination Engine
//!
//! Async façade over the registry, catalog, request lifecycle and escrow
//! ledger, plus the settlement seam and the event stream it publishes.

pub mod engine;
pub mod events;
pub mod settlement;

pub use engine::{CoordinationEngine, DeletedRequest, PaymentDue};
pub use events::{EngineEvent, EscrowDisposition};
pub use settlement::{ManualSettlement, SettlementGateway};
