//! Output formatting for `trustrain` commands.
//!
//! Supports two modes: human-readable tables (default) and JSON (--json).

use serde::Serialize;
use tabled::{Table, Tabled};

use crate::domain::{DatasetListing, EscrowEntry, ResourceOffer, TrainingRequest};

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

/// Print a vec of Tabled + Serialize items in the chosen mode.
pub fn print_items<T: Tabled + Serialize>(items: &[T], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if items.is_empty() {
                println!("(no results)");
            } else {
                let table = Table::new(items).to_string();
                println!("{table}");
            }
        }
        OutputMode::Json => {
            let json = serde_json::to_string_pretty(items)?;
            println!("{json}");
        }
    }
    Ok(())
}

/// Print one row; a single JSON object rather than an array in JSON mode.
pub fn print_row<T: Tabled + Serialize>(item: &T, mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => print_items(std::slice::from_ref(item), mode),
        OutputMode::Json => print_item(item),
    }
}

/// Print a single Serialize item as pretty JSON.
pub fn print_item<T: Serialize>(item: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(item)?);
    Ok(())
}

/// Print a success message. Suppressed in JSON mode so stdout stays parseable.
pub fn print_success(msg: &str, mode: OutputMode) {
    if mode == OutputMode::Table {
        println!("\x1b[32m{msg}\x1b[0m");
    }
}

/// Print a warning message.
pub fn print_warn(msg: &str) {
    eprintln!("\x1b[33m{msg}\x1b[0m");
}

#[derive(Debug, Serialize, Tabled)]
pub struct OfferRow {
    pub id: u64,
    pub owner: String,
    pub cpu: String,
    pub gpu: String,
    pub ram_gb: u64,
    pub storage: String,
    pub external: bool,
}

impl From<&ResourceOffer> for OfferRow {
    fn from(offer: &ResourceOffer) -> Self {
        Self {
            id: offer.id.value(),
            owner: offer.owner.to_string(),
            cpu: offer.cpu.clone(),
            gpu: offer.gpu.clone(),
            ram_gb: offer.ram_gb,
            storage: format!("{} GB {}", offer.storage_gb, offer.storage_type),
            external: offer.is_external,
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct DatasetRow {
    pub id: u64,
    pub owner: String,
    pub description: String,
    pub price: String,
    /// Paid links are only revealed through `dataset access`
    pub link: String,
}

impl From<&DatasetListing> for DatasetRow {
    fn from(listing: &DatasetListing) -> Self {
        let (price, link) = match listing.access_price() {
            None => ("free".to_string(), listing.content_link.clone()),
            Some(price) => (price.to_string(), "(paid)".to_string()),
        };
        Self {
            id: listing.id.value(),
            owner: listing.owner.to_string(),
            description: listing.description.clone(),
            price,
            link,
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct RequestRow {
    pub id: u64,
    pub requester: String,
    pub provider: String,
    pub status: String,
    pub model: String,
    pub dataset: String,
    pub weights: String,
}

impl From<&TrainingRequest> for RequestRow {
    fn from(request: &TrainingRequest) -> Self {
        Self {
            id: request.id.value(),
            requester: request.requester.to_string(),
            provider: request.provider.to_string(),
            status: request.status.to_string(),
            model: request.model_link.clone(),
            dataset: request.dataset_link.clone(),
            weights: request.weights_link.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct HistoryRow {
    pub at: String,
    pub from: String,
    pub to: String,
    pub reason: String,
}

#[derive(Debug, Serialize, Tabled)]
pub struct EscrowRow {
    pub context: String,
    pub payer: String,
    pub payee: String,
    pub amount: u64,
    pub state: String,
    pub reference: String,
}

impl From<&EscrowEntry> for EscrowRow {
    fn from(entry: &EscrowEntry) -> Self {
        Self {
            context: entry.context.to_string(),
            payer: entry.payer.to_string(),
            payee: entry.payee.to_string(),
            amount: entry.amount_owed,
            state: if entry.settled { "SETTLED" } else { "OPEN" }.to_string(),
            reference: entry.settlement_ref.clone().unwrap_or_default(),
        }
    }
}

pub fn rows<'a, S: 'a, R: From<&'a S>>(items: &'a [S]) -> Vec<R> {
    items.iter().map(R::from).collect()
}
