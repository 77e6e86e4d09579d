//! `trustrain offer`: provider resource offers.

use clap::Subcommand;

use super::output::{self, OfferRow};
use super::Session;
use crate::domain::{Address, NewOffer, OfferId, StorageType};

#[derive(Subcommand, Debug, Clone)]
pub enum OfferCommands {
    /// Register compute/storage capacity as the --as address.
    Register {
        #[arg(long)]
        cpu: String,
        #[arg(long)]
        gpu: String,
        #[arg(long)]
        ram_gb: u64,
        #[arg(long)]
        storage_gb: u64,
        /// ssd or hdd
        #[arg(long, default_value = "ssd")]
        storage_type: StorageType,
        /// Capacity hosted outside the provider's own machine.
        #[arg(long)]
        external: bool,
    },
    /// List registered offers in registration order.
    List {
        /// Only offers owned by this address.
        #[arg(long)]
        owner: Option<String>,
    },
    /// Remove one of your offers.
    Remove { id: u64 },
}

impl OfferCommands {
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::Register { .. } | Self::Remove { .. })
    }
}

pub async fn run(cmd: OfferCommands, session: &Session) -> anyhow::Result<()> {
    let engine = &session.engine;
    let mode = session.mode;

    match cmd {
        OfferCommands::Register {
            cpu,
            gpu,
            ram_gb,
            storage_gb,
            storage_type,
            external,
        } => {
            let owner = session.caller()?;
            let offer = NewOffer {
                cpu,
                gpu,
                ram_gb,
                storage_gb,
                storage_type,
                is_external: external,
            };
            let id = engine.register_offer(owner, offer).await?;
            output::print_success(&format!("Registered {}", id), mode);

            let offers = engine.list_offers().await;
            if let Some(offer) = offers.iter().find(|o| o.id == id) {
                output::print_row(&OfferRow::from(offer), mode)?;
            }
        }
        OfferCommands::List { owner } => {
            let offers = match owner {
                Some(owner) => engine.offers_by(&Address::from(owner)).await,
                None => engine.list_offers().await,
            };
            let rows: Vec<OfferRow> = output::rows(&offers);
            output::print_items(&rows, mode)?;
        }
        OfferCommands::Remove { id } => {
            let removed = engine.remove_offer(OfferId(id), session.caller()?).await?;
            output::print_success(&format!("Removed {}", removed.id), mode);
            output::print_row(&OfferRow::from(&removed), mode)?;
        }
    }
    Ok(())
}
