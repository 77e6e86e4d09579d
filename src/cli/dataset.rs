//! `trustrain dataset`: dataset marketplace listings and access.

use clap::Subcommand;

use super::output::{self, DatasetRow, OutputMode};
use super::Session;
use crate::domain::{AccessResult, DatasetId, NewListing};

#[derive(Subcommand, Debug, Clone)]
pub enum DatasetCommands {
    /// Publish a dataset as the --as address.
    Publish {
        #[arg(long)]
        description: String,
        /// Content link (e.g. an IPFS URI)
        #[arg(long)]
        link: String,
        /// Access price; omit for a free listing.
        #[arg(long)]
        price: Option<u64>,
    },
    /// List published datasets.
    List,
    /// Withdraw one of your listings.
    Withdraw { id: u64 },
    /// Request access to a listing; paid listings open an obligation.
    Access { id: u64 },
}

impl DatasetCommands {
    pub fn is_mutating(&self) -> bool {
        // Access may open an escrow obligation
        !matches!(self, Self::List)
    }
}

pub async fn run(cmd: DatasetCommands, session: &Session) -> anyhow::Result<()> {
    let engine = &session.engine;
    let mode = session.mode;

    match cmd {
        DatasetCommands::Publish {
            description,
            link,
            price,
        } => {
            let listing = match price {
                Some(price) => NewListing::paid(description, link, price),
                None => NewListing::free(description, link),
            };
            let id = engine.publish_dataset(session.caller()?, listing).await?;
            output::print_success(&format!("Published {}", id), mode);
        }
        DatasetCommands::List => {
            let listings = engine.list_datasets().await;
            let rows: Vec<DatasetRow> = output::rows(&listings);
            output::print_items(&rows, mode)?;
        }
        DatasetCommands::Withdraw { id } => {
            let removed = engine
                .withdraw_dataset(DatasetId(id), session.caller()?)
                .await?;
            output::print_success(&format!("Withdrew {}", removed.id), mode);
        }
        DatasetCommands::Access { id } => {
            let result = engine
                .request_access(DatasetId(id), session.caller()?)
                .await?;
            match (&result, mode) {
                (_, OutputMode::Json) => output::print_item(&result)?,
                (AccessResult::Granted { content_link }, OutputMode::Table) => {
                    output::print_success("Access granted", mode);
                    println!("{content_link}");
                }
                (
                    AccessResult::PendingPayment {
                        context,
                        amount_owed,
                    },
                    OutputMode::Table,
                ) => {
                    output::print_warn(&format!(
                        "Payment of {} pending; settle with `trustrain escrow settle {} --amount {}`",
                        amount_owed, context, amount_owed
                    ));
                }
            }
        }
    }
    Ok(())
}
