//! `trustrain request`: the training request lifecycle.

use anyhow::anyhow;
use clap::Subcommand;

use super::output::{self, EscrowRow, HistoryRow, OutputMode, RequestRow};
use super::Session;
use crate::coordinator::EscrowDisposition;
use crate::domain::{Address, RequestId, RequestStatus};

#[derive(Subcommand, Debug, Clone)]
pub enum RequestCommands {
    /// Submit a training request to a registered provider.
    Submit {
        #[arg(long)]
        provider: String,
        /// Model link (e.g. an IPFS URI)
        #[arg(long)]
        model: String,
        /// Dataset link (e.g. an IPFS URI)
        #[arg(long)]
        dataset: String,
    },
    /// List requests; filters apply to the --as address.
    List {
        /// Requests waiting on your decision.
        #[arg(long, conflicts_with_all = ["mine", "assigned"])]
        pending: bool,
        /// Requests you submitted.
        #[arg(long, conflicts_with = "assigned")]
        mine: bool,
        /// Requests addressed to you as provider.
        #[arg(long)]
        assigned: bool,
        /// PENDING, ACCEPTED, WEIGHTS_RETURNED or REJECTED
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one request with its status history.
    Show { id: u64 },
    /// Accept a pending request; with --amount also open its escrow.
    Accept {
        id: u64,
        #[arg(long)]
        amount: Option<u64>,
    },
    /// Reject a pending request.
    Reject { id: u64 },
    /// Deliver trained weights for an accepted request.
    Weights { id: u64, link: String },
    /// Delete a request you are party to.
    Delete { id: u64 },
    /// Accepted or fulfilled requests that have no escrow obligation.
    Unescrowed,
    /// Your fulfilled requests that still need to be paid.
    Due,
}

impl RequestCommands {
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Submit { .. }
                | Self::Accept { .. }
                | Self::Reject { .. }
                | Self::Weights { .. }
                | Self::Delete { .. }
        )
    }
}

pub async fn run(cmd: RequestCommands, session: &Session) -> anyhow::Result<()> {
    let engine = &session.engine;
    let mode = session.mode;

    match cmd {
        RequestCommands::Submit {
            provider,
            model,
            dataset,
        } => {
            let id = engine
                .submit_request(session.caller()?, &Address::from(provider), &model, &dataset)
                .await?;
            output::print_success(&format!("Submitted {}", id), mode);
            output::print_row(&RequestRow::from(&engine.get_request(id).await?), mode)?;
        }
        RequestCommands::List {
            pending,
            mine,
            assigned,
            status,
        } => {
            let mut requests = if pending {
                engine.list_pending_for(session.caller()?).await
            } else if mine {
                engine.list_submitted_by(session.caller()?).await
            } else if assigned {
                engine.list_assigned_to(session.caller()?).await
            } else {
                engine.list_requests().await
            };
            if let Some(raw) = status {
                let status = RequestStatus::try_from(raw.as_str()).map_err(|e| anyhow!(e))?;
                requests.retain(|r| r.status == status);
            }
            let rows: Vec<RequestRow> = output::rows(&requests);
            output::print_items(&rows, mode)?;
        }
        RequestCommands::Show { id } => {
            let request = engine.get_request(RequestId(id)).await?;
            match mode {
                OutputMode::Json => output::print_item(&request)?,
                OutputMode::Table => {
                    output::print_row(&RequestRow::from(&request), mode)?;
                    let history: Vec<HistoryRow> = request
                        .history
                        .iter()
                        .map(|change| HistoryRow {
                            at: change.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                            from: change.from.map(|s| s.to_string()).unwrap_or_default(),
                            to: change.to.to_string(),
                            reason: change.reason.clone(),
                        })
                        .collect();
                    output::print_items(&history, mode)?;
                }
            }
        }
        RequestCommands::Accept { id, amount } => {
            let caller = session.caller()?;
            match amount {
                Some(amount) => {
                    let entry = engine
                        .accept_with_escrow(RequestId(id), caller, amount)
                        .await?;
                    output::print_success(
                        &format!("Accepted request #{} with {} in escrow", id, amount),
                        mode,
                    );
                    output::print_row(&EscrowRow::from(&entry), mode)?;
                }
                None => {
                    engine.decide(RequestId(id), caller, true).await?;
                    output::print_success(&format!("Accepted request #{}", id), mode);
                    output::print_warn(&format!(
                        "No escrow opened; run `trustrain escrow open {} --amount <N>`",
                        id
                    ));
                }
            }
        }
        RequestCommands::Reject { id } => {
            engine
                .decide(RequestId(id), session.caller()?, false)
                .await?;
            output::print_success(&format!("Rejected request #{}", id), mode);
        }
        RequestCommands::Weights { id, link } => {
            engine
                .return_weights(RequestId(id), session.caller()?, &link)
                .await?;
            output::print_success(&format!("Weights returned for request #{}", id), mode);
        }
        RequestCommands::Delete { id } => {
            let deleted = engine
                .delete_request(RequestId(id), session.caller()?)
                .await?;
            match mode {
                OutputMode::Json => output::print_item(&deleted)?,
                OutputMode::Table => {
                    output::print_success(&format!("Deleted {}", deleted.request.id), mode);
                    match deleted.disposition {
                        EscrowDisposition::Orphaned { .. } => {
                            output::print_warn(&format!("Warning: {}", deleted.disposition))
                        }
                        disposition => {
                            output::print_success(&format!("Escrow: {}", disposition), mode)
                        }
                    }
                }
            }
        }
        RequestCommands::Unescrowed => {
            let requests = engine.accepted_without_escrow().await;
            let rows: Vec<RequestRow> = output::rows(&requests);
            output::print_items(&rows, mode)?;
        }
        RequestCommands::Due => {
            let due = engine.awaiting_payment(session.caller()?).await;
            let entries: Vec<_> = due.into_iter().map(|d| d.entry).collect();
            let rows: Vec<EscrowRow> = output::rows(&entries);
            output::print_items(&rows, mode)?;
        }
    }
    Ok(())
}
