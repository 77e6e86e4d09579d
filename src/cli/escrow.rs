//! `trustrain escrow`: obligations and settlement.

use clap::Subcommand;

use super::output::{self, EscrowRow, OutputMode};
use super::Session;
use crate::coordinator::ManualSettlement;
use crate::domain::{ContextId, RequestId, SettleOutcome};

#[derive(Subcommand, Debug, Clone)]
pub enum EscrowCommands {
    /// Open the training obligation for an accepted request.
    Open {
        request: u64,
        #[arg(long)]
        amount: u64,
    },
    /// Settle an obligation you owe, stating the amount paid.
    Settle {
        /// training:<id> or dataset:<id>:<requester>
        context: ContextId,
        #[arg(long)]
        amount: u64,
    },
    /// Settle an obligation you owe for exactly the amount owed.
    Confirm {
        /// training:<id> or dataset:<id>:<requester>
        context: ContextId,
    },
    /// Settlement state of one context.
    Status {
        /// training:<id> or dataset:<id>:<requester>
        context: ContextId,
    },
    /// List obligations.
    List {
        /// Open obligations you owe.
        #[arg(long, conflicts_with = "owed_to_me")]
        owed_by_me: bool,
        /// Open obligations owed to you.
        #[arg(long)]
        owed_to_me: bool,
    },
    /// Open obligations whose request or listing no longer exists.
    Orphans,
}

impl EscrowCommands {
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Open { .. } | Self::Settle { .. } | Self::Confirm { .. }
        )
    }
}

fn report_outcome(outcome: SettleOutcome, context: &ContextId, mode: OutputMode) {
    match outcome {
        SettleOutcome::Settled => output::print_success(&format!("Settled {}", context), mode),
        SettleOutcome::AlreadySettled => {
            output::print_warn(&format!("{} was already settled", context))
        }
    }
}

pub async fn run(cmd: EscrowCommands, session: &Session) -> anyhow::Result<()> {
    let engine = &session.engine;
    let mode = session.mode;

    match cmd {
        EscrowCommands::Open { request, amount } => {
            let entry = engine
                .open_training_escrow(RequestId(request), session.caller()?, amount)
                .await?;
            output::print_success(&format!("Opened escrow {}", entry.context), mode);
            output::print_row(&EscrowRow::from(&entry), mode)?;
        }
        EscrowCommands::Settle { context, amount } => {
            let outcome = engine.settle(session.caller()?, &context, amount).await?;
            report_outcome(outcome, &context, mode);
            output::print_row(&EscrowRow::from(&engine.escrow_entry(&context).await?), mode)?;
        }
        EscrowCommands::Confirm { context } => {
            let outcome = engine
                .settle_via(&ManualSettlement, session.caller()?, &context)
                .await?;
            report_outcome(outcome, &context, mode);
            output::print_row(&EscrowRow::from(&engine.escrow_entry(&context).await?), mode)?;
        }
        EscrowCommands::Status { context } => {
            let status = engine.escrow_status(&context).await;
            match mode {
                OutputMode::Json => output::print_item(&status)?,
                OutputMode::Table => println!("{}: {}", context, status),
            }
        }
        EscrowCommands::List {
            owed_by_me,
            owed_to_me,
        } => {
            let entries = if owed_by_me {
                engine.owed_by(session.caller()?).await
            } else if owed_to_me {
                engine.owed_to(session.caller()?).await
            } else {
                engine.list_escrow().await
            };
            let rows: Vec<EscrowRow> = output::rows(&entries);
            output::print_items(&rows, mode)?;
        }
        EscrowCommands::Orphans => {
            let entries = engine.orphaned_obligations().await;
            let rows: Vec<EscrowRow> = output::rows(&entries);
            output::print_items(&rows, mode)?;
        }
    }
    Ok(())
}
