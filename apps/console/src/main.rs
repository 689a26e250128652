mod config;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    Action, JsonRpcGateway, PhaseTransition, ResolvedRole, SessionCoordinator, ViewModel,
};
use config::load_settings;
use serde_json::json;
use shared::{
    domain::{Address, ProposalId},
    protocol::WriteCall,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "voting-console", about = "Inspect and drive a voting contract")]
struct Cli {
    /// Wallet address the session acts as.
    #[arg(long, global = true)]
    address: Option<Address>,
    #[arg(long, global = true)]
    rpc_url: Option<String>,
    #[arg(long, global = true)]
    contract: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Role, workflow phase and permitted actions.
    Status,
    /// Contract events, newest block first.
    Timeline,
    Voter {
        voter: Address,
    },
    Proposal {
        id: u64,
    },
    Winner,
    AddVoter {
        voter: Address,
    },
    AddProposal {
        description: String,
    },
    Vote {
        proposal_id: u64,
    },
    /// Moves the workflow to its next phase.
    Advance {
        #[arg(long)]
        batch_size: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(rpc_url) = cli.rpc_url {
        settings.rpc_url = rpc_url;
    }
    if let Some(contract) = cli.contract {
        settings.contract_address = Some(contract);
    }

    let gateway = Arc::new(JsonRpcGateway::new(settings.gateway_config()?)?);
    info!(
        rpc_url = %settings.rpc_url,
        contract = %gateway.contract_address(),
        "voting console starting"
    );
    let session = SessionCoordinator::new(gateway, settings.from_block);
    let view = session.connect(cli.address).await;

    match cli.command {
        Command::Status => print_json(&status(&view)),
        Command::Timeline => {
            if let Some(err) = &view.errors.events {
                bail!("timeline unavailable: {err}");
            }
            print_json(&view.timeline)
        }
        Command::Voter { voter } => {
            require(&view, Action::LookupVoter)?;
            let record = session
                .lookup_voter(voter)
                .await
                .with_context(|| format!("failed to read voter {voter}"))?;
            print_json(&record)
        }
        Command::Proposal { id } => {
            require(&view, Action::LookupProposal)?;
            let proposal = session
                .lookup_proposal(ProposalId(id))
                .await
                .with_context(|| format!("failed to read proposal {id}"))?;
            print_json(&json!({ "id": id, "proposal": proposal }))
        }
        Command::Winner => {
            let winner = session
                .winning_proposal()
                .await
                .context("failed to read winning proposal")?;
            print_json(&winner)
        }
        Command::AddVoter { voter } => submit(&session, WriteCall::AddVoter { voter }).await,
        Command::AddProposal { description } => {
            submit(&session, WriteCall::AddProposal { description }).await
        }
        Command::Vote { proposal_id } => {
            submit(
                &session,
                WriteCall::SetVote {
                    proposal_id: ProposalId(proposal_id),
                },
            )
            .await
        }
        Command::Advance { batch_size } => {
            let Some(phase) = view.phase else {
                bail!("workflow phase is unknown; cannot pick a transition");
            };
            let Some(transition) = PhaseTransition::from_phase(phase) else {
                bail!("votes are already tallied; no further transition");
            };
            let call = transition.write_call(batch_size.unwrap_or(settings.tally_batch_size));
            info!(transition = transition.label(), "advancing workflow");
            submit(&session, call).await
        }
    }
}

fn status(view: &ViewModel) -> serde_json::Value {
    let role = view.role.as_ref().and_then(ResolvedRole::role);
    json!({
        "address": view.address,
        "role": role,
        "role_description": role.map(|role| role.description()),
        "phase": view.phase,
        "phase_label": view.phase.map(|phase| phase.label()),
        "permitted_actions": view.permitted_actions,
        "errors": view.errors,
    })
}

fn require(view: &ViewModel, action: Action) -> Result<()> {
    if !view.permits(action) {
        bail!("{action:?} is not permitted for this session");
    }
    Ok(())
}

async fn submit(session: &SessionCoordinator, call: WriteCall) -> Result<()> {
    let method = call.method();
    let receipt = session
        .submit(call)
        .await
        .with_context(|| format!("{method} failed"))?;
    let view = session.view_model().await;
    print_json(&json!({
        "receipt": receipt,
        "phase": view.phase,
        "permitted_actions": view.permitted_actions,
    }))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
