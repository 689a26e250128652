use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{
    domain::{Address, EventRecord, Proposal, ProposalId, VoterRecord, WorkflowPhase},
    error::{
        PartialAggregationError, RejectionReason, RpcError, SubmitError, TransactionRejectedError,
    },
    protocol::{TransactionReceipt, TxHash, WriteCall},
};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::{
    phase_gate::{permitted_actions, winner_available, Action, WinningProposal},
    roles::{ResolvedRole, RoleResolver},
    timeline::EventLogAggregator,
    ContractReader, ContractWriter, EventLogSource, MissingContractWriter,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceLoading {
    pub role: bool,
    pub phase: bool,
    pub events: bool,
}

impl SourceLoading {
    fn all() -> Self {
        Self {
            role: true,
            phase: true,
            events: true,
        }
    }

    pub fn any(&self) -> bool {
        self.role || self.phase || self.events
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceErrors {
    pub role: Vec<RpcError>,
    pub phase: Option<RpcError>,
    pub events: Option<PartialAggregationError>,
}

/// Presentation-ready snapshot. Never mutated once published; every change
/// produces a new `Arc<ViewModel>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewModel {
    pub address: Option<Address>,
    pub generation: u64,
    pub role: Option<ResolvedRole>,
    pub phase: Option<WorkflowPhase>,
    pub permitted_actions: BTreeSet<Action>,
    pub timeline: Vec<EventRecord>,
    pub loading: SourceLoading,
    pub errors: SourceErrors,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl ViewModel {
    fn pending(address: Option<Address>, generation: u64) -> Self {
        Self {
            address,
            generation,
            role: None,
            phase: None,
            permitted_actions: BTreeSet::new(),
            timeline: Vec::new(),
            loading: SourceLoading::all(),
            errors: SourceErrors::default(),
            refreshed_at: None,
        }
    }

    pub fn permits(&self, action: Action) -> bool {
        self.permitted_actions.contains(&action)
    }

    fn recompute_actions(&mut self) {
        self.permitted_actions = match &self.role {
            Some(role) => permitted_actions(role, self.phase),
            None => BTreeSet::new(),
        };
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    ViewModelUpdated(Arc<ViewModel>),
    TransactionSubmitted {
        method: &'static str,
        tx_hash: TxHash,
    },
    TransactionConfirmed(TransactionReceipt),
    TransactionFailed {
        method: &'static str,
        error: SubmitError,
    },
}

pub struct SessionCoordinator {
    reader: Arc<dyn ContractReader>,
    writer: Arc<dyn ContractWriter>,
    roles: RoleResolver,
    aggregator: EventLogAggregator,
    state: RwLock<Arc<ViewModel>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionCoordinator {
    pub fn new<G>(gateway: Arc<G>, from_block: u64) -> Arc<Self>
    where
        G: ContractReader + EventLogSource + ContractWriter + 'static,
    {
        Self::new_with_dependencies(gateway.clone(), gateway.clone(), gateway, from_block)
    }

    pub fn read_only(
        reader: Arc<dyn ContractReader>,
        logs: Arc<dyn EventLogSource>,
        from_block: u64,
    ) -> Arc<Self> {
        Self::new_with_dependencies(reader, logs, Arc::new(MissingContractWriter), from_block)
    }

    pub fn new_with_dependencies(
        reader: Arc<dyn ContractReader>,
        logs: Arc<dyn EventLogSource>,
        writer: Arc<dyn ContractWriter>,
        from_block: u64,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            roles: RoleResolver::new(Arc::clone(&reader)),
            aggregator: EventLogAggregator::new(logs, from_block),
            reader,
            writer,
            state: RwLock::new(Arc::new(ViewModel::pending(None, 0))),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn view_model(&self) -> Arc<ViewModel> {
        Arc::clone(&*self.state.read().await)
    }

    /// Address change: the previous view-model is dropped and a new session
    /// is derived for `address`.
    pub async fn connect(&self, address: Option<Address>) -> Arc<ViewModel> {
        let generation = {
            let mut guard = self.state.write().await;
            let generation = guard.generation + 1;
            let snapshot = Arc::new(ViewModel::pending(address, generation));
            *guard = Arc::clone(&snapshot);
            let _ = self.events.send(SessionEvent::ViewModelUpdated(snapshot));
            generation
        };
        info!(address = ?address, generation, "session started");
        self.derive(address, generation).await
    }

    /// Re-derives every slot for the current address. Previous values stay
    /// visible, flagged as loading, until the whole replacement lands.
    pub async fn refresh(&self) -> Arc<ViewModel> {
        let (address, generation) = {
            let mut guard = self.state.write().await;
            let mut next = (**guard).clone();
            next.generation += 1;
            next.loading = SourceLoading::all();
            let snapshot = Arc::new(next);
            *guard = Arc::clone(&snapshot);
            let _ = self.events.send(SessionEvent::ViewModelUpdated(Arc::clone(&snapshot)));
            (snapshot.address, snapshot.generation)
        };
        debug!(address = ?address, generation, "session refresh");
        self.derive(address, generation).await
    }

    /// Reads every source concurrently, then publishes them together in a
    /// single snapshot so that role, phase and permitted actions always
    /// come from the same derivation.
    async fn derive(&self, address: Option<Address>, generation: u64) -> Arc<ViewModel> {
        let (role, phase, timeline) = tokio::join!(
            self.roles.resolve(address),
            self.reader.workflow_phase(),
            self.aggregator.aggregate(),
        );

        self.apply(generation, move |vm| {
            vm.errors.role = role.errors();
            vm.role = Some(role);

            match phase {
                Ok(phase) => {
                    vm.phase = Some(phase);
                    vm.errors.phase = None;
                }
                Err(err) => {
                    warn!(error = %err, "workflow phase unavailable");
                    vm.phase = None;
                    vm.errors.phase = Some(err);
                }
            }

            match timeline {
                Ok(timeline) => {
                    vm.timeline = timeline;
                    vm.errors.events = None;
                }
                // The last complete timeline stays in place.
                Err(err) => vm.errors.events = Some(err),
            }

            vm.loading = SourceLoading::default();
        })
        .await;
        self.view_model().await
    }

    /// Replaces the snapshot with `update` applied to it, unless a newer
    /// derivation has started since `generation` was issued.
    async fn apply(&self, generation: u64, update: impl FnOnce(&mut ViewModel)) {
        let mut guard = self.state.write().await;
        if guard.generation != generation {
            debug!(
                stale_generation = generation,
                current_generation = guard.generation,
                "dropping stale session result"
            );
            return;
        }

        let mut next = (**guard).clone();
        update(&mut next);
        next.recompute_actions();
        next.refreshed_at = Some(Utc::now());
        let snapshot = Arc::new(next);
        *guard = Arc::clone(&snapshot);
        let _ = self.events.send(SessionEvent::ViewModelUpdated(snapshot));
    }

    /// Sends `call`, waits for one confirmation and re-derives the session.
    /// Failures are returned and published; nothing is retried.
    pub async fn submit(&self, call: WriteCall) -> Result<TransactionReceipt, SubmitError> {
        let method = call.method();
        let result = self.send_and_confirm(&call).await;
        match &result {
            Ok(receipt) => {
                info!(
                    method,
                    tx_hash = %receipt.tx_hash,
                    block = receipt.block_number,
                    "transaction confirmed"
                );
                let _ = self
                    .events
                    .send(SessionEvent::TransactionConfirmed(*receipt));
            }
            Err(error) => {
                warn!(method, %error, "transaction failed");
                let _ = self.events.send(SessionEvent::TransactionFailed {
                    method,
                    error: error.clone(),
                });
            }
        }
        result
    }

    async fn send_and_confirm(&self, call: &WriteCall) -> Result<TransactionReceipt, SubmitError> {
        let method = call.method();
        let snapshot = self.view_model().await;
        let Some(from) = snapshot.address else {
            return Err(TransactionRejectedError::new(method, RejectionReason::NotConnected).into());
        };
        if !snapshot.permits(Action::for_call(call)) {
            return Err(TransactionRejectedError::new(method, RejectionReason::NotPermitted).into());
        }

        let pending = self.writer.send_transaction(from, call).await?;
        let _ = self.events.send(SessionEvent::TransactionSubmitted {
            method,
            tx_hash: pending.tx_hash,
        });
        let receipt = self.writer.wait_for_confirmation(&pending).await?;

        // Only the session that sent the transaction is re-derived.
        if self.view_model().await.address == Some(from) {
            self.refresh().await;
        }
        Ok(receipt)
    }

    pub async fn lookup_voter(&self, voter: Address) -> Result<VoterRecord, RpcError> {
        let caller = self.view_model().await.address;
        self.reader.get_voter(caller, voter).await
    }

    pub async fn lookup_proposal(&self, proposal_id: ProposalId) -> Result<Proposal, RpcError> {
        let caller = self.view_model().await.address;
        self.reader.get_proposal(caller, proposal_id).await
    }

    /// The winner is only read once votes are tallied; earlier phases yield
    /// `NotYetAvailable` without touching the contract.
    pub async fn winning_proposal(&self) -> Result<WinningProposal, RpcError> {
        let phase = match self.view_model().await.phase {
            Some(phase) => phase,
            None => self.reader.workflow_phase().await?,
        };
        if !winner_available(phase) {
            return Ok(WinningProposal::NotYetAvailable);
        }
        let id = self.reader.winning_proposal_id().await?;
        Ok(WinningProposal::Available(id))
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
