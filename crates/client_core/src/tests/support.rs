//! Test doubles for the contract seams.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use shared::{
    domain::{Address, EventKind, Proposal, ProposalId, VoterRecord, WorkflowPhase},
    error::{RejectionReason, RpcError, SubmitError, TransactionRejectedError},
    protocol::{PendingTransaction, TransactionReceipt, TxHash, WriteCall},
};
use tokio::sync::{Notify, Semaphore};

use crate::{ContractReader, ContractWriter, EventLogSource, RawEventLog};

pub fn address(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn registered() -> VoterRecord {
    VoterRecord {
        is_registered: true,
        has_voted: false,
        voted_proposal_id: None,
    }
}

pub fn raw_log<E: SolEvent>(event: &E, block_number: u64) -> RawEventLog {
    let data = event.encode_log_data();
    RawEventLog {
        topics: data.topics().to_vec(),
        data: data.data.clone(),
        block_number: Some(format!("{block_number:#x}")),
    }
}

pub struct TestContract {
    pub owner: Mutex<Result<Address, RpcError>>,
    pub voters: Mutex<HashMap<Address, VoterRecord>>,
    pub voter_error: Mutex<Option<RpcError>>,
    pub phase: Mutex<Result<WorkflowPhase, RpcError>>,
    pub proposals: Mutex<Vec<Proposal>>,
    pub winner: Mutex<Result<ProposalId, RpcError>>,
    pub owner_delay: Duration,
    pub voter_delay: Duration,
    pub phase_delay: Duration,
    pub winner_reads: AtomicUsize,
}

impl TestContract {
    pub fn new(owner: Address, phase: WorkflowPhase) -> Self {
        Self {
            owner: Mutex::new(Ok(owner)),
            voters: Mutex::new(HashMap::new()),
            voter_error: Mutex::new(None),
            phase: Mutex::new(Ok(phase)),
            proposals: Mutex::new(Vec::new()),
            winner: Mutex::new(Ok(ProposalId(0))),
            owner_delay: Duration::ZERO,
            voter_delay: Duration::ZERO,
            phase_delay: Duration::ZERO,
            winner_reads: AtomicUsize::new(0),
        }
    }

    pub fn with_voter(self, voter: Address, record: VoterRecord) -> Self {
        self.voters.lock().expect("voters").insert(voter, record);
        self
    }

    pub fn with_delays(mut self, owner_delay: Duration, voter_delay: Duration) -> Self {
        self.owner_delay = owner_delay;
        self.voter_delay = voter_delay;
        self
    }

    pub fn with_phase_delay(mut self, delay: Duration) -> Self {
        self.phase_delay = delay;
        self
    }

    pub fn set_phase(&self, phase: Result<WorkflowPhase, RpcError>) {
        *self.phase.lock().expect("phase") = phase;
    }

    pub fn fail_voter_reads(&self, err: RpcError) {
        *self.voter_error.lock().expect("voter error") = Some(err);
    }
}

#[async_trait]
impl ContractReader for TestContract {
    async fn owner(&self) -> Result<Address, RpcError> {
        tokio::time::sleep(self.owner_delay).await;
        self.owner.lock().expect("owner").clone()
    }

    async fn get_voter(
        &self,
        _caller: Option<Address>,
        voter: Address,
    ) -> Result<VoterRecord, RpcError> {
        tokio::time::sleep(self.voter_delay).await;
        if let Some(err) = self.voter_error.lock().expect("voter error").clone() {
            return Err(err);
        }
        Ok(self
            .voters
            .lock()
            .expect("voters")
            .get(&voter)
            .copied()
            .unwrap_or(VoterRecord {
                is_registered: false,
                has_voted: false,
                voted_proposal_id: None,
            }))
    }

    async fn workflow_phase(&self) -> Result<WorkflowPhase, RpcError> {
        tokio::time::sleep(self.phase_delay).await;
        self.phase.lock().expect("phase").clone()
    }

    async fn get_proposal(
        &self,
        _caller: Option<Address>,
        proposal_id: ProposalId,
    ) -> Result<Proposal, RpcError> {
        self.proposals
            .lock()
            .expect("proposals")
            .get(proposal_id.0 as usize)
            .cloned()
            .ok_or_else(|| RpcError::node("getOneProposal(uint256)", 3, "execution reverted"))
    }

    async fn winning_proposal_id(&self) -> Result<ProposalId, RpcError> {
        self.winner_reads.fetch_add(1, Ordering::SeqCst);
        self.winner.lock().expect("winner").clone()
    }
}

/// Log source whose first query per kind can be held back until released,
/// to simulate a slow fetch that a newer session overtakes.
pub struct TestLogs {
    logs: Mutex<HashMap<EventKind, Result<Vec<RawEventLog>, RpcError>>>,
    held: Option<HeldRound>,
    pub calls: AtomicUsize,
}

struct HeldRound {
    logs: HashMap<EventKind, Vec<RawEventLog>>,
    released: Semaphore,
    started: Notify,
    first_calls: Mutex<Vec<EventKind>>,
}

impl TestLogs {
    pub fn new() -> Self {
        Self {
            logs: Mutex::new(HashMap::new()),
            held: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_logs(self, kind: EventKind, logs: Vec<RawEventLog>) -> Self {
        self.logs.lock().expect("logs").insert(kind, Ok(logs));
        self
    }

    pub fn with_failure(self, kind: EventKind, err: RpcError) -> Self {
        self.logs.lock().expect("logs").insert(kind, Err(err));
        self
    }

    pub fn set_logs(&self, kind: EventKind, logs: Result<Vec<RawEventLog>, RpcError>) {
        self.logs.lock().expect("logs").insert(kind, logs);
    }

    /// The first query for each kind returns `logs` instead, and only after
    /// [`TestLogs::release_held`].
    pub fn holding_first_round(mut self, logs: HashMap<EventKind, Vec<RawEventLog>>) -> Self {
        self.held = Some(HeldRound {
            logs,
            released: Semaphore::new(0),
            started: Notify::new(),
            first_calls: Mutex::new(Vec::new()),
        });
        self
    }

    pub async fn wait_until_held(&self) {
        if let Some(held) = &self.held {
            held.started.notified().await;
        }
    }

    pub fn release_held(&self) {
        if let Some(held) = &self.held {
            held.released.add_permits(EventKind::ALL.len());
        }
    }
}

#[async_trait]
impl EventLogSource for TestLogs {
    async fn fetch_logs(
        &self,
        kind: EventKind,
        _from_block: u64,
    ) -> Result<Vec<RawEventLog>, RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(held) = &self.held {
            let first = {
                let mut first_calls = held.first_calls.lock().expect("first calls");
                if first_calls.contains(&kind) {
                    false
                } else {
                    first_calls.push(kind);
                    true
                }
            };
            if first {
                if kind == EventKind::VoterAdded {
                    held.started.notify_one();
                }
                let permit = held.released.acquire().await.expect("semaphore open");
                permit.forget();
                return Ok(held.logs.get(&kind).cloned().unwrap_or_default());
            }
        }
        self.logs
            .lock()
            .expect("logs")
            .get(&kind)
            .cloned()
            .unwrap_or(Ok(Vec::new()))
    }
}

/// Writer that confirms every transaction and then advances or mutates the
/// backing [`TestContract`] the way the real contract would.
pub struct TestWriter {
    pub contract: std::sync::Arc<TestContract>,
    pub sent: Mutex<Vec<(Address, WriteCall)>>,
    pub reject_with: Option<String>,
    pub revert: bool,
}

impl TestWriter {
    pub fn new(contract: std::sync::Arc<TestContract>) -> Self {
        Self {
            contract,
            sent: Mutex::new(Vec::new()),
            reject_with: None,
            revert: false,
        }
    }
}

#[async_trait]
impl ContractWriter for TestWriter {
    async fn send_transaction(
        &self,
        from: Address,
        call: &WriteCall,
    ) -> Result<PendingTransaction, SubmitError> {
        if let Some(message) = &self.reject_with {
            return Err(TransactionRejectedError::new(
                call.method(),
                RejectionReason::Rejected(message.clone()),
            )
            .into());
        }
        let mut sent = self.sent.lock().expect("sent");
        sent.push((from, call.clone()));
        Ok(PendingTransaction {
            method: call.method(),
            tx_hash: TxHash::repeat_byte(sent.len() as u8),
        })
    }

    async fn wait_for_confirmation(
        &self,
        pending: &PendingTransaction,
    ) -> Result<TransactionReceipt, SubmitError> {
        if self.revert {
            return Err(TransactionRejectedError::new(
                pending.method,
                RejectionReason::Reverted {
                    tx_hash: pending.tx_hash.to_string(),
                },
            )
            .into());
        }

        let last = self
            .sent
            .lock()
            .expect("sent")
            .last()
            .map(|(_, call)| call.clone());
        match last {
            Some(WriteCall::AddVoter { voter }) => {
                self.contract
                    .voters
                    .lock()
                    .expect("voters")
                    .insert(voter, registered());
            }
            Some(WriteCall::AddProposal { description }) => {
                self.contract
                    .proposals
                    .lock()
                    .expect("proposals")
                    .push(Proposal {
                        description,
                        vote_count: 0,
                    });
            }
            Some(other) => {
                let current = self.contract.phase.lock().expect("phase").clone();
                if let (Ok(phase), false) = (current, matches!(other, WriteCall::SetVote { .. })) {
                    if let Some(next) = phase.next() {
                        self.contract.set_phase(Ok(next));
                    }
                }
            }
            None => {}
        }

        Ok(TransactionReceipt {
            method: pending.method,
            tx_hash: pending.tx_hash,
            block_number: 100,
        })
    }
}
