//! ABI of the voting contract and the write requests sent to it.

use alloy_primitives::{B256, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use serde::{Deserialize, Serialize};

use crate::domain::{Address, EventKind, ProposalId};

pub type TxHash = B256;

sol! {
    interface IVoting {
        struct Voter {
            bool isRegistered;
            bool hasVoted;
            uint256 votedProposalId;
        }

        struct Proposal {
            string description;
            uint256 voteCount;
        }

        event VoterRegistered(address voterAddress);
        event WorkflowStatusChange(uint8 previousStatus, uint8 newStatus);
        event ProposalRegistered(uint256 proposalId);
        event Voted(address voter, uint256 proposalId);

        function owner() external view returns (address);
        function getVoter(address _addr) external view returns (Voter memory);
        function getOneProposal(uint256 _id) external view returns (Proposal memory);
        function workflowStatus() external view returns (uint8);
        function winningProposalID() external view returns (uint256);

        function addVoter(address _addr) external;
        function addProposal(string calldata _desc) external;
        function setVote(uint256 _id) external;
        function startProposalsRegistering() external;
        function endProposalsRegistering() external;
        function startVotingSession() external;
        function endVotingSession() external;
        function tallyVotes(uint256 batchSize) external;
    }
}

pub fn event_signature(kind: EventKind) -> &'static str {
    match kind {
        EventKind::VoterAdded => IVoting::VoterRegistered::SIGNATURE,
        EventKind::PhaseChanged => IVoting::WorkflowStatusChange::SIGNATURE,
        EventKind::ProposalAdded => IVoting::ProposalRegistered::SIGNATURE,
        EventKind::VoteCast => IVoting::Voted::SIGNATURE,
    }
}

/// First log topic of every event of `kind`.
pub fn event_topic(kind: EventKind) -> B256 {
    match kind {
        EventKind::VoterAdded => IVoting::VoterRegistered::SIGNATURE_HASH,
        EventKind::PhaseChanged => IVoting::WorkflowStatusChange::SIGNATURE_HASH,
        EventKind::ProposalAdded => IVoting::ProposalRegistered::SIGNATURE_HASH,
        EventKind::VoteCast => IVoting::Voted::SIGNATURE_HASH,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WriteCall {
    AddVoter { voter: Address },
    AddProposal { description: String },
    SetVote { proposal_id: ProposalId },
    StartProposalsRegistering,
    EndProposalsRegistering,
    StartVotingSession,
    EndVotingSession,
    TallyVotes { batch_size: u64 },
}

impl WriteCall {
    pub fn method(&self) -> &'static str {
        match self {
            WriteCall::AddVoter { .. } => IVoting::addVoterCall::SIGNATURE,
            WriteCall::AddProposal { .. } => IVoting::addProposalCall::SIGNATURE,
            WriteCall::SetVote { .. } => IVoting::setVoteCall::SIGNATURE,
            WriteCall::StartProposalsRegistering => {
                IVoting::startProposalsRegisteringCall::SIGNATURE
            }
            WriteCall::EndProposalsRegistering => IVoting::endProposalsRegisteringCall::SIGNATURE,
            WriteCall::StartVotingSession => IVoting::startVotingSessionCall::SIGNATURE,
            WriteCall::EndVotingSession => IVoting::endVotingSessionCall::SIGNATURE,
            WriteCall::TallyVotes { .. } => IVoting::tallyVotesCall::SIGNATURE,
        }
    }

    pub fn abi_encode(&self) -> Vec<u8> {
        match self {
            WriteCall::AddVoter { voter } => IVoting::addVoterCall { _addr: *voter }.abi_encode(),
            WriteCall::AddProposal { description } => IVoting::addProposalCall {
                _desc: description.clone(),
            }
            .abi_encode(),
            WriteCall::SetVote { proposal_id } => IVoting::setVoteCall {
                _id: U256::from(proposal_id.0),
            }
            .abi_encode(),
            WriteCall::StartProposalsRegistering => {
                IVoting::startProposalsRegisteringCall {}.abi_encode()
            }
            WriteCall::EndProposalsRegistering => {
                IVoting::endProposalsRegisteringCall {}.abi_encode()
            }
            WriteCall::StartVotingSession => IVoting::startVotingSessionCall {}.abi_encode(),
            WriteCall::EndVotingSession => IVoting::endVotingSessionCall {}.abi_encode(),
            WriteCall::TallyVotes { batch_size } => IVoting::tallyVotesCall {
                batchSize: U256::from(*batch_size),
            }
            .abi_encode(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingTransaction {
    pub method: &'static str,
    pub tx_hash: TxHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransactionReceipt {
    pub method: &'static str,
    pub tx_hash: TxHash,
    pub block_number: u64,
}
