use serde::{Deserialize, Serialize};

pub use alloy_primitives::Address;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);
    };
}

id_newtype!(ProposalId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterRecord {
    pub is_registered: bool,
    pub has_voted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voted_proposal_id: Option<ProposalId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub description: String,
    pub vote_count: u64,
}

/// The contract's workflow state machine. Declaration order is the order
/// the contract walks through, one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    RegisteringVoters,
    ProposalsRegistrationStarted,
    ProposalsRegistrationEnded,
    VotingSessionStarted,
    VotingSessionEnded,
    VotesTallied,
}

impl WorkflowPhase {
    pub const ALL: [WorkflowPhase; 6] = [
        WorkflowPhase::RegisteringVoters,
        WorkflowPhase::ProposalsRegistrationStarted,
        WorkflowPhase::ProposalsRegistrationEnded,
        WorkflowPhase::VotingSessionStarted,
        WorkflowPhase::VotingSessionEnded,
        WorkflowPhase::VotesTallied,
    ];

    /// Maps the contract's `uint8` status code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn next(self) -> Option<Self> {
        Self::from_code(self.code() + 1)
    }

    pub fn label(self) -> &'static str {
        match self {
            WorkflowPhase::RegisteringVoters => "registering voters",
            WorkflowPhase::ProposalsRegistrationStarted => "proposals registration started",
            WorkflowPhase::ProposalsRegistrationEnded => "proposals registration ended",
            WorkflowPhase::VotingSessionStarted => "voting session started",
            WorkflowPhase::VotingSessionEnded => "voting session ended",
            WorkflowPhase::VotesTallied => "votes tallied",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    VoterAdded,
    PhaseChanged,
    ProposalAdded,
    VoteCast,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::VoterAdded,
        EventKind::PhaseChanged,
        EventKind::ProposalAdded,
        EventKind::VoteCast,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EventKind::VoterAdded => "Add Voter",
            EventKind::PhaseChanged => "Change Status",
            EventKind::ProposalAdded => "Add Proposal",
            EventKind::VoteCast => "Set Vote",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventDetail {
    VoterAdded {
        voter: Address,
    },
    PhaseChanged {
        previous: WorkflowPhase,
        current: WorkflowPhase,
    },
    ProposalAdded {
        proposal_id: ProposalId,
    },
    VoteCast {
        voter: Address,
        proposal_id: ProposalId,
    },
}

impl EventDetail {
    pub fn kind(&self) -> EventKind {
        match self {
            EventDetail::VoterAdded { .. } => EventKind::VoterAdded,
            EventDetail::PhaseChanged { .. } => EventKind::PhaseChanged,
            EventDetail::ProposalAdded { .. } => EventKind::ProposalAdded,
            EventDetail::VoteCast { .. } => EventKind::VoteCast,
        }
    }

    /// Address carried by the event payload, if the event has one.
    pub fn actor(&self) -> Option<Address> {
        match self {
            EventDetail::VoterAdded { voter } | EventDetail::VoteCast { voter, .. } => Some(*voter),
            EventDetail::PhaseChanged { .. } | EventDetail::ProposalAdded { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_address: Option<Address>,
    pub block_number: u64,
    pub detail: EventDetail,
}

impl EventRecord {
    pub fn new(detail: EventDetail, block_number: u64) -> Self {
        Self {
            kind: detail.kind(),
            actor_address: detail.actor(),
            block_number,
            detail,
        }
    }
}
