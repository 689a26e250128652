//! Workflow transition table and the join of role capabilities with phase
//! gating that yields the permitted action set.

use std::collections::BTreeSet;

use serde::Serialize;
use shared::{
    domain::{ProposalId, WorkflowPhase},
    protocol::WriteCall,
};

use crate::roles::{Capability, ResolvedRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseTransition {
    StartProposalsRegistering,
    EndProposalsRegistering,
    StartVotingSession,
    EndVotingSession,
    TallyVotes,
}

impl PhaseTransition {
    /// The single legal transition out of `phase`; `None` once tallied.
    pub fn from_phase(phase: WorkflowPhase) -> Option<Self> {
        match phase {
            WorkflowPhase::RegisteringVoters => Some(PhaseTransition::StartProposalsRegistering),
            WorkflowPhase::ProposalsRegistrationStarted => {
                Some(PhaseTransition::EndProposalsRegistering)
            }
            WorkflowPhase::ProposalsRegistrationEnded => Some(PhaseTransition::StartVotingSession),
            WorkflowPhase::VotingSessionStarted => Some(PhaseTransition::EndVotingSession),
            WorkflowPhase::VotingSessionEnded => Some(PhaseTransition::TallyVotes),
            WorkflowPhase::VotesTallied => None,
        }
    }

    pub fn source(self) -> WorkflowPhase {
        match self {
            PhaseTransition::StartProposalsRegistering => WorkflowPhase::RegisteringVoters,
            PhaseTransition::EndProposalsRegistering => WorkflowPhase::ProposalsRegistrationStarted,
            PhaseTransition::StartVotingSession => WorkflowPhase::ProposalsRegistrationEnded,
            PhaseTransition::EndVotingSession => WorkflowPhase::VotingSessionStarted,
            PhaseTransition::TallyVotes => WorkflowPhase::VotingSessionEnded,
        }
    }

    pub fn target(self) -> WorkflowPhase {
        match self {
            PhaseTransition::StartProposalsRegistering => {
                WorkflowPhase::ProposalsRegistrationStarted
            }
            PhaseTransition::EndProposalsRegistering => WorkflowPhase::ProposalsRegistrationEnded,
            PhaseTransition::StartVotingSession => WorkflowPhase::VotingSessionStarted,
            PhaseTransition::EndVotingSession => WorkflowPhase::VotingSessionEnded,
            PhaseTransition::TallyVotes => WorkflowPhase::VotesTallied,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PhaseTransition::StartProposalsRegistering => "start proposals registration",
            PhaseTransition::EndProposalsRegistering => "end proposals registration",
            PhaseTransition::StartVotingSession => "start voting session",
            PhaseTransition::EndVotingSession => "end voting session",
            PhaseTransition::TallyVotes => "tally votes",
        }
    }

    /// `batch_size` is only used by the tally transition.
    pub fn write_call(self, batch_size: u64) -> WriteCall {
        match self {
            PhaseTransition::StartProposalsRegistering => WriteCall::StartProposalsRegistering,
            PhaseTransition::EndProposalsRegistering => WriteCall::EndProposalsRegistering,
            PhaseTransition::StartVotingSession => WriteCall::StartVotingSession,
            PhaseTransition::EndVotingSession => WriteCall::EndVotingSession,
            PhaseTransition::TallyVotes => WriteCall::TallyVotes { batch_size },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "type", content = "transition", rename_all = "snake_case")]
pub enum Action {
    AddVoter,
    AdvancePhase(PhaseTransition),
    AddProposal,
    SetVote,
    LookupVoter,
    LookupProposal,
    ViewWinner,
}

impl Action {
    /// The action a write request needs to be permitted.
    pub fn for_call(call: &WriteCall) -> Self {
        match call {
            WriteCall::AddVoter { .. } => Action::AddVoter,
            WriteCall::AddProposal { .. } => Action::AddProposal,
            WriteCall::SetVote { .. } => Action::SetVote,
            WriteCall::StartProposalsRegistering => {
                Action::AdvancePhase(PhaseTransition::StartProposalsRegistering)
            }
            WriteCall::EndProposalsRegistering => {
                Action::AdvancePhase(PhaseTransition::EndProposalsRegistering)
            }
            WriteCall::StartVotingSession => {
                Action::AdvancePhase(PhaseTransition::StartVotingSession)
            }
            WriteCall::EndVotingSession => Action::AdvancePhase(PhaseTransition::EndVotingSession),
            WriteCall::TallyVotes { .. } => Action::AdvancePhase(PhaseTransition::TallyVotes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "proposal_id", rename_all = "snake_case")]
pub enum WinningProposal {
    NotYetAvailable,
    Available(ProposalId),
}

pub fn winner_available(phase: WorkflowPhase) -> bool {
    phase >= WorkflowPhase::VotesTallied
}

/// Phase half of the join: what `capability` turns into in `phase`, if
/// anything. An unknown phase only lets phase-independent lookups through.
pub fn gate(capability: Capability, phase: Option<WorkflowPhase>) -> Option<Action> {
    match capability {
        Capability::LookupVoter => return Some(Action::LookupVoter),
        Capability::LookupProposal => return Some(Action::LookupProposal),
        _ => {}
    }

    let phase = phase?;
    match capability {
        Capability::AddVoter => {
            (phase == WorkflowPhase::RegisteringVoters).then_some(Action::AddVoter)
        }
        Capability::AdvancePhase => PhaseTransition::from_phase(phase).map(Action::AdvancePhase),
        Capability::AddProposal => {
            (phase == WorkflowPhase::ProposalsRegistrationStarted).then_some(Action::AddProposal)
        }
        Capability::SetVote => {
            (phase == WorkflowPhase::VotingSessionStarted).then_some(Action::SetVote)
        }
        Capability::ViewWinner => winner_available(phase).then_some(Action::ViewWinner),
        Capability::LookupVoter | Capability::LookupProposal => None,
    }
}

pub fn permitted_actions(role: &ResolvedRole, phase: Option<WorkflowPhase>) -> BTreeSet<Action> {
    role.capabilities()
        .into_iter()
        .filter_map(|capability| gate(capability, phase))
        .collect()
}
