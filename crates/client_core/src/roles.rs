use std::{collections::BTreeSet, sync::Arc};

use serde::Serialize;
use shared::{domain::Address, error::RpcError};
use tracing::{debug, warn};

use crate::ContractReader;

/// One role axis. `Unknown` keeps "not a voter" apart from "could not tell".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Axis {
    Known(bool),
    Unknown(RpcError),
}

impl Axis {
    fn from_result(result: Result<bool, RpcError>) -> Self {
        match result {
            Ok(value) => Axis::Known(value),
            Err(err) => Axis::Unknown(err),
        }
    }

    pub fn known(&self) -> Option<bool> {
        match self {
            Axis::Known(value) => Some(*value),
            Axis::Unknown(_) => None,
        }
    }

    pub fn is_known_true(&self) -> bool {
        self.known() == Some(true)
    }

    pub fn error(&self) -> Option<&RpcError> {
        match self {
            Axis::Known(_) => None,
            Axis::Unknown(err) => Some(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    AdminOnly,
    VoterOnly,
    Both,
    Neither,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    AddVoter,
    AdvancePhase,
    AddProposal,
    SetVote,
    LookupVoter,
    LookupProposal,
    ViewWinner,
}

const ADMIN_CAPABILITIES: &[Capability] = &[Capability::AddVoter, Capability::AdvancePhase];
const VOTER_CAPABILITIES: &[Capability] = &[
    Capability::AddProposal,
    Capability::SetVote,
    Capability::LookupVoter,
    Capability::LookupProposal,
];
const PUBLIC_CAPABILITIES: &[Capability] = &[Capability::ViewWinner];

impl Role {
    pub fn from_axes(is_admin: bool, is_voter: bool) -> Self {
        match (is_admin, is_voter) {
            (true, true) => Role::Both,
            (true, false) => Role::AdminOnly,
            (false, true) => Role::VoterOnly,
            (false, false) => Role::Neither,
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Role::AdminOnly | Role::Both)
    }

    pub fn is_voter(self) -> bool {
        matches!(self, Role::VoterOnly | Role::Both)
    }

    pub fn capabilities(self) -> BTreeSet<Capability> {
        capability_set(self.is_admin(), self.is_voter())
    }

    pub fn description(self) -> &'static str {
        match self {
            Role::Both => "You are an admin and a voter",
            Role::AdminOnly => "You are an admin",
            Role::VoterOnly => "You are a voter",
            Role::Neither => "You are not whitelisted",
        }
    }
}

fn capability_set(is_admin: bool, is_voter: bool) -> BTreeSet<Capability> {
    let mut capabilities: BTreeSet<Capability> = PUBLIC_CAPABILITIES.iter().copied().collect();
    if is_admin {
        capabilities.extend(ADMIN_CAPABILITIES.iter().copied());
    }
    if is_voter {
        capabilities.extend(VOTER_CAPABILITIES.iter().copied());
    }
    capabilities
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRole {
    pub admin: Axis,
    pub voter: Axis,
}

impl ResolvedRole {
    pub fn disconnected() -> Self {
        Self {
            admin: Axis::Known(false),
            voter: Axis::Known(false),
        }
    }

    /// Tagged role, available once both axes are known.
    pub fn role(&self) -> Option<Role> {
        Some(Role::from_axes(self.admin.known()?, self.voter.known()?))
    }

    /// Capabilities of every axis known to be held. An unknown axis grants
    /// nothing.
    pub fn capabilities(&self) -> BTreeSet<Capability> {
        capability_set(self.admin.is_known_true(), self.voter.is_known_true())
    }

    pub fn errors(&self) -> Vec<RpcError> {
        [&self.admin, &self.voter]
            .into_iter()
            .filter_map(Axis::error)
            .cloned()
            .collect()
    }
}

pub struct RoleResolver {
    reader: Arc<dyn ContractReader>,
}

impl RoleResolver {
    pub fn new(reader: Arc<dyn ContractReader>) -> Self {
        Self { reader }
    }

    pub async fn resolve(&self, address: Option<Address>) -> ResolvedRole {
        let Some(address) = address else {
            return ResolvedRole::disconnected();
        };

        let (owner, voter) = tokio::join!(
            self.reader.owner(),
            self.reader.get_voter(Some(address), address)
        );

        let resolved = ResolvedRole {
            admin: Axis::from_result(owner.map(|owner| owner == address)),
            voter: Axis::from_result(voter.map(|record| record.is_registered)),
        };

        for err in resolved.errors() {
            warn!(%address, method = err.method, error = %err, "role axis unresolved");
        }
        debug!(%address, role = ?resolved.role(), "resolved role");
        resolved
    }
}

#[cfg(test)]
#[path = "tests/roles_tests.rs"]
mod tests;
