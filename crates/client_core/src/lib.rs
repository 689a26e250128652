use alloy_primitives::{Bytes, B256, U256};
use async_trait::async_trait;
use serde::Deserialize;
use shared::{
    domain::{Address, EventKind, Proposal, ProposalId, VoterRecord, WorkflowPhase},
    error::{RejectionReason, RpcError, SubmitError, TransactionRejectedError},
    protocol::{PendingTransaction, TransactionReceipt, WriteCall},
};

pub mod gateway;
pub mod phase_gate;
pub mod roles;
pub mod session;
pub mod timeline;

pub use gateway::{GatewayConfig, JsonRpcGateway};
pub use phase_gate::{permitted_actions, Action, PhaseTransition, WinningProposal};
pub use roles::{Axis, ResolvedRole, Role, RoleResolver};
pub use session::{SessionCoordinator, SessionEvent, SourceErrors, SourceLoading, ViewModel};
pub use timeline::EventLogAggregator;

/// Read-only view of the voting contract. Every call re-fetches current
/// truth; nothing is cached and nothing is retried here.
#[async_trait]
pub trait ContractReader: Send + Sync {
    async fn owner(&self) -> Result<Address, RpcError>;
    async fn get_voter(
        &self,
        caller: Option<Address>,
        voter: Address,
    ) -> Result<VoterRecord, RpcError>;
    async fn workflow_phase(&self) -> Result<WorkflowPhase, RpcError>;
    async fn get_proposal(
        &self,
        caller: Option<Address>,
        proposal_id: ProposalId,
    ) -> Result<Proposal, RpcError>;
    async fn winning_proposal_id(&self) -> Result<ProposalId, RpcError>;
}

/// Raw log as delivered by the node, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEventLog {
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(default)]
    pub block_number: Option<String>,
}

#[async_trait]
pub trait EventLogSource: Send + Sync {
    /// All logs of `kind` emitted by the contract from `from_block` to the
    /// latest block.
    async fn fetch_logs(
        &self,
        kind: EventKind,
        from_block: u64,
    ) -> Result<Vec<RawEventLog>, RpcError>;
}

#[async_trait]
pub trait ContractWriter: Send + Sync {
    async fn send_transaction(
        &self,
        from: Address,
        call: &WriteCall,
    ) -> Result<PendingTransaction, SubmitError>;
    /// Resolves once the transaction has one confirmation.
    async fn wait_for_confirmation(
        &self,
        pending: &PendingTransaction,
    ) -> Result<TransactionReceipt, SubmitError>;
}

pub struct MissingContractWriter;

#[async_trait]
impl ContractWriter for MissingContractWriter {
    async fn send_transaction(
        &self,
        _from: Address,
        call: &WriteCall,
    ) -> Result<PendingTransaction, SubmitError> {
        Err(TransactionRejectedError::new(
            call.method(),
            RejectionReason::Rejected("no transaction signer configured".to_string()),
        )
        .into())
    }

    async fn wait_for_confirmation(
        &self,
        pending: &PendingTransaction,
    ) -> Result<TransactionReceipt, SubmitError> {
        Err(TransactionRejectedError::new(
            pending.method,
            RejectionReason::Rejected("no transaction signer configured".to_string()),
        )
        .into())
    }
}

/// Converts a node quantity (`0x`-prefixed hex, up to 256 bits wide) into a
/// `u64`, failing instead of truncating.
pub fn parse_quantity(method: &'static str, raw: &str) -> Result<u64, RpcError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::decode(method, format!("quantity '{raw}' is missing 0x prefix")))?;
    if digits.is_empty() {
        return Err(RpcError::decode(method, "quantity '0x' has no digits"));
    }
    let wide = U256::from_str_radix(digits, 16)
        .map_err(|err| RpcError::decode(method, format!("invalid quantity '{raw}': {err}")))?;
    narrow_u64(method, wide)
}

pub(crate) fn narrow_u64(method: &'static str, value: U256) -> Result<u64, RpcError> {
    u64::try_from(value)
        .map_err(|_| RpcError::decode(method, format!("value {value} does not fit in 64 bits")))
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
