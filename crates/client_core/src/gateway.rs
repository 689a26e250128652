//! Ethereum JSON-RPC transport for the voting contract.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use alloy_primitives::{Bytes, U256};
use alloy_sol_types::SolCall;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use shared::{
    domain::{Address, EventKind, Proposal, ProposalId, VoterRecord, WorkflowPhase},
    error::{RejectionReason, RpcError, RpcErrorKind, SubmitError, TransactionRejectedError},
    protocol::{
        event_signature, event_topic, IVoting, PendingTransaction, TransactionReceipt, TxHash,
        WriteCall,
    },
};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    narrow_u64, parse_quantity, timeline::phase_from_code, ContractReader, ContractWriter,
    EventLogSource, RawEventLog,
};

const RECEIPT_METHOD: &str = "eth_getTransactionReceipt";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub rpc_url: Url,
    pub contract_address: Address,
    pub request_timeout: Duration,
    pub receipt_poll_interval: Duration,
    pub confirmation_timeout: Duration,
}

#[derive(Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Serialize)]
struct CallRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<Address>,
    to: Address,
    data: Bytes,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogFilter {
    address: Address,
    from_block: String,
    to_block: &'static str,
    topics: Vec<alloy_primitives::B256>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    block_number: String,
    #[serde(default)]
    status: Option<String>,
}

pub struct JsonRpcGateway {
    http: Client,
    rpc_url: Url,
    contract: Address,
    receipt_poll_interval: Duration,
    confirmation_timeout: Duration,
    next_id: AtomicU64,
}

impl JsonRpcGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build JSON-RPC http client")?;
        Ok(Self {
            http,
            rpc_url: config.rpc_url,
            contract: config.contract_address,
            receipt_poll_interval: config.receipt_poll_interval,
            confirmation_timeout: config.confirmation_timeout,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn contract_address(&self) -> Address {
        self.contract
    }

    /// One JSON-RPC round trip. `label` is the contract method or event the
    /// request is made for and ends up on any error.
    async fn request<P, R>(
        &self,
        label: &'static str,
        method: &str,
        params: P,
    ) -> Result<R, RpcError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(rpc_method = method, label, id, "json-rpc request");
        let response = self
            .http
            .post(self.rpc_url.clone())
            .json(&JsonRpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await
            .map_err(|err| transport_error(label, err))?;

        // Providers may answer a JSON-RPC error with a 4xx/5xx status; the
        // envelope takes precedence over the status.
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| transport_error(label, err))?;
        let envelope: JsonRpcResponse = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(err) if status.is_success() => {
                return Err(RpcError::decode(label, err.to_string()))
            }
            Err(_) => return Err(RpcError::transport(label, format!("http status {status}"))),
        };
        if let Some(error) = envelope.error {
            return Err(RpcError::node(label, error.code, error.message));
        }
        if !status.is_success() {
            return Err(RpcError::transport(label, format!("http status {status}")));
        }
        serde_json::from_value(envelope.result.unwrap_or(Value::Null))
            .map_err(|err| RpcError::decode(label, err.to_string()))
    }

    async fn call<C: SolCall + Send>(
        &self,
        from: Option<Address>,
        call: C,
    ) -> Result<C::Return, RpcError> {
        let request = CallRequest {
            from,
            to: self.contract,
            data: Bytes::from(call.abi_encode()),
        };
        let raw: Bytes = self
            .request(C::SIGNATURE, "eth_call", (request, "latest"))
            .await?;
        C::abi_decode_returns(&raw, true)
            .map_err(|err| RpcError::decode(C::SIGNATURE, err.to_string()))
    }
}

fn transport_error(label: &'static str, err: reqwest::Error) -> RpcError {
    if err.is_timeout() {
        RpcError::timeout(label)
    } else if err.is_decode() {
        RpcError::decode(label, err.to_string())
    } else {
        RpcError::transport(label, err.to_string())
    }
}

#[async_trait]
impl ContractReader for JsonRpcGateway {
    async fn owner(&self) -> Result<Address, RpcError> {
        Ok(self.call(None, IVoting::ownerCall {}).await?._0)
    }

    async fn get_voter(
        &self,
        caller: Option<Address>,
        voter: Address,
    ) -> Result<VoterRecord, RpcError> {
        let record = self
            .call(caller, IVoting::getVoterCall { _addr: voter })
            .await?
            ._0;
        let voted_proposal_id = if record.hasVoted {
            Some(ProposalId(narrow_u64(
                IVoting::getVoterCall::SIGNATURE,
                record.votedProposalId,
            )?))
        } else {
            None
        };
        Ok(VoterRecord {
            is_registered: record.isRegistered,
            has_voted: record.hasVoted,
            voted_proposal_id,
        })
    }

    async fn workflow_phase(&self) -> Result<WorkflowPhase, RpcError> {
        let code = self.call(None, IVoting::workflowStatusCall {}).await?._0;
        phase_from_code(IVoting::workflowStatusCall::SIGNATURE, code)
    }

    async fn get_proposal(
        &self,
        caller: Option<Address>,
        proposal_id: ProposalId,
    ) -> Result<Proposal, RpcError> {
        let proposal = self
            .call(
                caller,
                IVoting::getOneProposalCall {
                    _id: U256::from(proposal_id.0),
                },
            )
            .await?
            ._0;
        Ok(Proposal {
            description: proposal.description,
            vote_count: narrow_u64(IVoting::getOneProposalCall::SIGNATURE, proposal.voteCount)?,
        })
    }

    async fn winning_proposal_id(&self) -> Result<ProposalId, RpcError> {
        let id = self.call(None, IVoting::winningProposalIDCall {}).await?._0;
        Ok(ProposalId(narrow_u64(
            IVoting::winningProposalIDCall::SIGNATURE,
            id,
        )?))
    }
}

#[async_trait]
impl EventLogSource for JsonRpcGateway {
    async fn fetch_logs(
        &self,
        kind: EventKind,
        from_block: u64,
    ) -> Result<Vec<RawEventLog>, RpcError> {
        let filter = LogFilter {
            address: self.contract,
            from_block: format!("{from_block:#x}"),
            to_block: "latest",
            topics: vec![event_topic(kind)],
        };
        self.request(event_signature(kind), "eth_getLogs", [filter])
            .await
    }
}

#[async_trait]
impl ContractWriter for JsonRpcGateway {
    async fn send_transaction(
        &self,
        from: Address,
        call: &WriteCall,
    ) -> Result<PendingTransaction, SubmitError> {
        let method = call.method();
        let request = CallRequest {
            from: Some(from),
            to: self.contract,
            data: Bytes::from(call.abi_encode()),
        };
        let tx_hash: TxHash = self
            .request(method, "eth_sendTransaction", [request])
            .await
            .map_err(|err| {
                if let RpcErrorKind::Node { message, .. } = &err.kind {
                    return SubmitError::Rejected(TransactionRejectedError::new(
                        method,
                        RejectionReason::Rejected(message.clone()),
                    ));
                }
                SubmitError::Rpc(err)
            })?;
        info!(method, %from, %tx_hash, "transaction submitted");
        Ok(PendingTransaction { method, tx_hash })
    }

    async fn wait_for_confirmation(
        &self,
        pending: &PendingTransaction,
    ) -> Result<TransactionReceipt, SubmitError> {
        let deadline = Instant::now() + self.confirmation_timeout;
        loop {
            let polled: Result<Option<RpcReceipt>, RpcError> = self
                .request(pending.method, RECEIPT_METHOD, [pending.tx_hash])
                .await;
            let receipt = match polled {
                Ok(receipt) => receipt,
                // The transaction is still pending; a failed poll is not a
                // failed transaction.
                Err(err @ RpcError {
                    kind: RpcErrorKind::Transport(_) | RpcErrorKind::Timeout,
                    ..
                }) => {
                    warn!(method = pending.method, error = %err, "receipt poll failed");
                    None
                }
                Err(err) => return Err(err.into()),
            };

            if let Some(receipt) = receipt {
                let status = receipt
                    .status
                    .as_deref()
                    .map(|raw| parse_quantity(pending.method, raw))
                    .transpose()?;
                if status == Some(0) {
                    return Err(TransactionRejectedError::new(
                        pending.method,
                        RejectionReason::Reverted {
                            tx_hash: pending.tx_hash.to_string(),
                        },
                    )
                    .into());
                }
                return Ok(TransactionReceipt {
                    method: pending.method,
                    tx_hash: pending.tx_hash,
                    block_number: parse_quantity(pending.method, &receipt.block_number)?,
                });
            }

            if Instant::now() >= deadline {
                return Err(RpcError::timeout(pending.method).into());
            }
            tokio::time::sleep(self.receipt_poll_interval).await;
        }
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
