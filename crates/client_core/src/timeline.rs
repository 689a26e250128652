use std::{cmp::Reverse, sync::Arc};

use alloy_sol_types::SolEvent;
use futures::future::join_all;
use shared::{
    domain::{EventDetail, EventKind, EventRecord, ProposalId, WorkflowPhase},
    error::{AggregationFailure, PartialAggregationError, RpcError},
    protocol::{event_signature, IVoting},
};
use tracing::{debug, warn};

use crate::{narrow_u64, parse_quantity, EventLogSource, RawEventLog};

/// Rebuilds the full event timeline from the four contract event logs.
/// Every call rescans from `from_block`; there is no cursor.
pub struct EventLogAggregator {
    source: Arc<dyn EventLogSource>,
    from_block: u64,
}

impl EventLogAggregator {
    pub fn new(source: Arc<dyn EventLogSource>, from_block: u64) -> Self {
        Self { source, from_block }
    }

    pub async fn aggregate(&self) -> Result<Vec<EventRecord>, PartialAggregationError> {
        let batches = join_all(
            EventKind::ALL
                .into_iter()
                .map(|kind| async move { (kind, self.collect(kind).await) }),
        )
        .await;

        let timeline = merge_timeline(batches).inspect_err(|err| {
            warn!(error = %err, "event aggregation failed");
        })?;
        debug!(records = timeline.len(), "event timeline rebuilt");
        Ok(timeline)
    }

    async fn collect(&self, kind: EventKind) -> Result<Vec<EventRecord>, RpcError> {
        let logs = self.source.fetch_logs(kind, self.from_block).await?;
        logs.iter().map(|log| normalize_log(kind, log)).collect()
    }
}

/// Barrier step: all batches or nothing, then newest block first.
pub fn merge_timeline(
    batches: impl IntoIterator<Item = (EventKind, Result<Vec<EventRecord>, RpcError>)>,
) -> Result<Vec<EventRecord>, PartialAggregationError> {
    let mut timeline = Vec::new();
    let mut failures = Vec::new();
    for (kind, batch) in batches {
        match batch {
            Ok(records) => timeline.extend(records),
            Err(error) => failures.push(AggregationFailure { kind, error }),
        }
    }

    if !failures.is_empty() {
        return Err(PartialAggregationError { failures });
    }

    // Same-block records keep whatever order they arrived in; callers must
    // not rely on it.
    timeline.sort_by_key(|record| Reverse(record.block_number));
    Ok(timeline)
}

pub fn normalize_log(kind: EventKind, log: &RawEventLog) -> Result<EventRecord, RpcError> {
    let method = event_signature(kind);
    let raw_block = log
        .block_number
        .as_deref()
        .ok_or_else(|| RpcError::decode(method, "log is missing its block number"))?;
    let block_number = parse_quantity(method, raw_block)?;
    let detail = decode_detail(kind, log)?;
    Ok(EventRecord::new(detail, block_number))
}

fn decode_detail(kind: EventKind, log: &RawEventLog) -> Result<EventDetail, RpcError> {
    let method = event_signature(kind);
    let abi_error = |err: alloy_sol_types::Error| RpcError::decode(method, err.to_string());
    let topics = log.topics.iter().copied();

    let detail = match kind {
        EventKind::VoterAdded => {
            let event = IVoting::VoterRegistered::decode_raw_log(topics, &log.data, true)
                .map_err(abi_error)?;
            EventDetail::VoterAdded {
                voter: event.voterAddress,
            }
        }
        EventKind::PhaseChanged => {
            let event = IVoting::WorkflowStatusChange::decode_raw_log(topics, &log.data, true)
                .map_err(abi_error)?;
            EventDetail::PhaseChanged {
                previous: phase_from_code(method, event.previousStatus)?,
                current: phase_from_code(method, event.newStatus)?,
            }
        }
        EventKind::ProposalAdded => {
            let event = IVoting::ProposalRegistered::decode_raw_log(topics, &log.data, true)
                .map_err(abi_error)?;
            EventDetail::ProposalAdded {
                proposal_id: ProposalId(narrow_u64(method, event.proposalId)?),
            }
        }
        EventKind::VoteCast => {
            let event = IVoting::Voted::decode_raw_log(topics, &log.data, true).map_err(abi_error)?;
            EventDetail::VoteCast {
                voter: event.voter,
                proposal_id: ProposalId(narrow_u64(method, event.proposalId)?),
            }
        }
    };
    Ok(detail)
}

pub(crate) fn phase_from_code(method: &'static str, code: u8) -> Result<WorkflowPhase, RpcError> {
    WorkflowPhase::from_code(code)
        .ok_or_else(|| RpcError::decode(method, format!("unknown workflow status code {code}")))
}

#[cfg(test)]
#[path = "tests/timeline_tests.rs"]
mod tests;
