use super::*;
use shared::error::RpcErrorKind;

#[test]
fn parse_quantity_reads_prefixed_hex() {
    assert_eq!(parse_quantity("eth_blockNumber", "0x0").expect("zero"), 0);
    assert_eq!(parse_quantity("eth_blockNumber", "0x1b4").expect("hex"), 436);
    assert_eq!(
        parse_quantity("eth_blockNumber", "0xffffffffffffffff").expect("max"),
        u64::MAX
    );
}

#[test]
fn parse_quantity_rejects_missing_prefix() {
    let err = parse_quantity("eth_blockNumber", "1b4").expect_err("must fail");
    assert_eq!(err.method, "eth_blockNumber");
    assert!(matches!(err.kind, RpcErrorKind::Decode { .. }));
}

#[test]
fn parse_quantity_fails_instead_of_truncating() {
    let err = parse_quantity("eth_blockNumber", "0x10000000000000000").expect_err("overflow");
    assert!(matches!(err.kind, RpcErrorKind::Decode { .. }));
    assert!(err.to_string().contains("64 bits"), "unexpected error: {err}");
}

#[test]
fn parse_quantity_rejects_empty_digits() {
    let err = parse_quantity("eth_getLogs", "0x").expect_err("must fail");
    assert_eq!(err.method, "eth_getLogs");
    assert!(matches!(err.kind, RpcErrorKind::Decode(_)));
}

#[test]
fn parse_quantity_rejects_non_hex_digits() {
    let err = parse_quantity("eth_blockNumber", "0xzz").expect_err("must fail");
    assert!(matches!(err.kind, RpcErrorKind::Decode { .. }));
}

#[test]
fn raw_event_log_deserializes_node_shape() {
    let log: RawEventLog = serde_json::from_value(serde_json::json!({
        "address": "0x0000000000000000000000000000000000000001",
        "topics": ["0x0000000000000000000000000000000000000000000000000000000000000002"],
        "data": "0x",
        "blockNumber": "0x10",
        "logIndex": "0x0",
        "removed": false
    }))
    .expect("log");
    assert_eq!(log.topics, vec![B256::with_last_byte(2)]);
    assert!(log.data.is_empty());
    assert_eq!(log.block_number.as_deref(), Some("0x10"));
}

#[tokio::test]
async fn missing_writer_rejects_every_transaction() {
    let writer = MissingContractWriter;
    let call = WriteCall::AddProposal {
        description: "more trees".to_string(),
    };

    let err = writer
        .send_transaction(Address::repeat_byte(1), &call)
        .await
        .expect_err("must fail");
    match err {
        SubmitError::Rejected(rejected) => {
            assert_eq!(rejected.method, "addProposal(string)");
            assert!(matches!(rejected.reason, RejectionReason::Rejected(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
