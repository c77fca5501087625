use serde_json::json;
use wallet_gate::models::{
    ApiResponse, ApprovalDecision, CreateLocalKeyringRequest, IncomingRequest, KeyringType,
    MultisigActionRequest, RpcEnvelope, RpcResponse,
};

#[test]
fn test_envelope_into_request() {
    let envelope: RpcEnvelope = serde_json::from_value(json!({
        "data": {"method": "eth_chainId"},
        "session": {"origin": "https://app.example"}
    }))
    .unwrap();
    let request = IncomingRequest::from(envelope);
    assert_eq!(request.method, "eth_chainId");
    assert!(request.params.is_empty());
    assert_eq!(request.session.origin, "https://app.example");
    assert_eq!(request.session.name, "");

    let payload = request.payload();
    assert_eq!(payload["method"], "eth_chainId");
    assert_eq!(payload["params"], json!([]));
}

#[test]
fn test_success_response_omits_error() {
    let json = serde_json::to_value(RpcResponse::success(json!("0x1"))).unwrap();
    assert_eq!(json["result"], "0x1");
    assert!(json.get("error").is_none());
}

#[test]
fn test_approval_decision_defaults() {
    let decision: ApprovalDecision = serde_json::from_value(json!({"approved": false})).unwrap();
    assert!(!decision.approved);
    assert!(decision.password.is_none());
    assert!(decision.reason.is_none());
}

#[test]
fn test_create_local_keyring_request_is_camel_case() {
    let request: CreateLocalKeyringRequest = serde_json::from_value(json!({
        "password": "pw",
        "privateKeys": ["0x01"]
    }))
    .unwrap();
    assert_eq!(request.private_keys, vec!["0x01".to_string()]);
    assert!(request.mnemonic.is_none());
    assert!(request.count.is_none());
}

#[test]
fn test_multisig_action_body_is_optional() {
    let request: MultisigActionRequest = serde_json::from_value(json!({})).unwrap();
    assert!(request.transaction.is_none());
}

#[test]
fn test_api_response_constructors() {
    let ok = ApiResponse::ok(3u32, "three");
    assert!(ok.success);
    assert_eq!(ok.data, Some(3));

    let err: ApiResponse<u32> = ApiResponse::error("nope");
    assert!(!err.success);
    assert!(err.data.is_none());
    assert_eq!(err.message, "nope");
}

#[test]
fn test_keyring_type_names() {
    for ty in [
        KeyringType::Local,
        KeyringType::HardwareTransport,
        KeyringType::MultisigCoordinator,
    ] {
        assert_eq!(serde_json::to_value(ty).unwrap(), json!(ty.as_str()));
    }
}
