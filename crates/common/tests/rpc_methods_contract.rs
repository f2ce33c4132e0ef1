use std::collections::BTreeSet;

use folio_common::protocol::jsonrpc::SUPPORTED_PROTOCOL_VERSIONS;
use folio_common::protocol::rpc_methods::IMPLEMENTED_METHODS;

fn load_contract() -> serde_json::Value {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../contracts/jsonrpc-methods.json");
    let content = std::fs::read_to_string(path).expect("contract file should be readable");
    serde_json::from_str(&content).expect("contract file should be valid JSON")
}

#[test]
fn implemented_methods_match_contract() {
    let contract = load_contract();
    let expected: BTreeSet<&str> = contract["implemented_methods"]
        .as_array()
        .expect("implemented_methods should be an array")
        .iter()
        .map(|v| v.as_str().expect("method should be a string"))
        .collect();

    let actual: BTreeSet<&str> = IMPLEMENTED_METHODS.iter().copied().collect();
    assert_eq!(actual, expected, "IMPLEMENTED_METHODS diverged from contract");
}

#[test]
fn rpc_protocol_versions_match_contract() {
    let contract = load_contract();
    let expected: Vec<&str> = contract["rpc_protocol_versions"]
        .as_array()
        .expect("rpc_protocol_versions should be an array")
        .iter()
        .map(|v| v.as_str().expect("version should be a string"))
        .collect();

    assert_eq!(
        SUPPORTED_PROTOCOL_VERSIONS,
        &expected[..],
        "SUPPORTED_PROTOCOL_VERSIONS diverged from contract"
    );
}

#[test]
fn implemented_methods_have_no_duplicates() {
    let unique: BTreeSet<&str> = IMPLEMENTED_METHODS.iter().copied().collect();
    assert_eq!(unique.len(), IMPLEMENTED_METHODS.len(), "duplicate method constant");
}
