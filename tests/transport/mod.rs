//! Transport tests against real child processes.

mod bridge_test;

/// Verify the public transport types are exported from the library.
#[test]
fn test_transport_types_exported() {
    use aider_mcp_client::transport::{
        BridgeError, Diagnostics, EncodingError, ExchangeState, LineAccumulator, SpawnError,
        StdioTransport, ToolRequest, TransportOutcome,
    };

    let _ = LineAccumulator::new();
    let _ = StdioTransport::new("npx", vec![]);
    let _ = Diagnostics::default();
    let _ = ExchangeState::Idle;
    let _ = TransportOutcome::NoResponse;
    let _: fn() -> BridgeError = || BridgeError::Encoding(EncodingError::EmptyToolName);
    let _: fn() -> SpawnError = || SpawnError::NotFound("npx".to_string());
    assert!(ToolRequest::new("", serde_json::Map::new()).is_err());
}
