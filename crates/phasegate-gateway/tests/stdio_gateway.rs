//! Drives the gateway through its line transport.

use phasegate_gateway::{serve, SessionGateway};
use phasegate_kernel::PhasegateKernel;
use phasegate_types::config::PhasegateConfig;
use serde_json::Value;
use std::sync::Arc;

async fn gateway(dir: &tempfile::TempDir) -> SessionGateway {
    let kernel = PhasegateKernel::boot_with_config(PhasegateConfig::with_data_dir(dir.path()))
        .await
        .unwrap();
    SessionGateway::new(Arc::new(kernel))
}

async fn run(gw: &SessionGateway, input: &str) -> Vec<Value> {
    let mut output = Vec::new();
    serve(gw, input.as_bytes(), &mut output).await.unwrap();
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn test_session_handshake_and_catalogs() {
    let dir = tempfile::tempdir().unwrap();
    let gw = gateway(&dir).await;
    let input = [
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        "",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
        r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#,
        r#"{"jsonrpc":"2.0","id":4,"method":"prompts/list"}"#,
    ]
    .join("\n");

    let responses = run(&gw, &input).await;
    assert_eq!(responses.len(), 4);
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(responses[1]["result"]["tools"].as_array().unwrap().len(), 10);
    assert_eq!(responses[2]["result"]["resources"].as_array().unwrap().len(), 5);
    assert_eq!(responses[3]["result"]["prompts"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_loop_survives_bad_lines() {
    let dir = tempfile::tempdir().unwrap();
    let gw = gateway(&dir).await;
    let input = [
        "this is not json",
        r#"{"jsonrpc":"2.0","id":2,"method":"no/such/method"}"#,
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"agent_nobody","arguments":{"task":"x"}}}"#,
        r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"agent_architect","arguments":{"task":"Sketch the modules"}}}"#,
    ]
    .join("\n");

    let responses = run(&gw, &input).await;
    assert_eq!(responses.len(), 4);
    assert_eq!(responses[0]["error"]["code"], -32700);
    assert_eq!(responses[1]["error"]["code"], -32603);
    assert_eq!(responses[2]["error"]["code"], -32603);
    assert_eq!(responses[3]["id"], 4);
    let result = &responses[3]["result"];
    assert_eq!(result["content"][0]["type"], "text");
    assert!(result["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("Sketch the modules"));
    assert!(result["data"]["sessionId"]
        .as_str()
        .unwrap()
        .starts_with("Architect-"));

    let conversations = std::fs::read_dir(dir.path().join("conversations"))
        .unwrap()
        .count();
    assert_eq!(conversations, 1);
}

#[tokio::test]
async fn test_oversized_line_rejected_then_continues() {
    let dir = tempfile::tempdir().unwrap();
    let gw = gateway(&dir).await;
    let huge = format!(
        r#"{{"jsonrpc":"2.0","id":1,"method":"ping","params":{{"pad":"{}"}}}}"#,
        "x".repeat(phasegate_gateway::transport::MAX_LINE_BYTES)
    );
    let input = format!("{huge}\n{}\n", r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#);

    let responses = run(&gw, &input).await;
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["error"]["code"], -32700);
    assert!(responses[0]["id"].is_null());
    assert_eq!(responses[1]["id"], 2);
    assert!(responses[1]["result"].is_object());
}
