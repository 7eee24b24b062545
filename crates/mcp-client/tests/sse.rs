use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use mcp_client::{
    ClientCapabilities, ClientInfo, McpClient, McpClientImpl, McpService, SseTransport,
};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use warp::Filter;

fn reply_to(request: &Value) -> Option<Value> {
    let id = request.get("id")?.clone();
    let result = match request["method"].as_str()? {
        "initialize" => json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "weather", "version": "0.1.0"}
        }),
        "tools/list" => json!({
            "tools": [{
                "name": "get_weather",
                "description": "Current weather for a city",
                "inputSchema": {"type": "object", "properties": {"city": {"type": "string"}}}
            }]
        }),
        "tools/call" => json!({
            "content": [{"type": "text", "text": "15°C, cloudy"}],
            "isError": false
        }),
        _ => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": "Method not found"}
            }))
        }
    };
    Some(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

/// A minimal MCP server: GET /sse streams replies, POST /message accepts requests.
async fn spawn_weather_server() -> SocketAddr {
    let (tx, _) = broadcast::channel::<String>(32);

    let sse_tx = tx.clone();
    let sse = warp::path("sse").and(warp::get()).map(move || {
        let mut rx = sse_tx.subscribe();
        let events = async_stream::stream! {
            yield Ok::<_, Infallible>(
                warp::sse::Event::default().event("endpoint").data("/message?sessionId=1"),
            );
            while let Ok(data) = rx.recv().await {
                yield Ok(warp::sse::Event::default().event("message").data(data));
            }
        };
        warp::sse::reply(warp::sse::keep_alive().stream(events))
    });

    let post_tx = tx.clone();
    let message = warp::path("message")
        .and(warp::post())
        .and(warp::body::json())
        .map(move |request: Value| {
            if let Some(reply) = reply_to(&request) {
                let _ = post_tx.send(reply.to_string());
            }
            warp::reply::with_status("Accepted", warp::http::StatusCode::ACCEPTED)
        });

    let (addr, server) = warp::serve(sse.or(message)).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

#[tokio::test]
async fn test_sse_client_round_trip() {
    let addr = spawn_weather_server().await;
    let transport = SseTransport::new(format!("http://{}/sse", addr));
    let service = McpService::with_timeout(transport, Duration::from_secs(10));
    service.start().await.unwrap();
    let client = McpClientImpl::new(service);

    let info = ClientInfo {
        name: "sse-test".to_string(),
        version: "1.0.0".to_string(),
    };
    let init = client
        .initialize(info, ClientCapabilities::tools_resources_prompts())
        .await
        .unwrap();
    assert_eq!(init.server_info.name, "weather");

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.tools[0].name, "get_weather");

    let result = client
        .call_tool("get_weather", json!({"city": "Paris"}))
        .await
        .unwrap();
    assert_eq!(result.content[0].as_text(), Some("15°C, cloudy"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_sse_transport_starts_lazily() {
    let addr = spawn_weather_server().await;
    let service = McpService::with_timeout(
        SseTransport::new(format!("http://{}/sse", addr)),
        Duration::from_secs(10),
    );
    let client = McpClientImpl::new(service);

    // No explicit start: the first request opens the stream
    let result = client
        .call_tool("get_weather", json!({"city": "Oslo"}))
        .await
        .unwrap();
    assert!(!result.is_error);
}
