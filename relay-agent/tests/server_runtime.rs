use relay_agent::mcp::server::ToolServer;
use relay_agent::tools::{AddNumbersTool, RandomNumberTool};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

struct Peer {
    writer: WriteHalf<DuplexStream>,
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    server: JoinHandle<std::io::Result<()>>,
}

impl Peer {
    fn start() -> Self {
        let (client, server_side) = tokio::io::duplex(8192);
        let (server_read, server_write) = tokio::io::split(server_side);
        let mut server = ToolServer::new("test", "0.0.1")
            .with_tool(Box::new(AddNumbersTool))
            .with_tool(Box::new(RandomNumberTool));
        let server = tokio::spawn(async move { server.serve(server_read, server_write).await });

        let (read, writer) = tokio::io::split(client);
        Self {
            writer,
            lines: BufReader::new(read).lines(),
            server,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn request(&mut self, message: Value) -> Value {
        self.send(&message.to_string()).await;
        let line = self.lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    async fn finish(self) {
        drop(self.writer);
        drop(self.lines);
        self.server.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_handshake_and_tools_list() {
    let mut peer = Peer::start();

    let init = peer
        .request(json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "t", "version": "1"}
            }
        }))
        .await;
    assert_eq!(init["id"], 1);
    assert_eq!(init["result"]["serverInfo"]["name"], "test");
    assert_eq!(init["result"]["protocolVersion"], "2024-11-05");

    peer.send(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await;

    let list = peer
        .request(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .await;
    let names: Vec<&str> = list["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["add_numbers", "random_number"]);
    assert!(list["result"]["tools"][0]["inputSchema"]["properties"]["a"].is_object());

    peer.finish().await;
}

#[tokio::test]
async fn test_tools_call_success_and_tool_error() {
    let mut peer = Peer::start();

    let sum = peer
        .request(json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "add_numbers", "arguments": {"a": 2, "b": 3}}
        }))
        .await;
    assert_eq!(sum["result"]["content"][0]["type"], "text");
    assert_eq!(sum["result"]["content"][0]["text"], "5.0");
    assert_ne!(sum["result"]["isError"], true);

    let bad = peer
        .request(json!({
            "jsonrpc": "2.0", "id": 4, "method": "tools/call",
            "params": {"name": "add_numbers", "arguments": {"a": "two"}}
        }))
        .await;
    assert_eq!(bad["result"]["isError"], true);
    assert!(bad.get("error").is_none());

    let unknown = peer
        .request(json!({
            "jsonrpc": "2.0", "id": 5, "method": "tools/call",
            "params": {"name": "nope", "arguments": {}}
        }))
        .await;
    assert_eq!(unknown["result"]["isError"], true);

    peer.finish().await;
}

#[tokio::test]
async fn test_protocol_errors() {
    let mut peer = Peer::start();

    let missing = peer
        .request(json!({"jsonrpc": "2.0", "id": 6, "method": "resources/list"}))
        .await;
    assert_eq!(missing["id"], 6);
    assert_eq!(missing["error"]["code"], -32601);

    peer.send("{not json").await;
    let line = peer.lines.next_line().await.unwrap().unwrap();
    let parse: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(parse["error"]["code"], -32700);
    assert!(parse["id"].is_null());

    let ping = peer
        .request(json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}))
        .await;
    assert_eq!(ping["result"], json!({}));

    peer.finish().await;
}
