use relay_agent::mcp::server::ToolServer;
use relay_agent::mcp::{MCPClient, MCPError, TransportConfig, TransportKind};
use relay_agent::tools::AddNumbersTool;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream, WriteHalf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};

const SESSION_ENDPOINT: &str = "/messages/?session_id=1";

struct Request {
    method: String,
    path: String,
    body: String,
}

// Minimal HTTP/1.1 server speaking the SSE flavour of MCP. A GET opens the
// event stream, POSTs are forwarded to an in-process `ToolServer` and its
// replies come back as `message` events.
struct SseStub {
    endpoint: Option<&'static str>,
    reject_posts: bool,
    posts: std::sync::Mutex<Vec<(String, String)>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    server_in: Mutex<WriteHalf<DuplexStream>>,
}

impl SseStub {
    async fn start(endpoint: Option<&'static str>, reject_posts: bool) -> (String, Arc<Self>) {
        let (client_side, server_side) = tokio::io::duplex(8192);
        let (server_read, server_write) = tokio::io::split(server_side);
        let mut server = ToolServer::new("sse-test", "0.0.1").with_tool(Box::new(AddNumbersTool));
        tokio::spawn(async move { server.serve(server_read, server_write).await });

        let (replies, server_in) = tokio::io::split(client_side);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(replies).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if events_tx
                    .send(format!("event: message\r\ndata: {line}\r\n\r\n"))
                    .is_err()
                {
                    break;
                }
            }
        });

        let stub = Arc::new(Self {
            endpoint,
            reject_posts,
            posts: std::sync::Mutex::new(Vec::new()),
            events: Mutex::new(Some(events_rx)),
            server_in: Mutex::new(server_in),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let root = format!("http://{}", listener.local_addr().unwrap());
        let accepting = Arc::clone(&stub);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(Arc::clone(&accepting).handle(stream));
            }
        });

        (root, stub)
    }

    async fn handle(self: Arc<Self>, stream: TcpStream) {
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);

        while let Some(request) = read_request(&mut reader).await {
            if request.method == "GET" {
                self.stream_events(&mut write).await;
                return;
            }

            let method = serde_json::from_str::<Value>(&request.body)
                .ok()
                .and_then(|m| m["method"].as_str().map(str::to_string))
                .unwrap_or_default();
            self.posts.lock().unwrap().push((request.path, method));

            let reply: &[u8] = if self.reject_posts {
                b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n"
            } else {
                let mut server_in = self.server_in.lock().await;
                server_in.write_all(request.body.as_bytes()).await.unwrap();
                server_in.write_all(b"\n").await.unwrap();
                server_in.flush().await.unwrap();
                b"HTTP/1.1 202 Accepted\r\nContent-Length: 8\r\n\r\nAccepted"
            };
            if write.write_all(reply).await.is_err() {
                return;
            }
        }
    }

    async fn stream_events(&self, write: &mut OwnedWriteHalf) {
        let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\
                    Cache-Control: no-cache\r\nConnection: close\r\n\r\n";
        write.write_all(head.as_bytes()).await.unwrap();

        let Some(endpoint) = self.endpoint else {
            write.write_all(b": connected\r\n\r\n").await.unwrap();
            let _ = write.shutdown().await;
            return;
        };
        let announce = format!("event: endpoint\r\ndata: {endpoint}\r\n\r\n");
        write.write_all(announce.as_bytes()).await.unwrap();

        let Some(mut events) = self.events.lock().await.take() else {
            return;
        };
        while let Some(frame) = events.recv().await {
            if write.write_all(frame.as_bytes()).await.is_err() {
                break;
            }
        }
    }

    fn posts(&self) -> Vec<(String, String)> {
        self.posts.lock().unwrap().clone()
    }
}

async fn read_request(reader: &mut BufReader<OwnedReadHalf>) -> Option<Request> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut length = 0;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).await.ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((_, value)) = header
            .split_once(':')
            .filter(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        {
            length = value.trim().parse().ok()?;
        }
    }

    let mut body = vec![0; length];
    reader.read_exact(&mut body).await.ok()?;
    Some(Request {
        method,
        path,
        body: String::from_utf8(body).ok()?,
    })
}

fn sse(url: String) -> TransportConfig {
    TransportConfig::Sse { url }
}

#[tokio::test]
async fn test_sse_handshake_list_and_call() {
    let (root, stub) = SseStub::start(Some(SESSION_ENDPOINT), false).await;
    let client = MCPClient::connect("remote", &sse(format!("{root}/sse")))
        .await
        .unwrap();
    assert_eq!(client.kind(), TransportKind::Sse);

    let tools = client.list_tools().await.unwrap();
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["add_numbers"]);

    let result = client
        .call_tool("add_numbers", json!({"a": 2, "b": 3}))
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(result.joined_text(), "5.0");

    let posts = stub.posts();
    let methods: Vec<_> = posts.iter().map(|(_, m)| m.as_str()).collect();
    assert_eq!(
        methods,
        vec!["initialize", "notifications/initialized", "tools/list", "tools/call"]
    );
    assert!(posts.iter().all(|(path, _)| path == SESSION_ENDPOINT));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_endpoint_resolves_against_stream_url() {
    let (root, stub) = SseStub::start(Some("messages?session_id=7"), false).await;
    let client = MCPClient::connect("nested", &sse(format!("{root}/mcp/sse")))
        .await
        .unwrap();

    client.list_tools().await.unwrap();
    let posts = stub.posts();
    assert!(!posts.is_empty());
    assert!(posts.iter().all(|(path, _)| path == "/mcp/messages?session_id=7"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_stream_closed_before_endpoint_fails_connection() {
    let (root, stub) = SseStub::start(None, false).await;
    let result = MCPClient::connect("silent", &sse(format!("{root}/sse"))).await;

    assert!(matches!(result, Err(MCPError::ConnectionFailed(_))));
    assert!(stub.posts().is_empty());
}

#[tokio::test]
async fn test_rejected_post_fails_handshake() {
    let (root, stub) = SseStub::start(Some(SESSION_ENDPOINT), true).await;
    let result = MCPClient::connect("grumpy", &sse(format!("{root}/sse"))).await;

    assert!(matches!(result, Err(MCPError::ProtocolError(_))));
    assert_eq!(
        stub.posts(),
        vec![(SESSION_ENDPOINT.to_string(), "initialize".to_string())]
    );
}

#[tokio::test]
async fn test_unreachable_server_fails_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = MCPClient::connect("gone", &sse(format!("http://{addr}/sse"))).await;
    assert!(matches!(result, Err(MCPError::ConnectionFailed(_))));
}

#[tokio::test]
async fn test_invalid_url_is_a_config_error() {
    let result = MCPClient::connect("typo", &sse("not a url".to_string())).await;
    assert!(matches!(result, Err(MCPError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_close_fails_later_calls() {
    let (root, _stub) = SseStub::start(Some(SESSION_ENDPOINT), false).await;
    let client = MCPClient::connect("closing", &sse(format!("{root}/sse")))
        .await
        .unwrap();

    client.close().await.unwrap();
    client.close().await.unwrap();

    let result = client.call_tool("add_numbers", json!({"a": 1, "b": 1})).await;
    assert!(matches!(result, Err(MCPError::Disconnected)));
}
