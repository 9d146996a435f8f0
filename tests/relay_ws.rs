// End-to-end relay behaviour over real WebSocket connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use edgecast_lib::diagnostics::stats::PipelineStats;
use edgecast_lib::relay::{self, RelayHub, RelayState};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    hub: Arc<RelayHub>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<(), relay::RelayError>>,
}

async fn start_server() -> TestServer {
    let listener = relay::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hub = Arc::new(RelayHub::default());
    let state = RelayState {
        hub: Arc::clone(&hub),
        stats: Arc::new(PipelineStats::default()),
    };
    let (shutdown, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(relay::serve(listener, state, async {
        let _ = rx.await;
    }));
    TestServer {
        addr,
        hub,
        shutdown,
        task,
    }
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn wait_for_peers(hub: &RelayHub, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while hub.peer_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("hub never reached {expected} peers"));
}

async fn next_text(client: &mut Client) -> String {
    let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for a message")
        .expect("stream ended")
        .expect("websocket error");
    match msg {
        Message::Text(text) => text.as_str().to_owned(),
        other => panic!("unexpected message: {other:?}"),
    }
}

async fn assert_silent(client: &mut Client) {
    let got = tokio::time::timeout(Duration::from_millis(300), client.next()).await;
    assert!(got.is_err(), "expected no message, got {got:?}");
}

async fn shutdown(server: TestServer) {
    server.shutdown.send(()).unwrap();
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn text_reaches_every_other_viewer_but_not_the_sender() {
    let server = start_server().await;
    let mut a = connect(server.addr).await;
    let mut b = connect(server.addr).await;
    let mut c = connect(server.addr).await;
    wait_for_peers(&server.hub, 3).await;

    a.send(Message::Text("hello".into())).await.unwrap();

    assert_eq!(next_text(&mut b).await, "hello");
    assert_eq!(next_text(&mut c).await, "hello");
    assert_silent(&mut a).await;

    drop((a, b, c));
    shutdown(server).await;
}

#[tokio::test]
async fn departed_viewer_does_not_break_relay_to_the_rest() {
    let server = start_server().await;
    let mut a = connect(server.addr).await;
    let mut b = connect(server.addr).await;
    let mut c = connect(server.addr).await;
    wait_for_peers(&server.hub, 3).await;

    b.close(None).await.unwrap();
    drop(b);
    wait_for_peers(&server.hub, 2).await;

    a.send(Message::Text("still here".into())).await.unwrap();
    assert_eq!(next_text(&mut c).await, "still here");
    assert_silent(&mut a).await;

    drop((a, c));
    shutdown(server).await;
}

#[tokio::test]
async fn broadcast_reaches_all_connected_viewers() {
    let server = start_server().await;
    let mut a = connect(server.addr).await;
    let mut b = connect(server.addr).await;
    wait_for_peers(&server.hub, 2).await;

    let payload = r#"{"image":"","fps":30.0,"resolution":"2x2","processingTime":1.5}"#;
    assert_eq!(server.hub.broadcast(payload), 2);

    for client in [&mut a, &mut b] {
        let text = next_text(client).await;
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["resolution"], "2x2");
        assert_eq!(value["processingTime"], 1.5);
    }

    drop((a, b));
    shutdown(server).await;
}
