#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use realtime_link::ws::config::Config;
use realtime_link::ws::{CloseCode, ConnectionManager, Event};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

const WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
enum ServerCommand {
    /// Send a text frame
    Text(String),
    /// Start a close handshake with this code
    Close(u16),
    /// Drop the socket without a close handshake
    Kill,
}

/// Mock WebSocket server.
struct MockWsServer {
    addr: SocketAddr,
    /// Commands applied to ALL connected clients
    command_tx: broadcast::Sender<ServerCommand>,
    /// Text frames and close codes received from clients
    received_rx: mpsc::UnboundedReceiver<String>,
    /// One unit per accepted WebSocket handshake
    accepted_rx: mpsc::UnboundedReceiver<()>,
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (command_tx, _) = broadcast::channel::<ServerCommand>(100);
        let (received_tx, received_rx) = mpsc::unbounded_channel::<String>();
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel::<()>();

        let broadcast_tx = command_tx.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };

                let (mut write, mut read) = ws_stream.split();
                let received_tx = received_tx.clone();
                let mut command_rx = broadcast_tx.subscribe();
                drop(accepted_tx.send(()));

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        drop(received_tx.send(text.to_string()));
                                    }
                                    Some(Ok(Message::Close(frame))) => {
                                        let code = frame.map_or(1005, |f| u16::from(f.code));
                                        drop(received_tx.send(format!("close:{code}")));
                                    }
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                            command = command_rx.recv() => {
                                match command {
                                    Ok(ServerCommand::Text(text)) => {
                                        if write.send(Message::Text(text.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Ok(ServerCommand::Close(code)) => {
                                        let frame = CloseFrame {
                                            code: code.into(),
                                            reason: "server closing".into(),
                                        };
                                        drop(write.send(Message::Close(Some(frame))).await);
                                    }
                                    Ok(ServerCommand::Kill) | Err(_) => break,
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            command_tx,
            received_rx,
            accepted_rx,
        }
    }

    fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    fn command(&self, command: ServerCommand) {
        drop(self.command_tx.send(command));
    }

    async fn recv(&mut self) -> Option<String> {
        timeout(WAIT, self.received_rx.recv()).await.ok().flatten()
    }

    async fn accepted(&mut self) -> bool {
        timeout(WAIT, self.accepted_rx.recv()).await.ok().flatten().is_some()
    }
}

fn fast_config() -> Config {
    Config::builder()
        .reconnect_delay(Duration::from_millis(100))
        .connect_timeout(Duration::from_secs(2))
        .build()
}

async fn next_event(events: &mut broadcast::Receiver<Event>) -> Event {
    timeout(WAIT, events.recv()).await.unwrap().unwrap()
}

/// Skip events until a close arrives.
async fn next_close(events: &mut broadcast::Receiver<Event>) -> realtime_link::ws::CloseFrame {
    loop {
        if let Event::Close(frame) = next_event(events).await {
            return frame;
        }
    }
}

#[tokio::test]
async fn round_trips_text_frames() {
    let mut server = MockWsServer::start().await;
    let manager = ConnectionManager::new(&server.ws_url("/realtime"), fast_config(), ()).unwrap();
    let mut events = manager.events();

    manager.connect();
    assert!(server.accepted().await);
    assert!(matches!(next_event(&mut events).await, Event::Open));

    manager.send(r#"{"type":"subscribe","payload":["balance"]}"#);
    assert_eq!(
        server.recv().await.as_deref(),
        Some(r#"{"type":"subscribe","payload":["balance"]}"#)
    );

    server.command(ServerCommand::Text(r#"{"type":"balance","payload":3}"#.to_owned()));
    match next_event(&mut events).await {
        Event::Message(payload) => assert_eq!(payload, r#"{"type":"balance","payload":3}"#),
        other => panic!("expected message, got {other:?}"),
    }
}

#[tokio::test]
async fn reconnects_after_connection_is_killed() {
    let mut server = MockWsServer::start().await;
    let manager = ConnectionManager::new(&server.ws_url("/realtime"), fast_config(), ()).unwrap();
    let mut events = manager.events();

    manager.connect();
    assert!(server.accepted().await);
    assert!(matches!(next_event(&mut events).await, Event::Open));

    server.command(ServerCommand::Kill);

    assert_eq!(next_close(&mut events).await.code, CloseCode::ABNORMAL);
    assert!(server.accepted().await, "client did not reconnect");
    assert!(matches!(next_event(&mut events).await, Event::Open));
}

#[tokio::test]
async fn server_going_away_triggers_reconnect() {
    let mut server = MockWsServer::start().await;
    let manager = ConnectionManager::new(&server.ws_url("/realtime"), fast_config(), ()).unwrap();
    let mut events = manager.events();

    manager.connect();
    assert!(server.accepted().await);
    assert!(matches!(next_event(&mut events).await, Event::Open));

    server.command(ServerCommand::Close(1001));

    assert_eq!(next_close(&mut events).await.code, CloseCode::GOING_AWAY);
    assert!(server.accepted().await, "client did not reconnect");
}

#[tokio::test]
async fn server_normal_close_is_final() {
    let mut server = MockWsServer::start().await;
    let manager = ConnectionManager::new(&server.ws_url("/realtime"), fast_config(), ()).unwrap();
    let mut events = manager.events();

    manager.connect();
    assert!(server.accepted().await);
    assert!(matches!(next_event(&mut events).await, Event::Open));

    server.command(ServerCommand::Close(1000));

    assert_eq!(next_close(&mut events).await.code, CloseCode::NORMAL);
    assert!(!server.accepted().await, "client reconnected after a normal close");
}

#[tokio::test]
async fn disconnect_sends_normal_close() {
    let mut server = MockWsServer::start().await;
    let manager = ConnectionManager::new(&server.ws_url("/realtime"), fast_config(), ()).unwrap();
    let mut events = manager.events();

    manager.connect();
    assert!(server.accepted().await);
    assert!(matches!(next_event(&mut events).await, Event::Open));

    manager.disconnect();

    assert_eq!(next_close(&mut events).await.code, CloseCode::NORMAL);
    assert_eq!(server.recv().await.as_deref(), Some("close:1000"));
    assert!(!server.accepted().await);
}

#[tokio::test]
async fn unreachable_endpoint_keeps_retrying() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let manager =
        ConnectionManager::new(&format!("ws://{addr}/realtime"), fast_config(), ()).unwrap();
    let mut events = manager.events();

    manager.connect();

    for _ in 0..3 {
        assert!(matches!(next_event(&mut events).await, Event::Error(_)));
        assert_eq!(next_close(&mut events).await.code, CloseCode::ABNORMAL);
    }

    manager.disconnect();
}

#[cfg(feature = "feed")]
#[tokio::test]
async fn live_feed_over_websocket() {
    use realtime_link::feed::LiveFeed;

    let mut server = MockWsServer::start().await;
    let feed = LiveFeed::new(&server.ws_url("/realtime"), fast_config()).unwrap();
    let mut status = feed.connection_status();
    let mut ticks = Box::pin(feed.subscribe::<u32>("tick"));

    feed.connect();
    assert!(server.accepted().await);
    timeout(WAIT, status.wait_for(|connected| *connected))
        .await
        .unwrap()
        .unwrap();

    feed.send("subscribe", &"tick").unwrap();
    assert_eq!(
        server.recv().await.as_deref(),
        Some(r#"{"type":"subscribe","payload":"tick"}"#)
    );

    server.command(ServerCommand::Text(r#"{"type":"tick","payload":7}"#.to_owned()));
    let tick = timeout(WAIT, ticks.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(tick, 7);
}
