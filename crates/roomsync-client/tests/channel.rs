//! Channel tests against a real broker and against misbehaving endpoints.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};

use roomsync_broker::{Broker, BrokerHandle};
use roomsync_client::prelude::*;
use roomsync_client::HeartbeatConfig;
use roomsync_protocol::{
    decode_packets, CodeChangePayload, Command, Frame, JoinPayload, Packet,
};
use roomsync_transport::{
    ClientStream, Connector, TransportError, WebSocketConnection, WebSocketConnector,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;

async fn start_broker() -> (String, BrokerHandle) {
    let broker = Broker::builder()
        .bind("127.0.0.1:0")
        .build()
        .await
        .expect("broker should build");
    let addr = broker.local_addr().expect("local addr").to_string();
    let handle = broker.handle();
    tokio::spawn(async move {
        let _ = broker.run().await;
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    (format!("ws://{addr}/ws"), handle)
}

fn fast_config() -> ClientConfig {
    ClientConfig::default()
        .with_connect_timeout(Duration::from_millis(500))
        .with_reconnect_delay(Duration::from_millis(50))
        .with_heartbeat(HeartbeatConfig::disabled())
}

fn join_event(room: &str, name: &str) -> RoomEvent {
    RoomEvent::Join(JoinPayload {
        room_id: RoomId::new(room),
        username: Some(name.to_string()),
        photo_url: None,
        email: None,
    })
}

/// Polls `check` until it holds or two seconds pass.
async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition never held");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_open_reports_session_id() {
    let (endpoint, _broker) = start_broker().await;

    let channel = Channel::open(&endpoint, fast_config()).await.expect("open");

    assert_eq!(channel.state(), ConnectionState::Open);
    assert_eq!(channel.session_id().map(|s| s.as_str().len()), Some(32));
    channel.disconnect().await;
}

#[tokio::test]
async fn test_open_refused_is_connection_failed() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (events, mut rx) = broadcast::channel(16);
    let result = Channel::open_with(
        WebSocketConnector,
        &format!("ws://{addr}/ws"),
        fast_config(),
        events,
    )
    .await;

    assert!(matches!(result, Err(ClientError::ConnectionFailed(_))));
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen.first(),
        Some(&ConnectionEvent::StateChanged(ConnectionState::Connecting))
    );
    assert_eq!(
        seen.last(),
        Some(&ConnectionEvent::StateChanged(ConnectionState::Failed))
    );
}

#[tokio::test]
async fn test_open_unresponsive_endpoint_times_out() {
    // Accepts TCP but never answers the WebSocket upgrade.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _hold = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let config = fast_config().with_connect_timeout(Duration::from_millis(200));
    let result = Channel::open(&format!("ws://{addr}/ws"), config).await;

    match result {
        Err(ClientError::ConnectionTimeout(limit)) => {
            assert_eq!(limit, Duration::from_millis(200));
        }
        other => panic!("expected ConnectionTimeout, got {other:?}"),
    }
}

/// Never finishes dialing.
struct Blackhole;

impl Connector for Blackhole {
    type Connection = WebSocketConnection<ClientStream>;
    type Error = TransportError;

    async fn connect(&self, _endpoint: &str) -> Result<Self::Connection, Self::Error> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_open_default_timeout_is_ten_seconds() {
    let (events, mut rx) = broadcast::channel(16);
    let started = tokio::time::Instant::now();

    let result =
        Channel::open_with(Blackhole, "ws://nowhere/ws", ClientConfig::default(), events).await;

    assert!(matches!(
        result,
        Err(ClientError::ConnectionTimeout(limit)) if limit == Duration::from_secs(10)
    ));
    assert_eq!(started.elapsed(), Duration::from_secs(10));
    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        last = Some(event);
    }
    assert_eq!(last, Some(ConnectionEvent::StateChanged(ConnectionState::Failed)));
}

#[tokio::test]
async fn test_subscribe_delivers_only_matching_kind() {
    let (endpoint, _broker) = start_broker().await;
    let channel = Channel::open(&endpoint, fast_config()).await.expect("open");
    let room = RoomId::new("abc");

    let joined = Arc::new(Mutex::new(Vec::new()));
    let changes = Arc::new(Mutex::new(Vec::new()));
    {
        let joined = Arc::clone(&joined);
        channel.subscribe(EventKind::Joined, &room, move |event, _| {
            joined.lock().unwrap().push(event);
        });
    }
    {
        let changes = Arc::clone(&changes);
        channel.subscribe(EventKind::CodeChange, &room, move |event, _| {
            changes.lock().unwrap().push(event);
        });
    }

    channel.publish(&join_event("abc", "Ada"));
    channel.publish(&RoomEvent::CodeChange(CodeChangePayload {
        room_id: room.clone(),
        code: Some("x=1".into()),
    }));

    eventually(|| joined.lock().unwrap().len() == 1 && changes.lock().unwrap().len() == 1).await;
    assert!(matches!(joined.lock().unwrap()[0], RoomEvent::Joined(_)));
    assert!(matches!(changes.lock().unwrap()[0], RoomEvent::CodeChange(_)));
    channel.disconnect().await;
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let (endpoint, _broker) = start_broker().await;
    let channel = Channel::open(&endpoint, fast_config()).await.expect("open");
    let room = RoomId::new("abc");

    let count = Arc::new(Mutex::new(0usize));
    let handle = {
        let count = Arc::clone(&count);
        channel.subscribe(EventKind::Joined, &room, move |_, _| {
            *count.lock().unwrap() += 1;
        })
    };
    channel.publish(&join_event("abc", "Ada"));
    eventually(|| *count.lock().unwrap() == 1).await;

    handle.unsubscribe();
    channel.publish(&join_event("abc", "Ada"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*count.lock().unwrap(), 1);
    assert_eq!(channel.subscription_count(), 0);
    channel.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_twice_is_noop() {
    let (endpoint, _broker) = start_broker().await;
    let channel = Channel::open(&endpoint, fast_config()).await.expect("open");
    channel.subscribe(EventKind::Joined, &RoomId::new("abc"), |_, _| {});

    channel.disconnect().await;
    channel.disconnect().await;

    assert_eq!(channel.state(), ConnectionState::Closed);
    assert_eq!(channel.subscription_count(), 0);
    assert_eq!(channel.session_id(), None);
}

#[tokio::test]
async fn test_publish_after_disconnect_is_dropped() {
    let (endpoint, _broker) = start_broker().await;
    let channel = Channel::open(&endpoint, fast_config()).await.expect("open");
    channel.disconnect().await;

    // Must not panic or reopen anything.
    channel.publish(&join_event("abc", "Ada"));
    assert_eq!(channel.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_reconnects_and_resubscribes_after_broker_restart() {
    let (endpoint, broker) = start_broker().await;
    let addr = endpoint
        .trim_start_matches("ws://")
        .trim_end_matches("/ws")
        .to_string();
    let channel = Channel::open(&endpoint, fast_config()).await.expect("open");
    let first_session = channel.session_id();
    let room = RoomId::new("abc");

    let joined = Arc::new(Mutex::new(0usize));
    {
        let joined = Arc::clone(&joined);
        channel.subscribe(EventKind::Joined, &room, move |_, _| {
            *joined.lock().unwrap() += 1;
        });
    }
    let mut state = channel.watch_state();

    broker.shutdown();
    state
        .wait_for(|s| *s == ConnectionState::Connecting)
        .await
        .expect("channel alive");

    // The old accept loop releases the port asynchronously.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    let restarted = loop {
        match Broker::builder().bind(&addr).build().await {
            Ok(broker) => break broker,
            Err(e) => {
                assert!(tokio::time::Instant::now() < deadline, "rebind failed: {e}");
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
    };
    tokio::spawn(async move {
        let _ = restarted.run().await;
    });

    tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == ConnectionState::Open),
    )
    .await
    .expect("reconnected within 2s")
    .expect("channel alive");
    assert_ne!(channel.session_id(), first_session);

    // The replayed subscription is live on the new broker.
    channel.publish(&join_event("abc", "Ada"));
    eventually(|| *joined.lock().unwrap() == 1).await;
    channel.disconnect().await;
}

/// Answers CONNECT advertising `heart-beat:100,100`, then never sends
/// anything. Counts the heartbeats it receives.
async fn start_silent_broker() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let heartbeats = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&heartbeats);
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            let Ok(packets) = decode_packets(&msg.into_data()) else {
                continue;
            };
            for packet in packets {
                match packet {
                    Packet::Heartbeat => {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                    Packet::Frame(f) if f.command == Command::Connect => {
                        let connected = Frame::new(Command::Connected)
                            .header("version", "1.2")
                            .header("session", "stub")
                            .header("heart-beat", "100,100");
                        let text = String::from_utf8(connected.encode()).unwrap();
                        ws.send(Message::Text(text.into())).await.unwrap();
                    }
                    Packet::Frame(_) => {}
                }
            }
        }
        // Keep the listener so redials queue instead of being refused.
        std::future::pending::<()>().await;
        drop(listener);
    });
    (format!("ws://{addr}/ws"), heartbeats)
}

#[tokio::test]
async fn test_silent_broker_triggers_reconnect_after_three_intervals() {
    let (endpoint, heartbeats) = start_silent_broker().await;
    let config = fast_config().with_heartbeat(HeartbeatConfig {
        outgoing: Duration::from_millis(100),
        incoming: Duration::from_millis(100),
        silence_factor: 3,
    });

    let channel = Channel::open(&endpoint, config).await.expect("open");
    let opened = tokio::time::Instant::now();
    let mut state = channel.watch_state();

    tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == ConnectionState::Connecting),
    )
    .await
    .expect("silence detected within 2s")
    .expect("channel alive");

    assert!(
        opened.elapsed() >= Duration::from_millis(250),
        "dropped after {:?}, before three intervals",
        opened.elapsed()
    );
    assert!(
        heartbeats.load(Ordering::SeqCst) >= 2,
        "client sent {} heartbeats",
        heartbeats.load(Ordering::SeqCst)
    );
    channel.disconnect().await;
}

#[tokio::test]
async fn test_heartbeats_keep_idle_connection_open() {
    let broker = Broker::builder()
        .bind("127.0.0.1:0")
        .heartbeat(Duration::from_millis(100), Duration::from_millis(100))
        .build()
        .await
        .expect("broker should build");
    let endpoint = format!("ws://{}/ws", broker.local_addr().unwrap());
    tokio::spawn(async move {
        let _ = broker.run().await;
    });
    let config = fast_config().with_heartbeat(HeartbeatConfig {
        outgoing: Duration::from_millis(100),
        incoming: Duration::from_millis(100),
        silence_factor: 3,
    });

    let channel = Channel::open(&endpoint, config).await.expect("open");
    let session = channel.session_id();
    let mut events = channel.events();
    tokio::time::sleep(Duration::from_millis(800)).await;

    assert_eq!(channel.state(), ConnectionState::Open);
    assert_eq!(channel.session_id(), session);
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, ConnectionEvent::StateChanged(_)),
            "unexpected {event:?}"
        );
    }
    channel.disconnect().await;
}
