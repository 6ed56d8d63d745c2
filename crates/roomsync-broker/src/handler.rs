//! Per-connection handler: STOMP handshake, then frame routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   0. Finish the WebSocket upgrade
//!   1. Receive CONNECT → answer CONNECTED with a fresh session id
//!   2. Loop: write queued MESSAGE frames, read client frames, exchange
//!      heartbeats, drop the client if it goes silent
//!   3. On exit: forget the session, which broadcasts DISCONNECTED to its
//!      room
//!
//! Steps 0 and 1 share one `handshake_timeout` deadline.

use std::sync::Arc;

use rand::Rng;
use roomsync_protocol::{
    decode_packets, destination, Codec, Command, Frame, HeartBeat, Negotiated, Packet, RoomEvent,
    SocketId, STOMP_VERSION,
};
use roomsync_transport::{Connection, Handshake, TransportError};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::server::BrokerState;
use crate::topics::Outbox;
use crate::BrokerError;

/// Value of the `server` header in `CONNECTED`.
const SERVER_NAME: &str = concat!("roomsync-broker/", env!("CARGO_PKG_VERSION"));

/// Drop guard that forgets a client's session when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, the async lock is taken in a spawned task.
struct SessionGuard {
    session: SocketId,
    state: Arc<BrokerState>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let session = self.session.clone();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.hub.lock().await.drop_session(&session);
        });
    }
}

enum Flow {
    Continue,
    Close,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<H>(pending: H, state: Arc<BrokerState>) -> Result<(), BrokerError>
where
    H: Handshake<Error = TransportError>,
    H::Connection: Connection<Error = TransportError>,
{
    let deadline = Instant::now() + state.config.handshake_timeout;

    // --- Step 0: Upgrade ---
    let conn = match tokio::time::timeout_at(deadline, pending.complete()).await {
        Ok(result) => result?,
        Err(_) => return Err(BrokerError::Handshake("timed out waiting for upgrade".into())),
    };
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    // --- Step 1: Handshake ---
    let (session, heartbeat) = accept_stomp(&conn, &state, deadline).await?;
    tracing::info!(%conn_id, %session, "client connected");

    let _guard = SessionGuard {
        session: session.clone(),
        state: Arc::clone(&state),
    };

    // --- Step 2: Frame loop ---
    let (outbox, mut inbox) = mpsc::unbounded_channel::<Vec<u8>>();
    let mut shutdown = state.shutdown.clone();
    let mut beat = heartbeat.send_every.map(|every| {
        let mut interval = tokio::time::interval_at(Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    let silence_limit = heartbeat
        .expect_every
        .map(|every| every * state.config.silence_factor.max(1));
    let mut last_heard = Instant::now();

    let result = loop {
        let deadline = silence_limit.map(|limit| last_heard + limit);
        tokio::select! {
            Some(bytes) = inbox.recv() => {
                if let Err(e) = conn.send(&bytes).await {
                    break Err(e.into());
                }
            }
            incoming = conn.recv() => match incoming {
                Ok(Some(data)) => {
                    last_heard = Instant::now();
                    match handle_data(&conn, &state, &session, &outbox, &data).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Close) => {
                            tracing::info!(%session, "client disconnected");
                            break Ok(());
                        }
                        Err(e) => break Err(e),
                    }
                }
                Ok(None) => {
                    tracing::info!(%session, "connection closed");
                    break Ok(());
                }
                Err(e) => break Err(e.into()),
            },
            _ = tick(&mut beat) => {
                if let Err(e) = conn.send(b"\n").await {
                    break Err(e.into());
                }
            }
            _ = sleep_until(deadline) => {
                let limit = silence_limit.unwrap_or_default();
                tracing::info!(%session, ?limit, "client silent, dropping");
                break Err(BrokerError::Silent(limit));
            }
            _ = shutdown.changed() => {
                tracing::debug!(%session, "broker shutting down");
                break Ok(());
            }
        }
    };

    let _ = conn.close().await;
    // _guard drops here → session cleanup fires.
    result
}

/// Waits for CONNECT (or STOMP) and answers CONNECTED.
async fn accept_stomp<T>(
    conn: &T,
    state: &BrokerState,
    deadline: Instant,
) -> Result<(SocketId, Negotiated), BrokerError>
where
    T: Connection<Error = TransportError>,
{
    loop {
        let data = match tokio::time::timeout_at(deadline, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => return Err(BrokerError::Handshake("closed before CONNECT".into())),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(BrokerError::Handshake("timed out waiting for CONNECT".into())),
        };

        for packet in decode_packets(&data)? {
            let Packet::Frame(frame) = packet else {
                continue;
            };
            match frame.command {
                Command::Connect | Command::Stomp => {
                    if let Some(versions) = frame.get("accept-version") {
                        if !versions.split(',').any(|v| v.trim() == STOMP_VERSION) {
                            let reason = format!("unsupported version {versions:?}");
                            send_error(conn, &reason, "").await?;
                            return Err(BrokerError::Handshake(reason));
                        }
                    }
                    let theirs = match frame.get("heart-beat") {
                        Some(value) => HeartBeat::parse(value)?,
                        None => HeartBeat::default(),
                    };
                    let ours = state.config.advertised();
                    let session = SocketId::new(generate_session_id());

                    let connected = Frame::new(Command::Connected)
                        .header("version", STOMP_VERSION)
                        .header("heart-beat", ours.to_header())
                        .header("session", session.as_str())
                        .header("server", SERVER_NAME);
                    conn.send(&connected.encode()).await?;
                    return Ok((session, ours.negotiate(theirs)));
                }
                other => {
                    let reason = format!("expected CONNECT, got {other}");
                    send_error(conn, &reason, "").await?;
                    return Err(BrokerError::Handshake(reason));
                }
            }
        }
    }
}

async fn handle_data<T>(
    conn: &T,
    state: &BrokerState,
    session: &SocketId,
    outbox: &Outbox,
    data: &[u8],
) -> Result<Flow, BrokerError>
where
    T: Connection<Error = TransportError>,
{
    let packets = match decode_packets(data) {
        Ok(packets) => packets,
        Err(e) => {
            tracing::debug!(%session, error = %e, "malformed frame");
            send_error(conn, "malformed frame", &e.to_string()).await?;
            return Ok(Flow::Continue);
        }
    };

    for packet in packets {
        let Packet::Frame(frame) = packet else {
            continue;
        };
        if let Flow::Close = handle_frame(conn, state, session, outbox, frame).await? {
            return Ok(Flow::Close);
        }
    }
    Ok(Flow::Continue)
}

async fn handle_frame<T>(
    conn: &T,
    state: &BrokerState,
    session: &SocketId,
    outbox: &Outbox,
    frame: Frame,
) -> Result<Flow, BrokerError>
where
    T: Connection<Error = TransportError>,
{
    let flow = match frame.command {
        Command::Subscribe => {
            let (Some(id), Some(dest)) = (frame.get("id"), frame.get("destination")) else {
                send_error(conn, "SUBSCRIBE requires id and destination", "").await?;
                return Ok(Flow::Continue);
            };
            if destination::parse_room_topic(dest).is_none() {
                send_error(conn, &format!("unknown destination {dest}"), "").await?;
                return Ok(Flow::Continue);
            }
            state.hub.lock().await.subscribe(dest, session, id, outbox.clone());
            tracing::debug!(%session, subscription = id, destination = dest, "subscribed");
            Flow::Continue
        }
        Command::Unsubscribe => {
            let Some(id) = frame.get("id") else {
                send_error(conn, "UNSUBSCRIBE requires id", "").await?;
                return Ok(Flow::Continue);
            };
            let removed = state.hub.lock().await.unsubscribe(session, id);
            tracing::debug!(%session, subscription = id, removed, "unsubscribed");
            Flow::Continue
        }
        Command::Send => {
            if let Err(reason) = relay(state, session, &frame).await {
                send_error(conn, &reason, "").await?;
                return Ok(Flow::Continue);
            }
            Flow::Continue
        }
        Command::Disconnect => Flow::Close,
        Command::Connect | Command::Stomp => {
            send_error(conn, "already connected", "").await?;
            return Ok(Flow::Continue);
        }
        other => {
            send_error(conn, &format!("unexpected {other} frame"), "").await?;
            return Ok(Flow::Continue);
        }
    };

    if let Some(receipt) = frame.get("receipt") {
        let frame = Frame::new(Command::Receipt).header("receipt-id", receipt);
        conn.send(&frame.encode()).await?;
    }
    Ok(flow)
}

/// Routes a SEND to the hub. Returns the reason on rejection.
async fn relay(state: &BrokerState, session: &SocketId, frame: &Frame) -> Result<(), String> {
    let Some(dest) = frame.get("destination") else {
        return Err("SEND requires destination".into());
    };
    let Some(kind) = destination::parse_publish_destination(dest) else {
        return Err(format!("unknown destination {dest}"));
    };
    let event: RoomEvent = match state.codec.decode(&frame.body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(%session, destination = dest, error = %e, "undecodable body");
            return Err(format!("undecodable body: {e}"));
        }
    };
    if event.kind() != kind {
        return Err(format!("{} sent to {dest}", event.kind()));
    }

    let outcome = state.hub.lock().await.handle(session, event);
    outcome.map_err(|rejection| rejection.to_string())
}

async fn send_error<T>(conn: &T, message: &str, detail: &str) -> Result<(), BrokerError>
where
    T: Connection<Error = TransportError>,
{
    let frame = Frame::new(Command::Error)
        .header("message", message)
        .header("content-type", "text/plain")
        .body(detail.as_bytes().to_vec());
    conn.send(&frame.encode()).await?;
    Ok(())
}

/// Generates a random 32-character hex string (128 bits of entropy).
///
/// Used as the STOMP session id and, because the broker names
/// participants by session, as the participant's `socketId`.
fn generate_session_id() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
