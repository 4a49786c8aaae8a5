//! Socket.IO client connecting the plugin to the host.
//!
//! One connection is served at a time. Each connection gets a fresh session:
//! Engine.IO handshake, namespace connect, `registerTopic` with an ack, then
//! the input hooks. A dropped connection discards all session state and is
//! retried with exponential backoff.

use crate::plugin::{EventSink, Plugin, SinkError};
use crate::protocol::framing::{EnginePacket, Handshake, SocketPacket};
use crate::protocol::OutboundEvent;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    /// Lines dispatched right after registration.
    pub preload: Vec<String>,
    /// Hold the input hooks back until this many elements exist.
    pub min_elements: Option<u64>,
    /// Retry after a failed or dropped connection.
    pub reconnect: bool,
    /// How long the host may take to acknowledge `registerTopic`.
    pub registration_timeout: Duration,
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            preload: Vec::new(),
            min_elements: None,
            reconnect: true,
            registration_timeout: REGISTRATION_TIMEOUT,
        }
    }

    pub fn url(&self) -> String {
        format!(
            "ws://{}:{}/socket.io/?EIO=4&transport=websocket",
            self.host, self.port
        )
    }
}

/// How a connection ended.
#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Shutdown,
    Disconnected,
}

/// Registration progress of the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connecting,
    Registering { ack: u64, deadline: Instant },
    Gated,
    Serving,
}

/// Serve the host until Ctrl-C, reconnecting as needed.
pub async fn run(plugin: &mut Plugin, options: &ConnectOptions) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_tx.send_replace(true);
        }
    });
    run_until(plugin, options, shutdown_rx).await
}

/// Serve the host until `shutdown` turns true. Every connection starts from a
/// fresh session and an empty store.
async fn run_until(
    plugin: &mut Plugin,
    options: &ConnectOptions,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        plugin.reset();
        let result = serve(plugin, options, shutdown_rx.clone()).await;
        plugin.disconnect();

        match result {
            Ok(Exit::Shutdown) => {
                info!("Shutting down");
                return Ok(());
            }
            Ok(Exit::Disconnected) => {
                info!("Disconnected");
                backoff = INITIAL_BACKOFF;
            }
            Err(e) if !options.reconnect => return Err(e),
            Err(e) => warn!("Connection failed: {:#}", e),
        }
        if !options.reconnect {
            return Ok(());
        }

        info!("Reconnecting in {}s", backoff.as_secs());
        let mut shutdown = shutdown_rx.clone();
        tokio::select! {
            _ = sleep(backoff) => {}
            true = reached(&mut shutdown, |stop| *stop) => {
                info!("Shutting down");
                return Ok(());
            }
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Serve a single connection.
async fn serve(
    plugin: &mut Plugin,
    options: &ConnectOptions,
    mut shutdown: watch::Receiver<bool>,
) -> Result<Exit> {
    let url = options.url();
    info!("Connecting to {}", url);
    let (ws, _) = timeout(CONNECT_TIMEOUT, connect_async(url.as_str()))
        .await
        .map_err(|_| anyhow!("Connection timeout - is electron-spirit running?"))?
        .with_context(|| format!("Failed to connect to {}", url))?;
    let (tx, mut rx) = ws.split();
    let mut conn = Connection { tx, next_ack: 0 };

    let handshake = read_handshake(&mut rx).await?;
    debug!(
        "Engine.IO session {} (max payload {:?})",
        handshake.sid, handshake.max_payload
    );
    let ping_window = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
    let mut last_ping = Instant::now();

    conn.send_socket(SocketPacket::Connect(None)).await?;

    let mut phase = Phase::Connecting;
    let mut created = plugin.subscribe_created();
    let min_elements = options.min_elements.unwrap_or(0);

    loop {
        let registration_deadline = match phase {
            Phase::Registering { deadline, .. } => deadline,
            _ => Instant::now() + options.registration_timeout,
        };

        tokio::select! {
            frame = rx.next() => {
                let text = match frame {
                    None | Some(Ok(Message::Close(_))) => return Ok(Exit::Disconnected),
                    Some(Err(e)) => return Err(e).context("Websocket error"),
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(_)) => continue,
                };
                let packet = match EnginePacket::decode(text.as_str()) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!("Ignoring malformed frame {:?}: {}", text.as_str(), e);
                        continue;
                    }
                };
                let payload = match packet {
                    EnginePacket::Message(payload) => payload,
                    EnginePacket::Ping(data) => {
                        last_ping = Instant::now();
                        conn.send_engine(EnginePacket::Pong(data)).await?;
                        continue;
                    }
                    EnginePacket::Close => return Ok(Exit::Disconnected),
                    _ => continue,
                };
                let packet = match SocketPacket::decode(&payload) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!("Ignoring malformed packet {:?}: {}", payload, e);
                        continue;
                    }
                };

                match packet {
                    SocketPacket::Connect(_) if phase == Phase::Connecting => {
                        info!("Connected");
                        let event = plugin.begin_registration()?;
                        let ack = conn.emit_with_ack(event).await?;
                        phase = Phase::Registering {
                            ack,
                            deadline: Instant::now() + options.registration_timeout,
                        };
                    }
                    SocketPacket::Connect(_) => debug!("Ignoring repeated connect"),
                    SocketPacket::ConnectError(data) => bail!("Host refused connection: {}", data),
                    SocketPacket::Disconnect => return Ok(Exit::Disconnected),
                    SocketPacket::Ack { id, args } => match phase {
                        Phase::Registering { ack, .. } if ack == id => {
                            plugin
                                .complete_registration(&args)
                                .context("Registration failed")?;
                            for line in &options.preload {
                                plugin.dispatch(line, &mut conn).await;
                            }
                            if min_elements > 0 {
                                info!("Waiting for {} elements before accepting input", min_elements);
                                phase = Phase::Gated;
                            } else {
                                announce_hooks(plugin, &mut conn).await?;
                                phase = Phase::Serving;
                            }
                        }
                        _ => debug!("Unexpected ack {}: {:?}", id, args),
                    },
                    SocketPacket::Event { id, name, args } => {
                        handle_event(plugin, &mut conn, id, &name, &args).await?;
                    }
                }
            }
            true = reached(&mut shutdown, |stop| *stop) => {
                if let Ok(events) = plugin.release_events() {
                    for event in events {
                        if let Err(e) = conn.emit(event).await {
                            debug!("Failed to release input hook: {}", e);
                        }
                    }
                }
                conn.close().await;
                return Ok(Exit::Shutdown);
            }
            _ = sleep_until(registration_deadline), if matches!(phase, Phase::Registering { .. }) => {
                bail!("Host did not acknowledge registration");
            }
            _ = sleep_until(last_ping + ping_window) => {
                bail!("Ping timeout");
            }
            true = reached(&mut created, |n| *n >= min_elements), if phase == Phase::Gated => {
                announce_hooks(plugin, &mut conn).await?;
                phase = Phase::Serving;
            }
        }
    }
}

/// Resolves to `true` once the channel holds an accepted value, or `false`
/// if the sender is gone.
async fn reached<T>(rx: &mut watch::Receiver<T>, accept: impl FnMut(&T) -> bool) -> bool {
    rx.wait_for(accept).await.is_ok()
}

/// Wait for the Engine.IO open packet.
async fn read_handshake(rx: &mut SplitStream<WsStream>) -> Result<Handshake> {
    let frame = timeout(CONNECT_TIMEOUT, rx.next())
        .await
        .map_err(|_| anyhow!("Handshake timeout"))?;
    match frame {
        Some(Ok(Message::Text(text))) => match EnginePacket::decode(text.as_str())? {
            EnginePacket::Open(handshake) => Ok(handshake),
            other => bail!("Expected open packet, got {:?}", other),
        },
        Some(Ok(other)) => bail!("Unexpected handshake frame: {:?}", other),
        Some(Err(e)) => Err(e).context("Handshake failed"),
        None => bail!("Connection closed during handshake"),
    }
}

async fn announce_hooks(plugin: &Plugin, conn: &mut Connection) -> Result<()> {
    for event in plugin.hook_events()? {
        conn.emit(event).await?;
    }
    info!("Listening on input hooks {:?}", plugin.hooks());
    Ok(())
}

/// Handle an event pushed by the host.
async fn handle_event(
    plugin: &mut Plugin,
    conn: &mut Connection,
    id: Option<u64>,
    name: &str,
    args: &[Value],
) -> Result<()> {
    match name {
        "processContent" => match args.first().and_then(Value::as_str) {
            Some(line) => plugin.dispatch(line, conn).await,
            None => warn!("processContent without text: {:?}", args),
        },
        // The host asks before closing or reloading an element; never veto.
        "elemRemove" | "elemRefresh" => {
            debug!("{} {:?}", name, args);
            if let Some(id) = id {
                conn.send_socket(SocketPacket::Ack {
                    id,
                    args: vec![json!(false)],
                })
                .await?;
            }
        }
        _ => debug!("Host event {}: {:?}", name, args),
    }
    Ok(())
}

/// Write half of the websocket.
struct Connection {
    tx: SplitSink<WsStream, Message>,
    next_ack: u64,
}

impl Connection {
    async fn send_engine(&mut self, packet: EnginePacket) -> Result<(), SinkError> {
        self.tx
            .send(Message::Text(packet.encode().into()))
            .await
            .map_err(|e| match e {
                WsError::ConnectionClosed | WsError::AlreadyClosed => SinkError::Closed,
                other => SinkError::Transport(other.to_string()),
            })
    }

    async fn send_socket(&mut self, packet: SocketPacket) -> Result<(), SinkError> {
        self.send_engine(EnginePacket::Message(packet.encode())).await
    }

    /// Emit an event that expects an acknowledgement, returning its ack id.
    async fn emit_with_ack(&mut self, event: OutboundEvent) -> Result<u64, SinkError> {
        let id = self.next_ack;
        self.next_ack += 1;
        debug!("-> {} (ack {})", event.name(), id);
        self.send_socket(SocketPacket::Event {
            id: Some(id),
            name: event.name().to_string(),
            args: event.args(),
        })
        .await?;
        Ok(id)
    }

    async fn close(&mut self) {
        let _ = self.send_socket(SocketPacket::Disconnect).await;
        let _ = self.tx.close().await;
    }
}

#[async_trait]
impl EventSink for Connection {
    async fn emit(&mut self, event: OutboundEvent) -> Result<(), SinkError> {
        debug!("-> {}", event.name());
        self.send_socket(SocketPacket::Event {
            id: None,
            name: event.name().to_string(),
            args: event.args(),
        })
        .await
    }
}
