use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::codec::{decode_response, encode_request, LineCodec};
use crate::error::{LinkError, RpcError};
use crate::stats::LinkStats;

/// Link configuration.
#[derive(Clone, Debug)]
pub struct LinkConfig {
    /// `host:port` of the ledger node's RPC socket.
    pub address: String,
    /// Fixed delay between reconnection attempts. Not exponential.
    pub reconnect_interval: Duration,
    /// Optional inactivity timeout; expiry forces the socket closed and
    /// feeds the normal disconnect path.
    pub read_timeout: Option<Duration>,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:10006".into(),
            reconnect_interval: Duration::from_secs(5),
            read_timeout: None,
            event_capacity: 64,
        }
    }
}

/// Events emitted by the link.
#[derive(Clone, Debug)]
pub enum LinkEvent {
    /// Fires once per successful (re)connection.
    Connected,
    /// An inbound frame whose id matched no pending call — a subscription
    /// event, identified by its application-level id.
    Notification {
        id: String,
        result: Result<Value, RpcError>,
    },
}

enum Command {
    Call {
        id: String,
        method: String,
        params: Value,
        reply: oneshot::Sender<Result<Value, RpcError>>,
    },
}

/// Persistent RPC client handle.
///
/// Cloning is cheap; all clones share one connection and one correlation
/// space. Dropping every clone shuts the background actor down.
#[derive(Clone)]
pub struct Link {
    cmd_tx: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<LinkEvent>,
    stats: Arc<LinkStats>,
    next_id: Arc<AtomicU64>,
}

impl Link {
    /// Connect to the ledger node.
    ///
    /// Resolves after the first connection attempt: only that attempt's
    /// failure surfaces here. Every later disconnect is handled by silent
    /// background reconnection, visible only through [`LinkStats`] and
    /// [`LinkEvent::Connected`].
    pub async fn connect(config: LinkConfig) -> Result<Self, LinkError> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let stats = Arc::new(LinkStats::new(config.address.clone()));
        let (ready_tx, ready_rx) = oneshot::channel();

        tokio::spawn(run(config, cmd_rx, event_tx.clone(), stats.clone(), ready_tx));

        ready_rx.await.map_err(|_| LinkError::Closed)??;
        Ok(Self {
            cmd_tx,
            events: event_tx,
            stats,
            next_id: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Issue a correlated request and await its response.
    ///
    /// If the connection drops before the response arrives, the returned
    /// future never resolves — in-flight calls are discarded on reset, not
    /// retried. Callers needing completion guarantees watch
    /// [`LinkEvent::Connected`] and re-issue their work.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = format!("call-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = Command::Call {
            id,
            method: method.to_string(),
            params,
            reply: reply_tx,
        };
        if self.cmd_tx.send(command).is_err() {
            // Actor gone: same contract as any dropped in-flight call.
            return std::future::pending().await;
        }
        match reply_rx.await {
            Ok(result) => result,
            Err(_) => return std::future::pending().await,
        }
    }

    /// Subscribe to connection and notification events.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Connection counters for the status surface.
    pub fn stats(&self) -> Arc<LinkStats> {
        self.stats.clone()
    }
}

/// The RPC seam consumed by higher layers; lets tests stub the wire.
#[async_trait]
pub trait CallTransport: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

#[async_trait]
impl CallTransport for Link {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        Link::call(self, method, params).await
    }
}

enum Exit {
    Disconnected,
    Shutdown,
}

async fn run(
    config: LinkConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<LinkEvent>,
    stats: Arc<LinkStats>,
    ready: oneshot::Sender<Result<(), LinkError>>,
) {
    let mut first = Some(ready);
    loop {
        tracing::info!(address = %config.address, "connecting to ledger node");
        match TcpStream::connect(&config.address).await {
            Ok(stream) => {
                if let Some(tx) = first.take() {
                    let _ = tx.send(Ok(()));
                }
                tracing::info!(address = %config.address, "connected to ledger node");
                stats.set_connected(true);
                let _ = events.send(LinkEvent::Connected);

                let exit =
                    connection(stream, &mut cmd_rx, &events, &stats, config.read_timeout).await;
                stats.set_connected(false);
                if matches!(exit, Exit::Shutdown) {
                    return;
                }
            }
            Err(e) => {
                stats.record_error(&e.to_string());
                if let Some(tx) = first.take() {
                    // The very first attempt is distinguished: its failure
                    // surfaces to the connect() caller.
                    let _ = tx.send(Err(LinkError::Connect(e)));
                    return;
                }
                tracing::warn!(error = %e, "ledger connection attempt failed");
            }
        }

        tracing::info!(
            delay_ms = config.reconnect_interval.as_millis() as u64,
            "ledger connection lost, will reconnect"
        );
        tokio::time::sleep(config.reconnect_interval).await;
        if cmd_rx.is_closed() {
            return;
        }
        stats.record_reconnect();
    }
}

/// One connection's lifetime. The codec buffer and pending-call table are
/// created fresh here: nothing from a previous connection — partial frames
/// or in-flight calls — survives a reset.
async fn connection(
    stream: TcpStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    events: &broadcast::Sender<LinkEvent>,
    stats: &LinkStats,
    read_timeout: Option<Duration>,
) -> Exit {
    let mut codec = LineCodec::new();
    let mut pending: HashMap<String, oneshot::Sender<Result<Value, RpcError>>> = HashMap::new();
    let (mut rd, mut wr) = stream.into_split();
    let mut read_buf = vec![0u8; 16 * 1024];

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Call { id, method, params, reply }) => {
                    tracing::debug!(%id, %method, "sending request");
                    let frame = encode_request(&id, &method, &params);
                    if let Err(e) = wr.write_all(&frame).await {
                        stats.record_error(&e.to_string());
                        tracing::warn!(error = %e, "write failed, resetting connection");
                        return Exit::Disconnected;
                    }
                    pending.insert(id, reply);
                }
                None => return Exit::Shutdown,
            },
            outcome = read_some(&mut rd, &mut read_buf, read_timeout) => match outcome {
                ReadOutcome::Data(n) => {
                    codec.push(&read_buf[..n]);
                    // Multiple frames may arrive coalesced in one read;
                    // drain until the buffer holds no complete frame.
                    while let Some(frame) = codec.next_frame() {
                        dispatch(frame, &mut pending, events);
                    }
                }
                ReadOutcome::Eof => {
                    tracing::warn!("connection closed by peer");
                    return Exit::Disconnected;
                }
                ReadOutcome::TimedOut => {
                    stats.record_timeout();
                    tracing::warn!("read timeout, forcing connection closed");
                    return Exit::Disconnected;
                }
                ReadOutcome::Failed(e) => {
                    stats.record_error(&e.to_string());
                    tracing::warn!(error = %e, "read failed");
                    return Exit::Disconnected;
                }
            },
        }
    }
}

fn dispatch(
    frame: Value,
    pending: &mut HashMap<String, oneshot::Sender<Result<Value, RpcError>>>,
    events: &broadcast::Sender<LinkEvent>,
) {
    let id = frame
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match pending.remove(&id) {
        Some(reply) => {
            // Removed on match: a duplicate response carrying the same id
            // finds no pending entry and flows to the event stream.
            let _ = reply.send(decode_response(&frame));
        }
        None => {
            let _ = events.send(LinkEvent::Notification {
                id,
                result: decode_response(&frame),
            });
        }
    }
}

enum ReadOutcome {
    Data(usize),
    Eof,
    TimedOut,
    Failed(std::io::Error),
}

async fn read_some(
    rd: &mut OwnedReadHalf,
    buf: &mut [u8],
    timeout: Option<Duration>,
) -> ReadOutcome {
    let result = match timeout {
        Some(t) => match tokio::time::timeout(t, rd.read(buf)).await {
            Ok(r) => r,
            Err(_) => return ReadOutcome::TimedOut,
        },
        None => rd.read(buf).await,
    };
    match result {
        Ok(0) => ReadOutcome::Eof,
        Ok(n) => ReadOutcome::Data(n),
        Err(e) => ReadOutcome::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    fn test_config(address: String) -> LinkConfig {
        LinkConfig {
            address,
            reconnect_interval: Duration::from_millis(20),
            read_timeout: None,
            event_capacity: 16,
        }
    }

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        (listener, address)
    }

    #[tokio::test]
    async fn call_resolves_on_matching_response() {
        let (listener, address) = listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (rd, mut wr) = stream.into_split();
            let mut lines = BufReader::new(rd).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(&line).unwrap();
            assert_eq!(request["method"], "ping");
            let response = json!({"id": request["id"], "result": {"pong": true}});
            wr.write_all(format!("{response}\n").as_bytes())
                .await
                .unwrap();
            // Hold the connection open until the client is done.
            let _ = lines.next_line().await;
        });

        let link = Link::connect(test_config(address)).await.unwrap();
        let result = link.call("ping", json!({})).await.unwrap();
        assert_eq!(result, json!({"pong": true}));
    }

    #[tokio::test]
    async fn duplicate_response_does_not_resolve_twice() {
        let (listener, address) = listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (rd, mut wr) = stream.into_split();
            let mut lines = BufReader::new(rd).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(&line).unwrap();
            let response = json!({"id": request["id"], "result": {"n": 1}});
            let frame = format!("{response}\n");
            // The same correlation id, twice.
            wr.write_all(frame.as_bytes()).await.unwrap();
            wr.write_all(frame.as_bytes()).await.unwrap();
            let _ = lines.next_line().await;
        });

        let link = Link::connect(test_config(address)).await.unwrap();
        let mut events = link.subscribe();
        let result = link.call("once", json!({})).await.unwrap();
        assert_eq!(result, json!({"n": 1}));

        // The duplicate is unsolicited and lands on the event stream.
        let (id, dup) = next_notification(&mut events).await;
        assert_eq!(id, "call-0");
        assert_eq!(dup.unwrap(), json!({"n": 1}));
    }

    #[tokio::test]
    async fn disconnect_leaves_pending_call_unresolved() {
        let (listener, address) = listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (rd, wr) = stream.into_split();
            let mut lines = BufReader::new(rd).lines();
            let _ = lines.next_line().await;
            // Drop the connection without answering.
            drop(lines);
            drop(wr);
            // Keep accepting so background reconnects succeed quietly.
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                std::mem::forget(stream);
            }
        });

        let link = Link::connect(test_config(address)).await.unwrap();
        let call = link.call("never", json!({}));
        // The call must neither resolve nor error.
        let outcome = tokio::time::timeout(Duration::from_millis(200), call).await;
        assert!(outcome.is_err(), "dropped call must stay pending forever");
    }

    #[tokio::test]
    async fn first_connect_failure_surfaces() {
        // Bind then drop to find a port with nothing listening.
        let (listener, address) = listener().await;
        drop(listener);

        let err = Link::connect(test_config(address)).await.err().unwrap();
        assert!(matches!(err, LinkError::Connect(_)));
    }

    #[tokio::test]
    async fn reconnects_after_connection_loss() {
        let (listener, address) = listener().await;
        tokio::spawn(async move {
            // First connection: accept and drop immediately.
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
            // Second connection: hold open.
            let (stream, _) = listener.accept().await.unwrap();
            std::mem::forget(stream);
        });

        let link = Link::connect(test_config(address)).await.unwrap();
        let mut events = link.subscribe();

        // The re-established connection fires another Connected event.
        let mut reconnected = false;
        for _ in 0..2 {
            match tokio::time::timeout(Duration::from_secs(1), events.recv()).await {
                Ok(Ok(LinkEvent::Connected)) => {
                    reconnected = true;
                    break;
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        assert!(reconnected, "expected a Connected event after reset");
        assert!(link.stats().reconnects() >= 1);
    }

    #[tokio::test]
    async fn unsolicited_frame_becomes_notification() {
        let (listener, address) = listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (rd, mut wr) = stream.into_split();
            let event = json!({
                "id": "ev_chain_state",
                "result": {"is_in_sync": true, "tip_height": 5, "current_height": 5},
            });
            wr.write_all(format!("{event}\n").as_bytes()).await.unwrap();
            let mut lines = BufReader::new(rd).lines();
            let _ = lines.next_line().await;
        });

        let link = Link::connect(test_config(address)).await.unwrap();
        let mut events = link.subscribe();
        let (id, result) = next_notification(&mut events).await;
        assert_eq!(id, "ev_chain_state");
        assert_eq!(result.unwrap()["tip_height"], 5);
    }

    /// Wait for the next Notification, skipping Connected events (the
    /// initial one races with the subscription).
    async fn next_notification(
        events: &mut broadcast::Receiver<LinkEvent>,
    ) -> (String, Result<Value, RpcError>) {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
                .await
                .expect("timed out waiting for notification")
                .expect("event stream closed");
            if let LinkEvent::Notification { id, result } = event {
                return (id, result);
            }
        }
    }
}
