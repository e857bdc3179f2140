use std::sync::Arc;

use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};

use capstan_ledger::EV_CHAIN_STATE;
use capstan_link::{CallTransport, Link, LinkEvent};
use capstan_types::ChainState;

use crate::error::{EngineError, EngineResult};
use crate::subscriber::Subscriber;

/// Routes link events to attached subscribers.
///
/// On every (re)connection: every subscriber's connect handshake runs
/// concurrently, and once all succeed the chain-state event stream is
/// enabled with a one-time subscription request. A handshake or
/// subscription failure is fatal — the process cannot operate without
/// liveness visibility.
///
/// On every chain-state event: each subscriber's handler runs in its own
/// task with its error captured and logged. One subscriber failing or
/// hanging never stalls delivery to its peers.
pub struct Listener {
    transport: Arc<dyn CallTransport>,
    events: broadcast::Receiver<LinkEvent>,
    subscribers: Vec<Arc<dyn Subscriber>>,
}

impl Listener {
    pub fn new(link: &Link) -> Self {
        Self::with_parts(Arc::new(link.clone()), link.subscribe())
    }

    /// Assemble from raw parts; the seam tests use to drive the listener
    /// without a socket.
    pub fn with_parts(
        transport: Arc<dyn CallTransport>,
        events: broadcast::Receiver<LinkEvent>,
    ) -> Self {
        Self {
            transport,
            events,
            subscribers: Vec::new(),
        }
    }

    /// Register a subscriber. Must be called before [`Listener::run`].
    pub fn attach(&mut self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Drive the event loop. Returns `Ok(())` when the link shuts down,
    /// `Err` only on fatal conditions (failed handshake, failed
    /// subscription, event-stream error).
    pub async fn run(mut self) -> EngineResult<()> {
        // Handshakes run in their own task (their calls can park forever
        // across a reset); fatal outcomes come back over this channel.
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<EngineError>(1);
        let mut handshake: Option<JoinHandle<()>> = None;
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Ok(LinkEvent::Connected) => {
                        tracing::info!("link connected, running handshakes");
                        if let Some(previous) = handshake.take() {
                            // A reconnect raced an unfinished handshake;
                            // its in-flight calls are dead, drop the task.
                            previous.abort();
                        }
                        let transport = self.transport.clone();
                        let subscribers = self.subscribers.clone();
                        let fatal = fatal_tx.clone();
                        handshake = Some(tokio::spawn(async move {
                            match connect_handshake(transport, subscribers).await {
                                Ok(()) => tracing::info!("connect handshake complete"),
                                Err(e) => {
                                    let _ = fatal.send(e).await;
                                }
                            }
                        }));
                    }
                    Ok(LinkEvent::Notification { id, result }) if id == EV_CHAIN_STATE => {
                        let payload = result.map_err(EngineError::EventStream)?;
                        match serde_json::from_value::<ChainState>(payload) {
                            Ok(state) => self.fan_out(state),
                            Err(e) => {
                                tracing::warn!(error = %e, "undecodable chain-state event");
                            }
                        }
                    }
                    Ok(LinkEvent::Notification { id, .. }) => {
                        tracing::warn!(%id, "ignoring unexpected notification");
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("link closed, listener stopping");
                        return Ok(());
                    }
                },
                Some(err) = fatal_rx.recv() => return Err(err),
            }
        }
    }

    /// Deliver one decoded chain state to every subscriber, each in its
    /// own detached task. Failures are logged per subscriber.
    fn fan_out(&self, state: ChainState) {
        for subscriber in &self.subscribers {
            let subscriber = subscriber.clone();
            let state = state.clone();
            tokio::spawn(async move {
                if let Err(e) = subscriber.on_chain_state(&state).await {
                    tracing::error!(
                        subscriber = subscriber.name(),
                        error = %e,
                        "chain-state handler failed"
                    );
                }
            });
        }
    }
}

/// The per-connection handshake: every subscriber's `on_connect`
/// concurrently, then the one-time chain-event subscription.
async fn connect_handshake(
    transport: Arc<dyn CallTransport>,
    subscribers: Vec<Arc<dyn Subscriber>>,
) -> EngineResult<()> {
    let mut tasks = JoinSet::new();
    for subscriber in subscribers {
        tasks.spawn(async move {
            let name = subscriber.name().to_string();
            (name, subscriber.on_connect().await)
        });
    }
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, Ok(()))) => tracing::debug!(subscriber = name, "handshake ok"),
            Ok((_, Err(e))) => return Err(e),
            Err(e) => return Err(EngineError::Internal(e.to_string())),
        }
    }

    // Liveness visibility is mandatory; a failure here has no recovery
    // path and must take the process down.
    let ack = transport
        .call("ev_subunsub", json!({ "ev_chain_state": true }))
        .await
        .map_err(EngineError::Subscription)?;
    if ack.as_bool() != Some(true) {
        return Err(EngineError::SubscriptionRejected(ack));
    }
    tracing::info!("chain-state events enabled");
    Ok(())
}
