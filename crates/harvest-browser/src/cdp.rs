//! DevTools WebSocket connection.
//!
//! One socket per [`CdpClient`]. Replies are matched to their callers by
//! command id; everything without an id is an event and is fanned out on a
//! broadcast channel, so several waiters can watch for the same
//! `Page.loadEventFired`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::BrowserError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Events buffered per subscriber before it starts lagging.
const EVENT_BACKLOG: usize = 256;

#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
}

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: &'a Value,
}

/// The `error` member of a reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Fault {
    code: i64,
    message: String,
}

type Reply = Result<Value, Fault>;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Frame {
    Reply {
        id: u64,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<Fault>,
    },
    Event {
        method: String,
        #[serde(default)]
        params: Value,
    },
}

fn decode_frame(text: &str) -> Option<Frame> {
    serde_json::from_str(text).ok()
}

/// Callers waiting on a reply, keyed by command id.
#[derive(Default)]
struct Waiters {
    next_id: u64,
    open: HashMap<u64, oneshot::Sender<Reply>>,
    closed: bool,
}

impl Waiters {
    fn register(&mut self) -> Option<(u64, oneshot::Receiver<Reply>)> {
        if self.closed {
            return None;
        }
        self.next_id += 1;
        let (tx, rx) = oneshot::channel();
        self.open.insert(self.next_id, tx);
        Some((self.next_id, rx))
    }

    fn resolve(&mut self, id: u64, reply: Reply) {
        match self.open.remove(&id) {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => tracing::trace!(id, "reply for a command nobody is waiting on"),
        }
    }

    fn forget(&mut self, id: u64) {
        self.open.remove(&id);
    }

    /// Drop every waiter; their receivers see the channel close.
    fn close(&mut self) {
        self.closed = true;
        self.open.clear();
    }
}

fn lock(waiters: &Mutex<Waiters>) -> MutexGuard<'_, Waiters> {
    waiters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct CdpClient {
    waiters: Arc<Mutex<Waiters>>,
    outbound: tokio::sync::Mutex<SplitSink<Socket, Message>>,
    events: broadcast::Sender<CdpEvent>,
    pump: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Open a browser-level (`/devtools/browser/..`) or page-level
    /// (`/devtools/page/..`) endpoint.
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        let (socket, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| BrowserError::Connect {
                url: ws_url.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(url = ws_url, "DevTools socket open");

        let (outbound, inbound) = socket.split();
        let waiters = Arc::new(Mutex::new(Waiters::default()));
        let (events, _) = broadcast::channel(EVENT_BACKLOG);
        let pump = tokio::spawn(pump(inbound, Arc::clone(&waiters), events.clone()));

        Ok(Self {
            waiters,
            outbound: tokio::sync::Mutex::new(outbound),
            events,
            pump,
        })
    }

    /// Events received from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        self.send_command_with_timeout(method, params, COMMAND_TIMEOUT)
            .await
    }

    /// Send `method` and wait up to `timeout` for its reply. An error reply
    /// becomes [`BrowserError::Command`].
    pub async fn send_command_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, BrowserError> {
        // Registered before sending so a fast reply has somewhere to go.
        let (id, reply) = lock(&self.waiters)
            .register()
            .ok_or_else(|| BrowserError::Protocol {
                detail: format!("cannot send {method}: DevTools connection is closed"),
            })?;

        let frame = serde_json::to_string(&Request {
            id,
            method,
            params: &params,
        })
        .map_err(|e| BrowserError::Protocol {
            detail: format!("cannot encode {method}: {e}"),
        })?;
        tracing::trace!(id, method, "sending DevTools command");

        let sent = self.outbound.lock().await.send(Message::Text(frame.into())).await;
        if let Err(e) = sent {
            lock(&self.waiters).forget(id);
            return Err(BrowserError::Protocol {
                detail: format!("cannot send {method}: {e}"),
            });
        }

        let outcome = match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                return Err(BrowserError::Protocol {
                    detail: format!("connection closed before {method} was answered"),
                })
            }
            Err(_) => {
                lock(&self.waiters).forget(id);
                return Err(BrowserError::CommandTimeout {
                    method: method.to_string(),
                    after: timeout,
                });
            }
        };

        outcome.map_err(|fault| BrowserError::Command {
            method: method.to_string(),
            code: fault.code,
            message: fault.message,
        })
    }

    /// `{domain}.enable`, e.g. `Page` or `Runtime`.
    pub async fn enable_domain(&self, domain: &str) -> Result<(), BrowserError> {
        self.send_command(&format!("{domain}.enable"), Value::Object(Default::default()))
            .await
            .map(drop)
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Route inbound frames until the socket ends, then fail every waiter.
async fn pump(
    mut inbound: SplitStream<Socket>,
    waiters: Arc<Mutex<Waiters>>,
    events: broadcast::Sender<CdpEvent>,
) {
    while let Some(message) = inbound.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "DevTools socket read failed");
                break;
            }
        };

        match decode_frame(&text) {
            Some(Frame::Reply { id, result, error }) => {
                let reply = match error {
                    Some(fault) => Err(fault),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                lock(&waiters).resolve(id, reply);
            }
            Some(Frame::Event { method, params }) => {
                let _ = events.send(CdpEvent { method, params });
            }
            None => tracing::debug!(len = text.len(), "ignoring undecodable DevTools frame"),
        }
    }

    lock(&waiters).close();
    tracing::debug!("DevTools socket closed");
}
