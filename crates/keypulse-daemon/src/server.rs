//! TCP push server for the keypulse display protocol.
//!
//! The server pushes one stats packet per cycle to every connected display
//! client and waits for a one-byte acknowledgement between packets. The ack
//! is best-effort: a slow or silent client keeps its connection, and only
//! EOF or a read error ends it. Each client gets its own handler task and
//! its own [`Sampler`], so no telemetry state is shared across connections.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use keypulse_proto::{StatsCodec, StatsPacket};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::error::{DaemonError, Result};
use crate::events::{LogVisibility, ServerEvent};
use crate::sampler::Sampler;

/// How long `accept` blocks before re-checking the running flag.
const ACCEPT_TIMEOUT: Duration = Duration::from_secs(1);
/// How long a handler waits for a client acknowledgement.
const ACK_TIMEOUT: Duration = Duration::from_secs(1);
/// Pause between handler cycles, capping the per-client packet rate.
const CYCLE_PAUSE: Duration = Duration::from_millis(300);
/// Period of the stats broadcast to the observer.
const STATS_INTERVAL: Duration = Duration::from_millis(500);
/// Listen backlog; a handful of displays, not a public service.
const BACKLOG: u32 = 5;

/// The server lifecycle controller.
///
/// Clones share the same underlying server, so one clone can sit in a tray
/// menu callback while another handles the main window.
#[derive(Clone)]
pub struct StatsServer {
    inner: Arc<Inner>,
}

struct Inner {
    running: AtomicBool,
    debug: AtomicBool,
    /// Live connections by peer address. The handle aborts the handler task,
    /// which drops (and thereby closes) its socket.
    clients: Mutex<HashMap<SocketAddr, JoinHandle<()>>>,
    /// Accept loop and stats loop of the current running period.
    loops: Mutex<Vec<JoinHandle<()>>>,
    local_addr: std::sync::Mutex<Option<SocketAddr>>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
}

impl Inner {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn log(&self, message: String, visibility: LogVisibility) {
        debug!("{message}");
        if visibility == LogVisibility::Always || self.debug.load(Ordering::Relaxed) {
            let _ = self.event_tx.send(ServerEvent::Log {
                message,
                visibility,
            });
        }
    }

    fn notify_connections(&self, count: usize) {
        let _ = self
            .event_tx
            .send(ServerEvent::ConnectionsChanged { count });
    }

    fn notify_status(&self, running: bool) {
        let _ = self.event_tx.send(ServerEvent::StatusChanged { running });
    }

    fn notify_stats(&self, packet: StatsPacket) {
        let _ = self.event_tx.send(ServerEvent::Stats {
            cpu: packet.cpu_fraction * 100.0,
            mem: packet.mem_fraction * 100.0,
        });
    }
}

impl StatsServer {
    /// Create a server and the event receiver its observer reads from.
    ///
    /// Dropping the receiver is allowed; events are then discarded.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            running: AtomicBool::new(false),
            debug: AtomicBool::new(false),
            clients: Mutex::new(HashMap::new()),
            loops: Mutex::new(Vec::new()),
            local_addr: std::sync::Mutex::new(None),
            event_tx,
        });
        (Self { inner }, event_rx)
    }

    /// Bind the listening socket and launch the accept and stats loops.
    ///
    /// # Errors
    ///
    /// [`DaemonError::AlreadyRunning`] if the server is running, or a
    /// bind-class error ([`DaemonError::InvalidAddr`], [`DaemonError::Bind`])
    /// in which case the server stays stopped.
    pub async fn start(&self, host: &str, port: u16) -> Result<()> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DaemonError::AlreadyRunning);
        }

        let (listener, local) = match bind_listener(host, port) {
            Ok(bound) => bound,
            Err(e) => {
                self.inner.running.store(false, Ordering::SeqCst);
                self.inner
                    .log(format!("Failed to start server: {e}"), LogVisibility::Always);
                return Err(e);
            }
        };

        if let Ok(mut guard) = self.inner.local_addr.lock() {
            *guard = Some(local);
        }

        self.inner.log(
            format!("Server started on {host}:{port}"),
            LogVisibility::Always,
        );
        self.inner.notify_status(true);

        let accept = tokio::spawn(accept_loop(self.inner.clone(), listener));
        let stats = tokio::spawn(stats_loop(self.inner.clone()));
        let mut loops = self.inner.loops.lock().await;
        loops.push(accept);
        loops.push(stats);

        Ok(())
    }

    /// Stop the server, closing every client connection and the listener.
    ///
    /// No-op (and no events) when the server is not running. Safe to call
    /// from any task.
    pub async fn stop(&self) {
        if self
            .inner
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        // Handler tasks own their sockets; aborting drops and closes them.
        let handles: Vec<JoinHandle<()>> = {
            let mut clients = self.inner.clients.lock().await;
            clients.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &handles {
            handle.abort();
        }

        // The loops would notice the cleared flag within one timeout window;
        // aborting closes the listener immediately.
        {
            let mut loops = self.inner.loops.lock().await;
            for handle in loops.drain(..) {
                handle.abort();
            }
        }

        if let Ok(mut guard) = self.inner.local_addr.lock() {
            *guard = None;
        }

        self.inner.notify_status(false);
        self.inner.notify_connections(0);
        self.inner
            .log("Server stopped".to_string(), LogVisibility::Always);
    }

    /// Whether the server is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Address actually bound, once running. Needed when binding port 0.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr.lock().map_or(None, |guard| *guard)
    }

    /// Toggle verbose logging at runtime.
    pub fn set_debug(&self, debug: bool) {
        self.inner.debug.store(debug, Ordering::Relaxed);
    }

    /// Current state of the verbose flag.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.inner.debug.load(Ordering::Relaxed)
    }
}

fn bind_listener(host: &str, port: u16) -> Result<(TcpListener, SocketAddr)> {
    let addr_str = format!("{host}:{port}");
    let addr: SocketAddr = addr_str
        .parse()
        .map_err(|source| DaemonError::InvalidAddr {
            addr: addr_str.clone(),
            source,
        })?;

    let bind_err = |source| DaemonError::Bind {
        addr: addr_str.clone(),
        source,
    };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;
    socket.set_reuseaddr(true).map_err(bind_err)?;
    socket.bind(addr).map_err(bind_err)?;
    let listener = socket.listen(BACKLOG).map_err(bind_err)?;
    let local = listener.local_addr().map_err(bind_err)?;

    Ok((listener, local))
}

/// Accept new display connections while the server is running.
///
/// The bounded accept is the window in which a stop request is observed;
/// accept errors are never fatal to the loop while the server is running.
async fn accept_loop(inner: Arc<Inner>, listener: TcpListener) {
    while inner.is_running() {
        match timeout(ACCEPT_TIMEOUT, listener.accept()).await {
            // No connection within the window; re-check the running flag.
            Err(_) => {}
            Ok(Ok((stream, addr))) => {
                inner.log(format!("New connection from {addr}"), LogVisibility::Always);

                // Register under the lock the handler also takes for its
                // self-removal, so the entry exists before the handler can
                // possibly leave.
                let count = {
                    let mut clients = inner.clients.lock().await;
                    let handle = tokio::spawn(handle_client(inner.clone(), stream, addr));
                    clients.insert(addr, handle);
                    clients.len()
                };
                inner.notify_connections(count);
            }
            Ok(Err(e)) => {
                if inner.is_running() {
                    inner.log(
                        format!("Error accepting connection: {e}"),
                        LogVisibility::Verbose,
                    );
                }
            }
        }
    }
    debug!("Accept loop stopped");
}

/// Drive one display connection until the client goes away or the server
/// stops.
///
/// A read timeout is not a disconnect: the ack is best-effort and a silent
/// client keeps receiving packets. EOF is a disconnect: a peer that
/// half-closes its write side shows up here as EOF, not as a timeout.
async fn handle_client(inner: Arc<Inner>, stream: TcpStream, addr: SocketAddr) {
    let mut sampler = Sampler::new();
    let (mut sink, mut acks) = Framed::new(stream, StatsCodec::new()).split();

    while inner.is_running() {
        let packet = match sampler.sample().await {
            Ok(packet) => packet,
            Err(e) => {
                inner.log(
                    format!("Error with client {addr}: {e}"),
                    LogVisibility::Verbose,
                );
                break;
            }
        };

        if let Err(e) = sink.send(packet).await {
            inner.log(
                format!("Error with client {addr}: {e}"),
                LogVisibility::Verbose,
            );
            break;
        }
        inner.log(
            format!(
                "Sent to {addr}: CPU {:.1}%, memory {:.1}%",
                packet.cpu_fraction * 100.0,
                packet.mem_fraction * 100.0
            ),
            LogVisibility::Verbose,
        );

        match timeout(ACK_TIMEOUT, acks.next()).await {
            // Ack is best-effort; a slow client just misses this cycle. The
            // elapsed wait already capped the loop rate, so skip the pause.
            Err(_) => continue,
            Ok(Some(Ok(ack))) => {
                inner.log(
                    format!("Ack from {addr}: {:02x}", ack.raw),
                    LogVisibility::Verbose,
                );
            }
            Ok(None) => {
                inner.log(format!("Client {addr} disconnected"), LogVisibility::Always);
                break;
            }
            Ok(Some(Err(e))) => {
                inner.log(
                    format!("Error with client {addr}: {e}"),
                    LogVisibility::Verbose,
                );
                break;
            }
        }

        tokio::time::sleep(CYCLE_PAUSE).await;
    }

    // Already gone from the map if stop() cleared it in bulk; only a
    // self-removal reports a new count.
    let remaining = {
        let mut clients = inner.clients.lock().await;
        clients.remove(&addr).map(|_| clients.len())
    };
    if let Some(count) = remaining {
        inner.notify_connections(count);
    }
    inner.log(
        format!("Connection with {addr} closed"),
        LogVisibility::Always,
    );
}

/// Periodic stats broadcast to the observer, independent of any client's
/// packet stream.
async fn stats_loop(inner: Arc<Inner>) {
    let mut sampler = Sampler::new();
    let mut interval = tokio::time::interval(STATS_INTERVAL);
    loop {
        interval.tick().await;
        if !inner.is_running() {
            break;
        }
        match sampler.sample().await {
            Ok(packet) => inner.notify_stats(packet),
            Err(e) => {
                inner.log(
                    format!("Stats sampling failed: {e}"),
                    LogVisibility::Verbose,
                );
                break;
            }
        }
    }
    debug!("Stats loop stopped");
}
