//! UDP draw receiver
//!
//! Binds the drawing port once at start-up and runs the receive loop on a
//! background thread with its own tokio runtime. Every datagram is decoded
//! and applied to the shared [`DrawingRegistry`] on that thread; nothing is
//! queued in between.
//!
//! A bind failure is not fatal: the receiver reports
//! [`ReceiverState::Disabled`] and the rest of the application runs without
//! drawings.

use parking_lot::Mutex;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, trace, warn};

use crate::core::{execute_packet, DrawingRegistry, WorldModel};
use crate::receiver_state::ReceiverState;

/// Default drawing port of the viewer
pub const DEFAULT_PORT: u16 = 32769;

/// Receive buffer size; longer datagrams are truncated by the socket
pub const DEFAULT_MAX_DATAGRAM: usize = 512;

/// Receiver errors
#[derive(Error, Debug)]
pub enum ReceiverError {
    #[error("failed to bind draw port {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create receiver runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Configuration for the draw receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Host to bind (e.g. "0.0.0.0")
    pub bind_host: String,
    pub port: u16,
    /// Receive buffer size in bytes
    pub max_datagram: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_datagram: DEFAULT_MAX_DATAGRAM,
        }
    }
}

impl ReceiverConfig {
    /// Defaults overridden by `DRAW_HOST` / `DRAW_PORT`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(host) = lookup("DRAW_HOST") {
            config.bind_host = host;
        }
        if let Some(port) = lookup("DRAW_PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) => config.port = port,
                Err(e) => {
                    warn!(value = %port, error = %e, default = config.port, "Invalid DRAW_PORT, using default")
                }
            }
        }
        config
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Receive loop counters, updated by the receive thread
#[derive(Debug, Default)]
pub struct ReceiverStats {
    packets: AtomicU64,
    commands: AtomicU64,
    decode_errors: AtomicU64,
    io_errors: AtomicU64,
}

/// Point-in-time copy of [`ReceiverStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub packets: u64,
    pub commands: u64,
    pub decode_errors: u64,
    pub io_errors: u64,
}

impl ReceiverStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets: self.packets.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            io_errors: self.io_errors.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Receiver
// ============================================================================

/// Handle to the background receive thread. Dropping it stops the thread.
pub struct DrawReceiver {
    state: Arc<Mutex<ReceiverState>>,
    stats: Arc<ReceiverStats>,
    running: Arc<AtomicBool>,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl DrawReceiver {
    /// Bind the drawing port and start receiving.
    ///
    /// Binding happens synchronously, so [`DrawReceiver::state`] is already
    /// `Listening` or `Disabled` when this returns.
    pub fn start<W>(config: &ReceiverConfig, registry: Arc<DrawingRegistry>, world: Arc<W>) -> Self
    where
        W: WorldModel + Send + Sync + 'static,
    {
        let state = Arc::new(Mutex::new(ReceiverState::Binding));
        let stats = Arc::new(ReceiverStats::default());
        let running = Arc::new(AtomicBool::new(false));

        let (socket, local_addr) = match Self::bind(config) {
            Ok(bound) => bound,
            Err(e) => {
                warn!(error = %e, "Another instance is probably listening, drawings disabled");
                *state.lock() = ReceiverState::Disabled(e.to_string());
                return Self { state, stats, running, shutdown: None, handle: None, local_addr: None };
            }
        };

        info!(addr = %local_addr, "Draw receiver listening");
        *state.lock() = ReceiverState::Listening(local_addr);
        running.store(true, Ordering::SeqCst);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let max_datagram = config.max_datagram.max(1);
        let thread_state = state.clone();
        let thread_stats = stats.clone();
        let thread_running = running.clone();

        let handle = std::thread::Builder::new()
            .name("draw-receiver".into())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(e) => {
                        let e = ReceiverError::Runtime(e);
                        error!(error = %e, "Draw receiver not started");
                        *thread_state.lock() = ReceiverState::Disabled(e.to_string());
                        thread_running.store(false, Ordering::SeqCst);
                        return;
                    }
                };
                rt.block_on(Self::run(
                    socket,
                    max_datagram,
                    registry,
                    world,
                    thread_stats,
                    thread_running.clone(),
                    shutdown_rx,
                ));
                thread_running.store(false, Ordering::SeqCst);
                *thread_state.lock() = ReceiverState::Stopped;
                info!("Draw receiver stopped");
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(error = %e, "Failed to spawn draw receiver thread");
                running.store(false, Ordering::SeqCst);
                *state.lock() = ReceiverState::Disabled(e.to_string());
                None
            }
        };

        Self {
            state,
            stats,
            running,
            shutdown: Some(shutdown_tx),
            handle,
            local_addr: Some(local_addr),
        }
    }

    fn bind(config: &ReceiverConfig) -> Result<(std::net::UdpSocket, SocketAddr), ReceiverError> {
        let addr = config.bind_addr();
        let bind_err = |source| ReceiverError::Bind { addr: addr.clone(), source };

        let socket = std::net::UdpSocket::bind((config.bind_host.as_str(), config.port)).map_err(bind_err)?;
        socket.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = socket.local_addr().map_err(bind_err)?;
        Ok((socket, local_addr))
    }

    async fn run<W: WorldModel>(
        socket: std::net::UdpSocket,
        max_datagram: usize,
        registry: Arc<DrawingRegistry>,
        world: Arc<W>,
        stats: Arc<ReceiverStats>,
        running: Arc<AtomicBool>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let socket = match tokio::net::UdpSocket::from_std(socket) {
            Ok(socket) => socket,
            Err(e) => {
                error!(error = %e, "Failed to register draw socket");
                return;
            }
        };
        let mut buf = vec![0u8; max_datagram];

        while running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = shutdown.changed() => break,
                result = socket.recv_from(&mut buf) => match result {
                    Ok((len, from)) => {
                        trace!(len, %from, "Draw datagram");
                        let outcome = execute_packet(&buf[..len], &registry, &*world);
                        stats.packets.fetch_add(1, Ordering::Relaxed);
                        stats.commands.fetch_add(outcome.executed as u64, Ordering::Relaxed);
                        if outcome.error.is_some() {
                            stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(e) => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        stats.io_errors.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %e, "Draw receive failed");
                    }
                }
            }
        }
    }

    /// Stop the receive loop and wait for the thread to exit. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Draw receiver thread panicked");
                *self.state.lock() = ReceiverState::Stopped;
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ReceiverState {
        self.state.lock().clone()
    }

    /// Bound address, or None when disabled
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for DrawReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{encode, encode_into, Command, Rgb, Roster, Shape};
    use std::time::{Duration, Instant};

    fn loopback_config(port: u16) -> ReceiverConfig {
        ReceiverConfig { bind_host: "127.0.0.1".into(), port, ..Default::default() }
    }

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        cond()
    }

    fn point_packet(set: &str) -> Vec<u8> {
        let mut packet = encode(&Command::DrawShape(Shape::Point {
            pos: [1.0, 2.0, 3.0],
            size: 4.0,
            color: Rgb::from_bytes([255, 0, 0]),
            set: set.into(),
        }))
        .unwrap();
        encode_into(&mut packet, &Command::SetSwap { prefix: String::new() }).unwrap();
        packet
    }

    #[test]
    fn test_config_defaults_and_overrides() {
        let config = ReceiverConfig::from_lookup(|_| None);
        assert_eq!(config, ReceiverConfig::default());
        assert_eq!(config.bind_addr(), "0.0.0.0:32769");
        assert_eq!(config.max_datagram, 512);

        let config = ReceiverConfig::from_lookup(|key| match key {
            "DRAW_PORT" => Some("40000".into()),
            "DRAW_HOST" => Some("127.0.0.1".into()),
            _ => None,
        });
        assert_eq!(config.bind_addr(), "127.0.0.1:40000");

        // an invalid port keeps the default
        let config = ReceiverConfig::from_lookup(|key| (key == "DRAW_PORT").then(|| "nope".to_string()));
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_receives_and_executes() {
        let registry = Arc::new(DrawingRegistry::new());
        let mut receiver = DrawReceiver::start(&loopback_config(0), registry.clone(), Arc::new(Roster::open()));
        assert!(receiver.state().is_listening());
        let addr = receiver.local_addr().unwrap();

        let client = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        client.send_to(&point_packet("dbg"), addr).unwrap();

        assert!(wait_until(|| registry.shape_set("dbg").map(|s| s.front_len()) == Some(1)));
        assert!(wait_until(|| receiver.stats().commands == 2));
        assert_eq!(receiver.stats().packets, 1);

        receiver.stop();
        assert_eq!(receiver.state(), ReceiverState::Stopped);
        assert!(!receiver.is_running());
    }

    #[test]
    fn test_malformed_datagram_does_not_stop_loop() {
        let registry = Arc::new(DrawingRegistry::new());
        let receiver = DrawReceiver::start(&loopback_config(0), registry.clone(), Arc::new(Roster::open()));
        let addr = receiver.local_addr().unwrap();

        let client = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        client.send_to(&[9, 9, 9], addr).unwrap();
        assert!(wait_until(|| receiver.stats().decode_errors == 1));

        client.send_to(&point_packet("after"), addr).unwrap();
        assert!(wait_until(|| registry.shape_set("after").is_some()));
        assert_eq!(receiver.stats().packets, 2);
    }

    #[test]
    fn test_bind_conflict_disables_receiver() {
        let holder = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();

        let receiver = DrawReceiver::start(
            &loopback_config(port),
            Arc::new(DrawingRegistry::new()),
            Arc::new(Roster::open()),
        );
        assert!(matches!(receiver.state(), ReceiverState::Disabled(_)));
        assert!(receiver.local_addr().is_none());
        assert!(!receiver.is_running());
    }

    #[test]
    fn test_stop_unblocks_idle_receive() {
        let mut receiver = DrawReceiver::start(
            &loopback_config(0),
            Arc::new(DrawingRegistry::new()),
            Arc::new(Roster::open()),
        );
        // no traffic: the loop is parked in recv_from
        std::thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        receiver.stop();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(receiver.state(), ReceiverState::Stopped);

        // second stop is a no-op
        receiver.stop();
    }
}
