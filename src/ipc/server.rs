//! Viewer server: TCP listener + per-viewer buffers + message framing.
//!
//! Frames are a 4-byte big-endian length followed by a UTF-8 JSON payload.
//! All sockets are non-blocking; a slow viewer only fills its own buffer.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use calloop::generic::Generic;
use calloop::{Interest, LoopHandle, Mode, PostAction};
use tracing::{debug, error, info, warn};

use super::dispatch;
use super::messages::ProtocolError;
use crate::state::StageState;

/// Maximum message payload size (1 MiB).
const MAX_MESSAGE_SIZE: u32 = 1_048_576;

/// Maximum write buffer before dropping events (64 KiB).
const MAX_WRITE_BUFFER: usize = 65_536;

/// Default rate limit: messages per second per viewer.
const DEFAULT_RATE_LIMIT: u32 = 200;

/// Rate limit window.
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(1);

/// Reads attempted per viewer per poll.
const MAX_READS_PER_POLL: usize = 16;

/// Per-viewer inbound rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    window_start: Instant,
    message_count: u32,
    pub max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32, now: Instant) -> Self {
        Self {
            window_start: now,
            message_count: 0,
            max_per_second,
        }
    }

    /// Returns true if a message arriving at `now` is within the limit.
    fn check(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) >= RATE_LIMIT_WINDOW {
            self.window_start = now;
            self.message_count = 1;
            true
        } else {
            self.message_count += 1;
            self.message_count <= self.max_per_second
        }
    }
}

/// One connected viewer.
pub struct Viewer {
    pub stream: TcpStream,
    pub read_buf: Vec<u8>,
    pub write_buf: Vec<u8>,
    pub id: u64,
    pub peer: Option<SocketAddr>,
    pub rate_limiter: RateLimiter,
    /// Events dropped because the write buffer was full.
    pub dropped_events: u64,
}

impl Viewer {
    fn new(stream: TcpStream, id: u64, now: Instant) -> Self {
        if let Err(e) = stream.set_nonblocking(true) {
            warn!(client_id = id, "failed to set non-blocking: {}", e);
        }
        stream.set_nodelay(true).ok();
        let peer = stream.peer_addr().ok();

        Self {
            stream,
            read_buf: Vec::with_capacity(4096),
            write_buf: Vec::new(),
            id,
            peer,
            rate_limiter: RateLimiter::new(DEFAULT_RATE_LIMIT, now),
            dropped_events: 0,
        }
    }

    /// Attempt to flush pending writes without blocking.
    pub fn flush_writes(&mut self) -> io::Result<()> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "write zero")),
                Ok(n) => {
                    self.write_buf.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Enqueue a framed message (length prefix + payload).
    pub fn enqueue_message(&mut self, payload: &str) {
        let bytes = payload.as_bytes();
        let len = bytes.len() as u32;
        self.write_buf.extend_from_slice(&len.to_be_bytes());
        self.write_buf.extend_from_slice(bytes);
    }

    /// Enqueue a broadcast event, dropping it if this viewer is too far
    /// behind.  Returns false when dropped.
    pub fn enqueue_event(&mut self, payload: &str) -> bool {
        if self.write_buf.len() > MAX_WRITE_BUFFER {
            self.dropped_events += 1;
            if self.dropped_events.is_power_of_two() {
                warn!(
                    client_id = self.id,
                    dropped = self.dropped_events,
                    "write buffer full, dropping events"
                );
            }
            return false;
        }
        self.enqueue_message(payload);
        true
    }

    /// Read whatever is available.  `Ok(false)` means the peer closed.
    fn fill_read_buf(&mut self) -> io::Result<bool> {
        let mut buf = [0u8; 4096];
        for _ in 0..MAX_READS_PER_POLL {
            match self.stream.read(&mut buf) {
                Ok(0) => return Ok(false),
                Ok(n) => self.read_buf.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Extract complete framed messages from the read buffer.
    pub fn extract_messages(&mut self) -> Result<Vec<Vec<u8>>, ProtocolError> {
        let mut messages = Vec::new();
        while self.read_buf.len() >= 4 {
            let len = u32::from_be_bytes([
                self.read_buf[0],
                self.read_buf[1],
                self.read_buf[2],
                self.read_buf[3],
            ]);
            if len > MAX_MESSAGE_SIZE {
                self.read_buf.clear();
                return Err(ProtocolError::Oversized(len));
            }
            let total = 4 + len as usize;
            if self.read_buf.len() < total {
                break;
            }
            let payload = self.read_buf[4..total].to_vec();
            self.read_buf.drain(..total);
            messages.push(payload);
        }
        Ok(messages)
    }
}

/// Viewer server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Log every message in and out.
    pub trace: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 5000)),
            trace: false,
        }
    }
}

/// Listener bookkeeping and all viewer connections.
pub struct ViewerServer {
    pub clients: HashMap<u64, Viewer>,
    next_client_id: u64,
    pub trace: bool,
}

impl ViewerServer {
    pub fn new(trace: bool) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            trace,
        }
    }

    /// Bind the listener and register it with the event loop.  Returns the
    /// bound address (useful when binding port 0).
    pub fn bind(
        addr: SocketAddr,
        loop_handle: &LoopHandle<'static, StageState>,
    ) -> anyhow::Result<SocketAddr> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local = listener.local_addr()?;

        info!(%local, "viewer server listening");

        let source = Generic::new(listener, Interest::READ, Mode::Level);
        loop_handle
            .insert_source(source, |_event, listener, state| {
                loop {
                    match listener.accept() {
                        Ok((stream, _addr)) => {
                            Self::accept(state, stream, Instant::now());
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) => {
                            error!("accept error: {}", e);
                            break;
                        }
                    }
                }
                Ok(PostAction::Continue)
            })
            .map_err(|e| e.error)?;

        Ok(local)
    }

    /// Register a new viewer and send it the current snapshot.
    pub fn accept(state: &mut StageState, stream: TcpStream, now: Instant) -> u64 {
        let client_id = state.viewers.next_client_id;
        state.viewers.next_client_id += 1;

        let mut viewer = Viewer::new(stream, client_id, now);
        info!(client_id, peer = ?viewer.peer, "viewer connected");

        if let Some(payload) = dispatch::snapshot_message(state) {
            if state.viewers.trace {
                info!(client_id, "handshake >> {}", payload);
            }
            viewer.enqueue_message(&payload);
        }
        if let Err(e) = viewer.flush_writes() {
            debug!(client_id, "handshake write failed: {}", e);
            return client_id;
        }

        state.viewers.clients.insert(client_id, viewer);
        client_id
    }

    /// Read from every viewer, dispatch complete messages, flush replies.
    /// Called once per event loop iteration.
    pub fn poll_viewers(state: &mut StageState, now: Instant) {
        let client_ids: Vec<u64> = state.viewers.clients.keys().copied().collect();
        let mut disconnected = Vec::new();

        for client_id in client_ids {
            let messages = {
                let Some(viewer) = state.viewers.clients.get_mut(&client_id) else {
                    continue;
                };
                match viewer.fill_read_buf() {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(client_id, "viewer closed connection");
                        disconnected.push(client_id);
                        continue;
                    }
                    Err(e) => {
                        debug!(client_id, "read error: {}", e);
                        disconnected.push(client_id);
                        continue;
                    }
                }
                match viewer.extract_messages() {
                    Ok(m) => m,
                    Err(e) => {
                        error!(client_id, "{}", e);
                        disconnected.push(client_id);
                        continue;
                    }
                }
            };

            for msg in messages {
                let rate_ok = state
                    .viewers
                    .clients
                    .get_mut(&client_id)
                    .map(|v| v.rate_limiter.check(now))
                    .unwrap_or(false);

                if !rate_ok {
                    warn!(client_id, "rate limit exceeded, dropping message");
                    if let Some(resp) = dispatch::error_response("rate limit exceeded") {
                        if let Some(viewer) = state.viewers.clients.get_mut(&client_id) {
                            viewer.enqueue_message(&resp);
                        }
                    }
                    continue;
                }

                if state.viewers.trace {
                    info!(client_id, "<< {}", String::from_utf8_lossy(&msg));
                }
                if let Some(resp) = dispatch::handle_message(state, client_id, &msg, now) {
                    if state.viewers.trace {
                        info!(client_id, ">> {}", resp);
                    }
                    if let Some(viewer) = state.viewers.clients.get_mut(&client_id) {
                        viewer.enqueue_message(&resp);
                    }
                }
            }

            if let Some(viewer) = state.viewers.clients.get_mut(&client_id) {
                if let Err(e) = viewer.flush_writes() {
                    debug!(client_id, "write error: {}", e);
                    disconnected.push(client_id);
                }
            }
        }

        state.viewers.remove_all(disconnected);
    }

    /// Send one payload to every viewer.  Returns how many viewers it was
    /// queued for.  Viewers whose sockets fail are removed.
    pub fn broadcast(&mut self, payload: &str) -> usize {
        if self.trace {
            info!("broadcast >> {}", payload);
        }
        let mut queued = 0;
        let mut failed = Vec::new();
        for viewer in self.clients.values_mut() {
            if viewer.enqueue_event(payload) {
                queued += 1;
            }
            if let Err(e) = viewer.flush_writes() {
                debug!(client_id = viewer.id, "write error: {}", e);
                failed.push(viewer.id);
            }
        }
        self.remove_all(failed);
        queued
    }

    fn remove_all(&mut self, ids: Vec<u64>) {
        for id in ids {
            if self.clients.remove(&id).is_some() {
                info!(client_id = id, "removing disconnected viewer");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

// ── Test helpers ───────────────────────────────────────────

/// A connected (server side, peer side) loopback pair.
#[cfg(test)]
pub(crate) fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let peer = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server_side, _) = listener.accept().unwrap();
    (server_side, peer)
}

/// Blocking read of one frame from the peer side.
#[cfg(test)]
pub(crate) fn read_frame(peer: &mut TcpStream) -> String {
    peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut len = [0u8; 4];
    peer.read_exact(&mut len).unwrap();
    let mut payload = vec![0u8; u32::from_be_bytes(len) as usize];
    peer.read_exact(&mut payload).unwrap();
    String::from_utf8(payload).unwrap()
}

#[cfg(test)]
pub(crate) fn write_frame(peer: &mut TcpStream, payload: &str) {
    peer.write_all(&(payload.len() as u32).to_be_bytes()).unwrap();
    peer.write_all(payload.as_bytes()).unwrap();
}

// ── Tests ──────────────────────────────────────────────────
