//! Reconnecting Modbus TCP transport with a background heartbeat.
//!
//! [`Transport::send_request`] is the only path to the wire. It holds one
//! lock for a whole exchange, including any reconnect-and-retry, so the
//! application and the heartbeat thread never interleave telegrams.

use crate::od::ObjectKey;
use crate::telegram::{self, hex, MbapHeader, MAX_PDU_LEN};
use dryve_common::config::TransportConfig;
use dryve_common::error::{DryveError, DryveResult};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// A synchronous request/response channel to the drive.
///
/// Implementations return the transaction id they assigned together with
/// the complete response frame (MBAP header + PDU).
pub trait RequestChannel: Send + Sync {
    /// Send one request PDU and wait for its response frame.
    ///
    /// # Errors
    ///
    /// Returns a transport or framing error if no matching response arrives.
    fn send_request(&self, pdu: &[u8]) -> DryveResult<(u16, Vec<u8>)>;
}

/// Connection state of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,
    /// Connected and operational.
    Connected,
    /// Link failed, next attempt will reconnect.
    Reconnecting,
}

struct Link {
    stream: Option<TcpStream>,
    transaction_id: u16,
    state: ConnectionState,
}

impl Link {
    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    fn drop_stream(&mut self, state: ConnectionState) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.state = state;
    }
}

struct Heartbeat {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

fn io_error(context: &str, e: &io::Error) -> DryveError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
            DryveError::ConnectionTimeout(format!("{context}: {e}"))
        }
        _ => DryveError::ConnectionLost(format!("{context}: {e}")),
    }
}

/// TCP transport to one dryve D1.
pub struct Transport {
    config: TransportConfig,
    server_addr: SocketAddr,
    link: Mutex<Link>,
    heartbeat: Mutex<Option<Heartbeat>>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("server_addr", &self.server_addr)
            .field("unit_id", &self.config.unit_id)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Create a disconnected transport.
    ///
    /// # Errors
    ///
    /// Returns [`DryveError::Config`] if the address does not resolve.
    pub fn new(config: TransportConfig) -> DryveResult<Self> {
        let server_addr = config
            .server_addr()
            .map_err(|e| DryveError::Config(e.to_string()))?;
        Ok(Self {
            config,
            server_addr,
            link: Mutex::new(Link {
                stream: None,
                transaction_id: 0,
                state: ConnectionState::Disconnected,
            }),
            heartbeat: Mutex::new(None),
        })
    }

    /// Create, connect and start the configured heartbeat.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid, the first connection
    /// fails, or the heartbeat thread cannot be spawned.
    pub fn open(config: TransportConfig) -> DryveResult<Arc<Self>> {
        let heartbeat = config.heartbeat_interval;
        let transport = Arc::new(Self::new(config)?);
        transport.connect()?;
        if let Some(interval) = heartbeat {
            transport.start_heartbeat(interval)?;
        }
        Ok(transport)
    }

    fn lock_link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_heartbeat(&self) -> MutexGuard<'_, Option<Heartbeat>> {
        self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Address of the drive.
    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Establish the connection if it is not already up.
    ///
    /// # Errors
    ///
    /// Returns [`DryveError::ConnectionTimeout`] or
    /// [`DryveError::ConnectionLost`] if the drive cannot be reached.
    pub fn connect(&self) -> DryveResult<()> {
        let mut link = self.lock_link();
        self.ensure_connected(&mut link)
    }

    fn ensure_connected(&self, link: &mut Link) -> DryveResult<()> {
        if link.stream.is_some() {
            return Ok(());
        }

        info!(addr = %self.server_addr, "Connecting to dryve D1");

        let stream = TcpStream::connect_timeout(&self.server_addr, self.config.connect_timeout)
            .map_err(|e| io_error("connect", &e))?;
        stream
            .set_read_timeout(Some(self.config.io_timeout))
            .map_err(|e| io_error("set read timeout", &e))?;
        stream
            .set_write_timeout(Some(self.config.io_timeout))
            .map_err(|e| io_error("set write timeout", &e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| io_error("set TCP_NODELAY", &e))?;

        link.stream = Some(stream);
        link.state = ConnectionState::Connected;

        info!(addr = %self.server_addr, "Connected to dryve D1");
        Ok(())
    }

    /// Stop the heartbeat and drop the connection.
    pub fn close(&self) {
        self.stop_heartbeat();
        let mut link = self.lock_link();
        if link.stream.is_some() {
            info!(addr = %self.server_addr, "Closing connection");
        }
        link.drop_stream(ConnectionState::Disconnected);
    }

    /// Whether a socket is currently open.
    pub fn is_connected(&self) -> bool {
        self.lock_link().stream.is_some()
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.lock_link().state
    }

    /// Transaction id of the most recent request (0 before the first).
    pub fn last_transaction_id(&self) -> u16 {
        self.lock_link().transaction_id
    }

    /// One send/receive on the current socket, connecting first if needed.
    fn exchange(&self, link: &mut Link, frame: &[u8], transaction_id: u16) -> DryveResult<Vec<u8>> {
        self.ensure_connected(link)?;
        let result = Self::exchange_on(link, frame, transaction_id);
        if let Err(e) = &result {
            // Link errors and desynchronized streams both leave unread bytes
            // behind; the socket cannot be reused.
            let state = if e.is_link_failure() {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Disconnected
            };
            link.drop_stream(state);
        }
        result
    }

    fn exchange_on(link: &mut Link, frame: &[u8], transaction_id: u16) -> DryveResult<Vec<u8>> {
        let stream = link
            .stream
            .as_mut()
            .ok_or_else(|| DryveError::ConnectionLost("not connected".into()))?;

        trace!(transaction_id, frame = %hex(frame), "tx");
        stream
            .write_all(frame)
            .map_err(|e| io_error("send failed", &e))?;

        let mut response = vec![0u8; MbapHeader::SIZE];
        stream
            .read_exact(&mut response)
            .map_err(|e| io_error("receive header failed", &e))?;

        let header = MbapHeader::from_bytes(&response)?;
        if header.transaction_id != transaction_id {
            return Err(DryveError::TransactionMismatch {
                expected: transaction_id,
                actual: header.transaction_id,
            });
        }
        if header.protocol_id != 0 {
            return Err(DryveError::Framing(format!(
                "invalid protocol id: {}",
                header.protocol_id
            )));
        }

        let pdu_len = header.pdu_len();
        if pdu_len == 0 || pdu_len > MAX_PDU_LEN {
            return Err(DryveError::Framing(format!(
                "response PDU length {pdu_len} outside 1..={MAX_PDU_LEN}"
            )));
        }

        response.resize(MbapHeader::SIZE + pdu_len, 0);
        stream
            .read_exact(&mut response[MbapHeader::SIZE..])
            .map_err(|e| io_error("receive PDU failed", &e))?;

        trace!(transaction_id, frame = %hex(&response), "rx");
        Ok(response)
    }

    /// Send `pdu` and return the assigned transaction id and the response frame.
    ///
    /// Link failures close the socket, wait `reconnect_delay`, reconnect and
    /// resend the same frame, up to `max_attempts` times. A response with a
    /// foreign transaction id or broken framing is not retried.
    ///
    /// # Errors
    ///
    /// Returns [`DryveError::RetriesExhausted`] once the attempts are spent,
    /// or the first non-link error.
    pub fn send_request(&self, pdu: &[u8]) -> DryveResult<(u16, Vec<u8>)> {
        let mut link = self.lock_link();
        // One id per request, reused on every reconnect attempt. Each retry
        // runs on a fresh socket, so no stale response can carry it.
        let transaction_id = link.next_transaction_id();
        let frame = telegram::frame_request(transaction_id, self.config.unit_id, pdu)?;
        let max_attempts = self.config.max_attempts.max(1);

        let mut last_error = None;
        for attempt in 1..=max_attempts {
            match self.exchange(&mut link, &frame, transaction_id) {
                Ok(response) => {
                    if attempt > 1 {
                        info!(transaction_id, attempt, "Exchange recovered after reconnect");
                    }
                    return Ok((transaction_id, response));
                }
                Err(e) if e.is_link_failure() => {
                    warn!(
                        transaction_id,
                        attempt,
                        max = max_attempts,
                        error = %e,
                        "Exchange failed, reconnecting"
                    );
                    last_error = Some(e);
                    if attempt < max_attempts {
                        thread::sleep(self.config.reconnect_delay);
                    }
                }
                Err(e) => {
                    warn!(transaction_id, error = %e, "Exchange rejected");
                    return Err(e);
                }
            }
        }

        Err(DryveError::RetriesExhausted {
            attempts: max_attempts,
            last: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// Start a thread that reads the Statusword every `interval`.
    ///
    /// Heartbeat failures are logged and never stop the loop. Calling this
    /// while a heartbeat is running does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DryveError::Config`] if the thread cannot be spawned.
    pub fn start_heartbeat(self: &Arc<Self>, interval: Duration) -> DryveResult<()> {
        let mut slot = self.lock_heartbeat();
        if slot.is_some() {
            return Ok(());
        }

        let pdu = telegram::build_read_request(ObjectKey::Statusword)?;
        let weak: Weak<Self> = Arc::downgrade(self);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("dryve-heartbeat".into())
            .spawn(move || {
                debug!(interval_ms = interval.as_millis(), "Heartbeat started");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let Some(transport) = weak.upgrade() else {
                        break;
                    };
                    match transport.send_request(&pdu) {
                        Ok((transaction_id, _)) => trace!(transaction_id, "Heartbeat ok"),
                        Err(e) => warn!(error = %e, "Heartbeat failed"),
                    }
                }
                debug!("Heartbeat stopped");
            })
            .map_err(|e| DryveError::Config(format!("Failed to spawn heartbeat thread: {e}")))?;

        *slot = Some(Heartbeat { stop_tx, handle });
        Ok(())
    }

    /// Stop the heartbeat thread and wait for it to exit.
    pub fn stop_heartbeat(&self) {
        let heartbeat = self.lock_heartbeat().take();
        if let Some(heartbeat) = heartbeat {
            Self::join_heartbeat(heartbeat);
        }
    }

    /// Whether a heartbeat thread is running.
    pub fn heartbeat_running(&self) -> bool {
        self.lock_heartbeat().is_some()
    }

    fn join_heartbeat(heartbeat: Heartbeat) {
        let _ = heartbeat.stop_tx.send(());
        // The last Arc may be released by the heartbeat thread itself.
        let own_thread: ThreadId = thread::current().id();
        if heartbeat.handle.thread().id() != own_thread && heartbeat.handle.join().is_err() {
            warn!("Heartbeat thread panicked");
        }
    }
}

impl RequestChannel for Transport {
    fn send_request(&self, pdu: &[u8]) -> DryveResult<(u16, Vec<u8>)> {
        Transport::send_request(self, pdu)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        let heartbeat = self
            .heartbeat
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(heartbeat) = heartbeat {
            Self::join_heartbeat(heartbeat);
        }
        let link = self.link.get_mut().unwrap_or_else(PoisonError::into_inner);
        link.drop_stream(ConnectionState::Disconnected);
    }
}
