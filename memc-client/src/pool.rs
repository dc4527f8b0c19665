//! # Connection Pool
//!
//! Purpose: Reuse sockets to one memcached instance so each command does not
//! pay for a fresh TCP or Unix handshake.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded stack of idle connections.
//! 2. **Minimal Locking**: Hold the mutex only while moving idle connections;
//!    dialing and closing happen outside it.
//! 3. **LIFO Reuse**: The most recently released socket is handed out first.
//! 4. **Health Gate**: A connection that saw a fault never goes back idle.

use std::fmt;
use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, trace};

use memc_common::{MemcError, MemcResult};

/// Byte stream to a memcached instance.
pub trait Transport: Read + Write + Send {
    /// Closes the underlying socket.
    fn close(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

#[cfg(unix)]
impl Transport for std::os::unix::net::UnixStream {
    fn close(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

/// Opens transports to server addresses.
pub trait Dialer: Send + Sync {
    /// Connects to `addr`.
    fn dial(&self, addr: &str) -> io::Result<Box<dyn Transport>>;
}

/// Dialer for `host:port` TCP addresses and `/path` Unix sockets.
#[derive(Debug, Clone)]
pub struct NetDialer {
    /// Upper bound for establishing a TCP connection.
    pub connect_timeout: Duration,
    /// Optional socket read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional socket write timeout.
    pub write_timeout: Option<Duration>,
}

impl NetDialer {
    fn dial_tcp(&self, addr: &str) -> io::Result<TcpStream> {
        let mut last_err = None;
        for resolved in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&resolved, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(self.read_timeout)?;
                    stream.set_write_timeout(self.write_timeout)?;
                    // Disable Nagle; commands are small and latency bound.
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
        }))
    }

    #[cfg(unix)]
    fn dial_unix(&self, path: &str) -> io::Result<Box<dyn Transport>> {
        let stream = std::os::unix::net::UnixStream::connect(path)?;
        stream.set_read_timeout(self.read_timeout)?;
        stream.set_write_timeout(self.write_timeout)?;
        Ok(Box::new(stream))
    }

    #[cfg(not(unix))]
    fn dial_unix(&self, _path: &str) -> io::Result<Box<dyn Transport>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "unix sockets are not available on this platform",
        ))
    }
}

impl Dialer for NetDialer {
    fn dial(&self, addr: &str) -> io::Result<Box<dyn Transport>> {
        if addr.starts_with('/') {
            return self.dial_unix(addr);
        }
        Ok(Box::new(self.dial_tcp(addr)?))
    }
}

pub(crate) type Reader = BufReader<Box<dyn Transport>>;

/// Single socket with reusable buffers and a health flag.
pub struct Connection {
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: Reader,
    write_buf: BytesMut,
    line_buf: Vec<u8>,
    healthy: bool,
}

impl Connection {
    pub(crate) fn new(transport: Box<dyn Transport>) -> Self {
        Connection {
            reader: BufReader::new(transport),
            write_buf: BytesMut::with_capacity(256),
            line_buf: Vec::with_capacity(128),
            healthy: true,
        }
    }

    /// Encodes one request, writes it in a single flush, and parses the reply.
    pub(crate) fn round_trip<T>(
        &mut self,
        encode: impl FnOnce(&mut BytesMut),
        decode: impl FnOnce(&mut Reader, &mut Vec<u8>) -> MemcResult<T>,
    ) -> MemcResult<T> {
        self.write_buf.clear();
        encode(&mut self.write_buf);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        decode(&mut self.reader, &mut self.line_buf)
    }

    /// Records the outcome of an operation. Faults are sticky.
    pub(crate) fn record<T>(&mut self, result: &MemcResult<T>) {
        if let Err(err) = result {
            if err.is_connection_fault() {
                self.healthy = false;
            }
        }
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.healthy
    }

    fn close(mut self) {
        // Best effort; the socket is dropped either way.
        if let Err(err) = self.reader.get_mut().close() {
            trace!(error = %err, "ignoring close error");
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("healthy", &self.healthy)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capacity {
    Open(usize),
    Closed,
}

struct PoolState {
    idle: Vec<Connection>,
    capacity: Capacity,
}

/// Idle connection store for one server address.
pub(crate) struct ServerPool {
    addr: String,
    dialer: Arc<dyn Dialer>,
    state: Mutex<PoolState>,
}

impl ServerPool {
    pub(crate) fn new(addr: impl Into<String>, max_idle: usize, dialer: Arc<dyn Dialer>) -> Self {
        ServerPool {
            addr: addr.into(),
            dialer,
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(max_idle),
                capacity: Capacity::Open(max_idle),
            }),
        }
    }

    pub(crate) fn addr(&self) -> &str {
        &self.addr
    }

    /// Hands out the most recently idled connection, or dials a new one.
    pub(crate) fn acquire(&self) -> MemcResult<Connection> {
        {
            let mut state = self.lock();
            if state.capacity == Capacity::Closed {
                return Err(MemcError::ClientClosed);
            }
            if let Some(conn) = state.idle.pop() {
                trace!(addr = %self.addr, "reusing idle connection");
                return Ok(conn);
            }
        }

        debug!(addr = %self.addr, "dialing memcached");
        match self.dialer.dial(&self.addr) {
            Ok(transport) => Ok(Connection::new(transport)),
            Err(source) => {
                debug!(addr = %self.addr, error = %source, "dial failed");
                Err(MemcError::Connection {
                    addr: self.addr.clone(),
                    source,
                })
            }
        }
    }

    /// Returns a connection to the idle store, or closes it.
    pub(crate) fn release(&self, conn: Connection) {
        let rejected = {
            let mut state = self.lock();
            let reason = match state.capacity {
                Capacity::Closed => Some("pool closed"),
                _ if !conn.is_healthy() => Some("unhealthy"),
                Capacity::Open(max) if state.idle.len() >= max => Some("idle capacity reached"),
                Capacity::Open(_) => None,
            };
            match reason {
                Some(reason) => Some((conn, reason)),
                None => {
                    state.idle.push(conn);
                    None
                }
            }
        };

        if let Some((conn, reason)) = rejected {
            trace!(addr = %self.addr, reason, "discarding connection");
            conn.close();
        }
    }

    /// Closes every idle connection and refuses further acquisitions.
    pub(crate) fn close(&self) {
        let idle = {
            let mut state = self.lock();
            state.capacity = Capacity::Closed;
            std::mem::take(&mut state.idle)
        };

        debug!(addr = %self.addr, idle = idle.len(), "closing pool");
        for conn in idle {
            conn.close();
        }
    }

    #[cfg(test)]
    pub(crate) fn idle_len(&self) -> usize {
        self.lock().idle.len()
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // The state is a plain stack; a panic elsewhere cannot corrupt it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
