//! # Synchronous Client API
//!
//! Purpose: Expose a compact, blocking API for storing and fetching values
//! in a set of memcached instances over the text protocol.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `Client` hides sharding, pooling and framing.
//! 2. **Borrow Tokens**: Each operation leases one connection for its key and
//!    hands it back explicitly, with its health recorded.
//! 3. **Fail Fast**: Validation runs before any socket is touched.
//! 4. **Fixed Topology**: The server set is sorted and frozen at construction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use memc_common::{Clock, MemcError, MemcResult, SystemClock};

use crate::pool::{Connection, Dialer, NetDialer};
use crate::router::Router;

/// Configuration for the client and its per-server pools.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server addresses: `host:port` for TCP, `/path` for a Unix socket.
    pub servers: Vec<String>,
    /// Upper bound for establishing a connection.
    pub dial_timeout: Duration,
    /// Optional socket read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional socket write timeout.
    pub write_timeout: Option<Duration>,
    /// Expiration applied when a store call does not set one. Zero means never.
    pub default_ttl: Duration,
    /// Maximum idle connections kept per server.
    pub idle_connections: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            servers: vec!["127.0.0.1:11211".to_string()],
            dial_timeout: Duration::from_secs(5),
            read_timeout: None,
            write_timeout: None,
            default_ttl: Duration::from_secs(60 * 60),
            idle_connections: 1,
        }
    }
}

/// Per-call options for `set` and `add`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Overrides the client's default TTL.
    pub ttl: Option<Duration>,
    /// Opaque flags stored alongside the value.
    pub flags: u32,
}

impl StoreOptions {
    pub fn new() -> Self {
        StoreOptions::default()
    }

    /// Sets the expiration for this call.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets the client flags for this call.
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }
}

/// Builder for clients that need a custom clock or dialer.
pub struct ClientBuilder {
    config: ClientConfig,
    clock: Arc<dyn Clock>,
    dialer: Option<Arc<dyn Dialer>>,
}

impl ClientBuilder {
    /// Replaces the wall clock used for long expirations.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the socket dialer.
    pub fn dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    pub fn build(self) -> MemcResult<Client> {
        let config = self.config;
        if config.servers.is_empty() {
            return Err(MemcError::NoServers);
        }
        let dialer = self.dialer.unwrap_or_else(|| {
            Arc::new(NetDialer {
                connect_timeout: config.dial_timeout,
                read_timeout: config.read_timeout,
                write_timeout: config.write_timeout,
            })
        });
        let router = Router::new(&config.servers, config.idle_connections, dialer);
        debug!(servers = ?config.servers, "memcached client ready");
        Ok(Client {
            config,
            clock: self.clock,
            router,
            closed: AtomicBool::new(false),
        })
    }
}

/// Blocking memcached client with per-server connection pooling.
///
/// Each call routes its key to one server, leases a connection from that
/// server's pool, runs one request/response exchange, and returns the
/// connection. A connection that sees a transport or framing fault is closed
/// instead of reused.
pub struct Client {
    pub(crate) config: ClientConfig,
    pub(crate) clock: Arc<dyn Clock>,
    router: Router,
    closed: AtomicBool,
}

impl Client {
    /// Creates a client for `servers` with default configuration.
    pub fn connect<I, S>(servers: I) -> MemcResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_config(ClientConfig {
            servers: servers.into_iter().map(Into::into).collect(),
            ..ClientConfig::default()
        })
    }

    /// Creates a client with a custom configuration.
    pub fn with_config(config: ClientConfig) -> MemcResult<Self> {
        Self::builder(config).build()
    }

    /// Starts a builder for overriding the clock or dialer.
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            clock: Arc::new(SystemClock),
            dialer: None,
        }
    }

    /// Server addresses in routing order.
    pub fn servers(&self) -> Vec<String> {
        self.router.addrs().map(str::to_string).collect()
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Closes idle connections and makes every later operation fail with
    /// `ClientClosed`. In-flight operations finish; their sockets are then
    /// closed instead of idled.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("closing memcached client");
        self.router.close_all();
    }

    /// Leases a connection for `key`, runs `op`, records its health, and
    /// returns the connection to its pool.
    pub(crate) fn with_conn<T>(
        &self,
        key: &str,
        op: impl FnOnce(&mut Connection) -> MemcResult<T>,
    ) -> MemcResult<T> {
        let mut lease = self.router.get(key)?;
        let result = op(lease.conn());
        lease.conn().record(&result);
        if let Err(err) = &result {
            if err.is_connection_fault() {
                debug!(key, error = %err, "discarding connection after fault");
            }
        }
        self.router.release(lease);
        result
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}
