//! # memc Sync Client
//!
//! Purpose: Provide a blocking memcached client that speaks the text
//! protocol, shards keys across several instances, and pools connections per
//! instance to avoid repeated handshakes.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse sockets, bounded per server.
//! 2. **Deterministic Sharding**: The same key maps to the same server for a
//!    given server set, in every process.
//! 3. **Minimal Allocation**: Reuse buffers for framing and parsing.
//! 4. **Protocol Clarity**: Encode/parse the text protocol explicitly.
//!
//! ## Example
//!
//! ```rust,no_run
//! use memc_client::Client;
//!
//! let client = Client::connect(["127.0.0.1:11211"])?;
//! client.set("greeting", "hello")?;
//! let value: String = client.get("greeting")?;
//! assert_eq!(value, "hello");
//! # Ok::<(), memc_client::MemcError>(())
//! ```

mod client;
mod multi;
mod pool;
mod protocol;
mod router;
mod verbs;

pub use client::{Client, ClientBuilder, ClientConfig, StoreOptions};
pub use memc_common::{
    Clock, CodecError, Countable, Decode, Encode, FixedClock, Json, MemcError, MemcResult,
    MultiError, SystemClock,
};
pub use pool::{Dialer, NetDialer, Transport};
