//! # Error Taxonomy
//!
//! Purpose: One error type shared by the codec, the validation helpers and
//! the networked client, so callers match on a single enum.
//!
//! ## Error Classes
//! 1. **Validation**: bad key, bad TTL, negative delta. Raised before any I/O.
//! 2. **Lifecycle**: the client was closed, or built without servers.
//! 3. **Transport**: dial, read or write failures from the socket.
//! 4. **Protocol outcomes**: miss, not found, not stored, conflict,
//!    non-numeric. These are normal replies, not faults.
//! 5. **Protocol violations**: a reply outside the verb's grammar.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result alias used across the workspace.
pub type MemcResult<T> = Result<T, MemcError>;

/// Errors surfaced by memcached operations.
#[derive(Debug, Error)]
pub enum MemcError {
    /// Key is empty, longer than 250 bytes, or contains whitespace.
    #[error("memc: key is not valid")]
    KeyInvalid,
    /// TTL is non-zero but shorter than one second.
    #[error("memc: expiration must be 0 or at least 1 second")]
    InvalidExpiration,
    /// Increment/decrement delta below zero.
    #[error("memc: delta must be non-negative")]
    NegativeDelta,
    /// The client (or the pool behind it) has been closed.
    #[error("memc: client has been closed")]
    ClientClosed,
    /// A client was constructed without any server address.
    #[error("memc: no servers configured")]
    NoServers,
    /// Opening a socket to a server failed.
    #[error("memc: unable to connect to {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// Reading from or writing to an established socket failed.
    #[error("memc: io error: {0}")]
    Io(#[from] io::Error),
    /// `get` found no value for the key.
    #[error("memc: cache miss")]
    CacheMiss,
    /// `delete`, `incr` or `decr` targeted a missing key.
    #[error("memc: item not found")]
    NotFound,
    /// The server declined to store the item.
    #[error("memc: item not stored")]
    NotStored,
    /// `add` targeted a key that already holds a value.
    #[error("memc: item already exists")]
    Conflict,
    /// `incr`/`decr` against a value that is not a decimal integer.
    #[error("memc: cannot increment or decrement non-numeric value")]
    NonNumeric,
    /// Reply did not match the grammar of the verb that was sent.
    #[error("memc: unexpected reply: {reply:?}")]
    Protocol { reply: String },
    /// Value could not be encoded or decoded.
    #[error("memc: {0}")]
    Codec(#[from] CodecError),
    /// Aggregated failures from a multi-key operation.
    #[error("{0}")]
    Multi(MultiError),
}

impl MemcError {
    /// Builds a protocol violation from raw reply bytes.
    pub fn protocol(reply: &[u8]) -> Self {
        MemcError::Protocol {
            reply: String::from_utf8_lossy(reply).into_owned(),
        }
    }

    /// True when the socket that produced this error can no longer be trusted.
    ///
    /// Only transport failures and grammar violations leave the stream at an
    /// unknown position. Everything else completes a full request/response.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            MemcError::Io(_) | MemcError::Connection { .. } | MemcError::Protocol { .. }
        )
    }

    /// True for normal protocol outcomes such as a cache miss.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            MemcError::CacheMiss
                | MemcError::NotFound
                | MemcError::NotStored
                | MemcError::Conflict
                | MemcError::NonNumeric
        )
    }
}

/// Value codec failures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Fixed-width integer payload had the wrong number of bytes.
    #[error("expected {expected} byte payload, got {actual}")]
    Width { expected: usize, actual: usize },
    /// Text payload was not valid UTF-8.
    #[error("payload is not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    /// Structured codec rejected the value or the bytes.
    #[error("structured codec: {0}")]
    Structured(#[from] serde_json::Error),
}

/// Per-key failures collected by multi-key helpers.
#[derive(Debug, Default)]
pub struct MultiError {
    failures: Vec<(String, MemcError)>,
}

impl MultiError {
    /// Creates an empty collection.
    pub fn new() -> Self {
        MultiError::default()
    }

    /// Records a failure for `key`.
    pub fn push(&mut self, key: impl Into<String>, err: MemcError) {
        self.failures.push((key.into(), err));
    }

    /// Returns true when nothing failed.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failed keys.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Failed keys with their errors, in submission order.
    pub fn failures(&self) -> &[(String, MemcError)] {
        &self.failures
    }

    /// Converts into `Ok(())` when empty, `Err(MemcError::Multi)` otherwise.
    pub fn into_result(self) -> MemcResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(MemcError::Multi(self))
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (key, err)) in self.failures.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{}: {}", key, err)?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_and_outcomes_are_disjoint() {
        let io = MemcError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert!(io.is_connection_fault());
        assert!(!io.is_expected());

        assert!(MemcError::protocol(b"ERROR").is_connection_fault());
        assert!(MemcError::CacheMiss.is_expected());
        assert!(!MemcError::CacheMiss.is_connection_fault());
        assert!(!MemcError::KeyInvalid.is_connection_fault());
        assert!(!MemcError::KeyInvalid.is_expected());
    }

    #[test]
    fn multi_error_lists_every_key() {
        let mut errs = MultiError::new();
        assert!(errs.is_empty());
        errs.push("a", MemcError::NotStored);
        errs.push("b", MemcError::KeyInvalid);
        assert_eq!(errs.len(), 2);

        let text = errs.to_string();
        assert!(text.contains("a: memc: item not stored"));
        assert!(text.contains("b: memc: key is not valid"));

        match errs.into_result() {
            Err(MemcError::Multi(inner)) => assert_eq!(inner.failures()[1].0, "b"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn empty_multi_error_is_ok() {
        assert!(MultiError::new().into_result().is_ok());
    }
}
