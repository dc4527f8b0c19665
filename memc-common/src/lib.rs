// memc-common - Shared types for the memcached text-protocol client
//
// This crate holds everything that does not touch a socket: errors, the
// value codec, and the request-side validation rules.

pub mod codec;
pub mod error;
pub mod types;

// Re-export for convenience
pub use codec::*;
pub use error::*;
pub use types::*;
