//! Single-key verbs: set, add, get, delete, incr, decr.

use memc_common::{
    expiration_seconds, validate_key, Countable, Decode, Encode, MemcError, MemcResult,
};

use crate::client::{Client, StoreOptions};
use crate::protocol::{self, ArithVerb, StoreVerb};

impl Client {
    /// Stores `value` under `key`, replacing any existing value.
    pub fn set<V: Encode + ?Sized>(&self, key: &str, value: &V) -> MemcResult<()> {
        self.store(StoreVerb::Set, key, value, StoreOptions::default())
    }

    /// Like [`Client::set`], with an explicit TTL and/or flags.
    pub fn set_with<V: Encode + ?Sized>(
        &self,
        key: &str,
        value: &V,
        options: StoreOptions,
    ) -> MemcResult<()> {
        self.store(StoreVerb::Set, key, value, options)
    }

    /// Stores `value` only if `key` holds nothing yet.
    ///
    /// Fails with `NotStored` (or `Conflict`, depending on the server) when
    /// the key already exists.
    pub fn add<V: Encode + ?Sized>(&self, key: &str, value: &V) -> MemcResult<()> {
        self.store(StoreVerb::Add, key, value, StoreOptions::default())
    }

    /// Like [`Client::add`], with an explicit TTL and/or flags.
    pub fn add_with<V: Encode + ?Sized>(
        &self,
        key: &str,
        value: &V,
        options: StoreOptions,
    ) -> MemcResult<()> {
        self.store(StoreVerb::Add, key, value, options)
    }

    /// Fetches and decodes the value under `key`.
    ///
    /// A missing key is `Err(MemcError::CacheMiss)`.
    pub fn get<T: Decode>(&self, key: &str) -> MemcResult<T> {
        self.get_with_flags(key).map(|(value, _)| value)
    }

    /// Fetches the value under `key` together with its stored flags.
    pub fn get_with_flags<T: Decode>(&self, key: &str) -> MemcResult<(T, u32)> {
        validate_key(key)?;
        let item = self.with_conn(key, |conn| {
            conn.round_trip(
                |buf| protocol::encode_get(buf, key),
                |reader, line| protocol::read_get_reply(reader, line, key),
            )
        })?;
        let value = T::decode(&item.data)?;
        Ok((value, item.flags))
    }

    /// Removes `key`. A missing key is `Err(MemcError::NotFound)`.
    pub fn delete(&self, key: &str) -> MemcResult<()> {
        validate_key(key)?;
        self.with_conn(key, |conn| {
            conn.round_trip(
                |buf| protocol::encode_delete(buf, key),
                |reader, line| protocol::read_delete_reply(reader, line),
            )
        })
    }

    /// Adds `delta` to the decimal counter under `key` and returns the result.
    pub fn increment<T: Countable>(&self, key: &str, delta: T) -> MemcResult<T> {
        self.arith(ArithVerb::Incr, key, delta)
    }

    /// Subtracts `delta` from the counter under `key`. memcached clamps at 0.
    pub fn decrement<T: Countable>(&self, key: &str, delta: T) -> MemcResult<T> {
        self.arith(ArithVerb::Decr, key, delta)
    }

    fn store<V: Encode + ?Sized>(
        &self,
        verb: StoreVerb,
        key: &str,
        value: &V,
        options: StoreOptions,
    ) -> MemcResult<()> {
        validate_key(key)?;
        let ttl = options.ttl.unwrap_or(self.config.default_ttl);
        let exptime = expiration_seconds(ttl, self.clock.as_ref())?;
        let payload = value.encode()?;

        self.with_conn(key, |conn| {
            conn.round_trip(
                |buf| protocol::encode_store(buf, verb, key, options.flags, exptime, &payload),
                |reader, line| protocol::read_store_reply(reader, line, verb),
            )
        })
    }

    fn arith<T: Countable>(&self, verb: ArithVerb, key: &str, delta: T) -> MemcResult<T> {
        let delta = delta.to_delta()?;
        validate_key(key)?;

        let counter = self.with_conn(key, |conn| {
            conn.round_trip(
                |buf| protocol::encode_arith(buf, verb, key, delta),
                |reader, line| protocol::read_arith_reply(reader, line),
            )
        })?;
        T::from_counter(counter).ok_or_else(|| MemcError::Protocol {
            reply: counter.to_string(),
        })
    }
}
