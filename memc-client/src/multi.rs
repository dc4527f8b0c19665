//! Multi-key helpers.
//!
//! Each item is routed and executed on its own, so one failing key never
//! hides the outcome of another.

use memc_common::{Decode, Encode, MemcResult, MultiError};

use crate::client::{Client, StoreOptions};

impl Client {
    /// Stores every `(key, value)` pair. All failures are reported together.
    pub fn set_multi<K, V>(&self, items: &[(K, V)]) -> MemcResult<()>
    where
        K: AsRef<str>,
        V: Encode,
    {
        self.set_multi_with(items, StoreOptions::default())
    }

    /// Like [`Client::set_multi`], applying `options` to every item.
    pub fn set_multi_with<K, V>(&self, items: &[(K, V)], options: StoreOptions) -> MemcResult<()>
    where
        K: AsRef<str>,
        V: Encode,
    {
        let mut errs = MultiError::new();
        for (key, value) in items {
            if let Err(err) = self.set_with(key.as_ref(), value, options) {
                errs.push(key.as_ref(), err);
            }
        }
        errs.into_result()
    }

    /// Adds every `(key, value)` pair that is not yet present. All failures,
    /// including keys that already existed, are reported together.
    pub fn add_multi<K, V>(&self, items: &[(K, V)]) -> MemcResult<()>
    where
        K: AsRef<str>,
        V: Encode,
    {
        self.add_multi_with(items, StoreOptions::default())
    }

    /// Like [`Client::add_multi`], applying `options` to every item.
    pub fn add_multi_with<K, V>(&self, items: &[(K, V)], options: StoreOptions) -> MemcResult<()>
    where
        K: AsRef<str>,
        V: Encode,
    {
        let mut errs = MultiError::new();
        for (key, value) in items {
            if let Err(err) = self.add_with(key.as_ref(), value, options) {
                errs.push(key.as_ref(), err);
            }
        }
        errs.into_result()
    }

    /// Fetches every key. One result per key, in input order.
    pub fn get_multi<T, K>(&self, keys: &[K]) -> Vec<MemcResult<T>>
    where
        T: Decode,
        K: AsRef<str>,
    {
        keys.iter().map(|key| self.get(key.as_ref())).collect()
    }
}
