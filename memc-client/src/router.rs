//! # Shard Router
//!
//! Maps each key to one server pool. The address set is sorted once at
//! construction and never changes, so every router built from the same
//! addresses routes every key the same way.

use std::sync::Arc;

use memc_common::MemcResult;

use crate::pool::{Connection, Dialer, ServerPool};

const SEED: u8 = 37;

/// A connection borrowed from the pool at `pool`.
///
/// Hand it back with [`Router::release`] once the operation is done.
#[derive(Debug)]
pub(crate) struct Lease {
    pool: usize,
    conn: Connection,
}

impl Lease {
    pub(crate) fn conn(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

pub(crate) struct Router {
    pools: Vec<ServerPool>,
}

impl Router {
    pub(crate) fn new(addrs: &[String], max_idle: usize, dialer: Arc<dyn Dialer>) -> Self {
        let mut sorted = addrs.to_vec();
        sorted.sort();
        let pools = sorted
            .into_iter()
            .map(|addr| ServerPool::new(addr, max_idle, dialer.clone()))
            .collect();
        Router { pools }
    }

    /// Server addresses in routing order.
    pub(crate) fn addrs(&self) -> impl Iterator<Item = &str> {
        self.pools.iter().map(ServerPool::addr)
    }

    /// Index of the pool owning `key`.
    pub(crate) fn pick(&self, key: &str) -> usize {
        if self.pools.len() == 1 {
            return 0;
        }
        let hash = key.bytes().fold(SEED, |acc, b| acc ^ b);
        hash as usize % self.pools.len()
    }

    pub(crate) fn get(&self, key: &str) -> MemcResult<Lease> {
        let pool = self.pick(key);
        let conn = self.pools[pool].acquire()?;
        Ok(Lease { pool, conn })
    }

    pub(crate) fn release(&self, lease: Lease) {
        self.pools[lease.pool].release(lease.conn);
    }

    /// Closes every pool. Pool shutdown is best effort and cannot fail.
    pub(crate) fn close_all(&self) {
        for pool in &self.pools {
            pool.close();
        }
    }
}
