//! Status - pool ごとのメッセージ数

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::PoolRef;

/// Approximate visible message counts, keyed by pool key (`QUEUED`,
/// `QUEUED-FAST`, `COMPLETED`, ...). Only pools resolved by the process show up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCounts {
    pools: BTreeMap<String, usize>,
}

impl PoolCounts {
    pub fn insert(&mut self, pool: &PoolRef, count: usize) {
        self.pools.insert(pool.key(), count);
    }

    pub fn get(&self, pool: &PoolRef) -> Option<usize> {
        self.pools.get(&pool.key()).copied()
    }

    pub fn total(&self) -> usize {
        self.pools.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.pools.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
