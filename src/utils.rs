// src/utils.rs
// Fan-out helpers shared by the aggregators

use crate::error::MarketError;
use futures::future::join_all;
use std::future::Future;

/// Outcome of a batch of independent lookups.
///
/// Every key shows up in `values`; keys whose lookup failed carry the
/// sentinel there and are also listed in `failed` with their error.
#[derive(Debug)]
pub struct Settled<K, T> {
    pub values: Vec<(K, T)>,
    pub failed: Vec<(K, MarketError)>,
}

impl<K: PartialEq, T> Settled<K, T> {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_keys(&self) -> impl Iterator<Item = &K> {
        self.failed.iter().map(|(key, _)| key)
    }

    pub fn value(&self, key: &K) -> Option<&T> {
        self.values.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Runs all tasks concurrently; one failure never aborts the others.
pub async fn join_isolated<K, T, Fut>(tasks: Vec<(K, Fut)>, sentinel: T) -> Settled<K, T>
where
    K: Copy,
    T: Clone,
    Fut: Future<Output = Result<T, MarketError>>,
{
    let (keys, futures): (Vec<K>, Vec<Fut>) = tasks.into_iter().unzip();
    let results = join_all(futures).await;

    let mut settled = Settled {
        values: Vec::with_capacity(keys.len()),
        failed: Vec::new(),
    };
    for (key, result) in keys.into_iter().zip(results) {
        match result {
            Ok(value) => settled.values.push((key, value)),
            Err(e) => {
                settled.values.push((key, sentinel.clone()));
                settled.failed.push((key, e));
            }
        }
    }
    settled
}
