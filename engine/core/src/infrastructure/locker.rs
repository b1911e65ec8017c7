// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! In-memory TTL locker.
//!
//! Single-process implementation of the advisory [`Locker`] port. A
//! production deployment backs the same port with a shared cache so the
//! guard holds across worker processes; the semantics here are the
//! contract either way: acquire-with-expiry, explicit release, expired
//! locks are free for the taking.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::locks::Locker;

#[derive(Default)]
pub struct InMemoryLocker {
    held: DashMap<String, Instant>,
}

impl InMemoryLocker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Locker for InMemoryLocker {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        match self.held.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if *entry.get() <= now {
                    entry.insert(now + ttl);
                    true
                } else {
                    false
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(now + ttl);
                true
            }
        }
    }

    async fn release(&self, key: &str) {
        self.held.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let locker = InMemoryLocker::new();
        assert!(locker.try_acquire("tick", Duration::from_secs(30)).await);
        assert!(!locker.try_acquire("tick", Duration::from_secs(30)).await);
    }

    #[tokio::test]
    async fn release_frees_the_lock() {
        let locker = InMemoryLocker::new();
        assert!(locker.try_acquire("tick", Duration::from_secs(30)).await);
        locker.release("tick").await;
        assert!(locker.try_acquire("tick", Duration::from_secs(30)).await);
    }

    #[tokio::test]
    async fn expired_lock_is_free_for_the_taking() {
        let locker = InMemoryLocker::new();
        assert!(locker.try_acquire("tick", Duration::from_millis(10)).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(locker.try_acquire("tick", Duration::from_secs(30)).await);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let locker = InMemoryLocker::new();
        assert!(locker.try_acquire("a", Duration::from_secs(30)).await);
        assert!(locker.try_acquire("b", Duration::from_secs(30)).await);
    }
}
