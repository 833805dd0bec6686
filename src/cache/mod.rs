//! Cart cache.
//!
//! Carts are working state, not records: they live in a time-bounded
//! cache keyed by user id, never in the database. The cache contract is
//! what the checkout engine depends on:
//!
//! - entries expire `ttl` after their last mutation, enforced lazily on
//!   read (an expired entry is treated as absent);
//! - every mutation runs under the key's shard lock, so a quantity
//!   increment from one request is never lost to a concurrent one;
//! - a sweep may run opportunistically for memory hygiene but is not
//!   required for correctness.
//!
//! Swapping this for a distributed backend means reimplementing the same
//! contract behind the same methods; business logic never touches the
//! map directly.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::cart::Cart;

#[derive(Debug)]
struct CacheEntry {
    cart: Cart,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// TTL cache of carts keyed by user id.
#[derive(Debug)]
pub struct CartCache {
    entries: DashMap<Uuid, CacheEntry>,
    ttl: Duration,
}

impl CartCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Returns the user's cart, or `None` if absent or expired.
    pub fn get(&self, user_id: Uuid) -> Option<Cart> {
        let now = Utc::now();
        let expired = match self.entries.get(&user_id) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.cart.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(&user_id);
        }
        None
    }

    /// Atomically mutates the user's cart, creating a fresh one if the
    /// user has none (or only an expired one). The closure runs under
    /// the key's lock; on error the entry keeps its pre-closure state.
    pub fn upsert_with<T>(
        &self,
        user_id: Uuid,
        f: impl FnOnce(&mut Cart) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let now = Utc::now();
        let mut entry = self.entries.entry(user_id).or_insert_with(|| CacheEntry {
            cart: Cart::new(user_id),
            expires_at: now + self.ttl,
        });
        if entry.is_expired(now) {
            entry.cart = Cart::new(user_id);
        }

        let mut candidate = entry.cart.clone();
        let out = f(&mut candidate)?;
        entry.cart = candidate;
        entry.expires_at = now + self.ttl;
        Ok(out)
    }

    /// Atomically mutates an existing cart; `NotFound` if the user has
    /// no live cart.
    pub fn update_with<T>(
        &self,
        user_id: Uuid,
        f: impl FnOnce(&mut Cart) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let now = Utc::now();
        let mut entry = self
            .entries
            .get_mut(&user_id)
            .filter(|e| !e.is_expired(now))
            .ok_or_else(|| ServiceError::NotFound(format!("Cart for user {} not found", user_id)))?;

        let mut candidate = entry.cart.clone();
        let out = f(&mut candidate)?;
        entry.cart = candidate;
        entry.expires_at = now + self.ttl;
        Ok(out)
    }

    /// Drops the user's cart (checkout success or explicit clear).
    pub fn remove(&self, user_id: Uuid) {
        self.entries.remove(&user_id);
    }

    /// Evicts every expired entry. Correctness does not depend on this
    /// running; it only bounds memory between reads.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
