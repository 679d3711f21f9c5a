//! Recently seen delivery ids, for duplicate suppression

use crate::state_machine::ClientId;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

/// Bounded per-client window of claimed delivery ids.
///
/// Entries leave the window when older than `window` or when a client has
/// claimed more than `capacity` newer ids.
pub struct DeliveryLog {
    window: Duration,
    capacity: usize,
    seen: Mutex<HashMap<ClientId, VecDeque<(String, DateTime<Utc>)>>>,
}

impl DeliveryLog {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity: capacity.max(1),
            seen: Mutex::new(HashMap::new()),
        }
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Claim `delivery_id` for `client`. Returns false if it is already claimed.
    pub fn claim(&self, client: &ClientId, delivery_id: &str, now: DateTime<Utc>) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = seen.entry(client.clone()).or_default();

        let cutoff = self.cutoff(now);
        while entries.front().is_some_and(|(_, at)| *at < cutoff) {
            entries.pop_front();
        }
        if entries.iter().any(|(id, _)| id == delivery_id) {
            return false;
        }

        entries.push_back((delivery_id.to_string(), now));
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        true
    }

    /// Forget a claim so a redelivery of the same id is processed
    pub fn release(&self, client: &ClientId, delivery_id: &str) {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entries) = seen.get_mut(client) {
            entries.retain(|(id, _)| id != delivery_id);
            if entries.is_empty() {
                seen.remove(client);
            }
        }
    }

    /// Drop entries older than the window; returns how many were removed
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = self.cutoff(now);
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        seen.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|(_, at)| *at >= cutoff);
            removed += before - entries.len();
            !entries.is_empty()
        });
        removed
    }
}
