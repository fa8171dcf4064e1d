//! # Exchange Registry
//!
//! Concurrent map from correlation id to [`Watchdog`]. Owned by one exchange
//! executor and shared with its handlers; at most one watchdog exists per
//! in-flight correlation id.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::watchdog::{Watchdog, WatchdogState};
use crate::error::{CommandError, CommandResult};
use crate::messaging::CommandMessage;

#[derive(Debug, Default)]
pub struct ExchangeRegistry {
    watchdogs: DashMap<String, Arc<Watchdog>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a watchdog for `correlation_id` unless one already exists
    ///
    /// Returns false for a duplicate submission.
    pub fn admit(&self, correlation_id: &str) -> bool {
        match self.watchdogs.entry(correlation_id.to_string()) {
            Entry::Occupied(_) => {
                debug!(
                    correlation_id = %correlation_id,
                    "Admission rejected, correlation in progress"
                );
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Watchdog::new(correlation_id)));
                debug!(correlation_id = %correlation_id, "Correlation admitted");
                true
            }
        }
    }

    /// Deliver a response to the waiting caller; false if nobody is waiting
    pub fn complete(&self, correlation_id: &str, message: CommandMessage) -> bool {
        let Some(watchdog) = self.get(correlation_id) else {
            warn!(correlation_id = %correlation_id, "No watchdog for response, dropping it");
            return false;
        };

        let completed = watchdog.complete(message);
        if !completed {
            warn!(
                correlation_id = %correlation_id,
                state = %watchdog.state(),
                "Watchdog already settled, dropping response"
            );
        }
        completed
    }

    /// Wait for the response to `correlation_id`, then release its slot
    ///
    /// The slot is released whether the wait completes, expires, is
    /// interrupted, or the waiting future is dropped.
    pub async fn await_completion(
        &self,
        correlation_id: &str,
        timeout: Option<Duration>,
    ) -> CommandResult<CommandMessage> {
        let watchdog = self
            .get(correlation_id)
            .ok_or_else(|| CommandError::not_found("correlation", correlation_id))?;

        let _release = ReleaseGuard {
            registry: self,
            watchdog: Arc::clone(&watchdog),
        };

        watchdog.wait(timeout).await
    }

    pub fn get(&self, correlation_id: &str) -> Option<Arc<Watchdog>> {
        self.watchdogs
            .get(correlation_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, correlation_id: &str) -> bool {
        self.watchdogs.contains_key(correlation_id)
    }

    /// Drop the watchdog for `correlation_id`, e.g. after a failed hand-off
    pub fn remove(&self, correlation_id: &str) -> bool {
        self.watchdogs.remove(correlation_id).is_some()
    }

    /// Interrupt every pending watchdog; returns how many were interrupted
    pub fn interrupt_all(&self, reason: &str) -> usize {
        let interrupted = self
            .watchdogs
            .iter()
            .filter(|entry| entry.value().interrupt(reason))
            .count();

        if interrupted > 0 {
            info!(interrupted = interrupted, reason = %reason, "Interrupted pending correlations");
        }
        interrupted
    }

    /// Number of in-flight correlations
    pub fn len(&self) -> usize {
        self.watchdogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchdogs.is_empty()
    }

    pub fn correlation_ids(&self) -> Vec<String> {
        self.watchdogs.iter().map(|entry| entry.key().clone()).collect()
    }
}

/// Removes the watchdog it guards, and only that one
struct ReleaseGuard<'a> {
    registry: &'a ExchangeRegistry,
    watchdog: Arc<Watchdog>,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        if self.watchdog.state() == WatchdogState::InProgress {
            self.watchdog.interrupt("waiter cancelled");
            debug!(correlation_id = %self.watchdog.correlation_id(), "Waiter cancelled");
        }
        self.registry
            .watchdogs
            .remove_if(self.watchdog.correlation_id(), |_, current| {
                Arc::ptr_eq(current, &self.watchdog)
            });
    }
}
