//! # Watchdog
//!
//! Per-correlation-id rendezvous between the caller waiting for a response
//! and the response side delivering it. One writer completes it, one reader
//! waits on it; the waiter is woken by a single notification rather than by
//! polling.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{CommandError, CommandResult};
use crate::messaging::CommandMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogState {
    InProgress,
    Completed,
    /// The waiter's deadline elapsed before a result arrived
    Expired,
    /// Abandoned without a result, e.g. on exchange shutdown
    Interrupted,
}

impl WatchdogState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for WatchdogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Expired => write!(f, "expired"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

#[derive(Debug)]
struct Slot {
    state: WatchdogState,
    result: Option<CommandMessage>,
    reason: Option<String>,
}

#[derive(Debug)]
pub struct Watchdog {
    correlation_id: String,
    admitted_at: Instant,
    slot: Mutex<Slot>,
    wake: Notify,
}

impl Watchdog {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            admitted_at: Instant::now(),
            slot: Mutex::new(Slot {
                state: WatchdogState::InProgress,
                result: None,
                reason: None,
            }),
            wake: Notify::new(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn state(&self) -> WatchdogState {
        self.slot.lock().state
    }

    /// Time since admission
    pub fn age(&self) -> Duration {
        self.admitted_at.elapsed()
    }

    /// Store the result and wake the waiter; false if already settled
    pub fn complete(&self, message: CommandMessage) -> bool {
        {
            let mut slot = self.slot.lock();
            if slot.state.is_settled() {
                return false;
            }
            slot.result = Some(message);
            slot.state = WatchdogState::Completed;
        }
        self.wake.notify_one();
        true
    }

    /// Abandon the wait; false if already settled
    pub fn interrupt(&self, reason: impl Into<String>) -> bool {
        {
            let mut slot = self.slot.lock();
            if slot.state.is_settled() {
                return false;
            }
            slot.state = WatchdogState::Interrupted;
            slot.reason = Some(reason.into());
        }
        self.wake.notify_one();
        true
    }

    fn expire(&self) -> bool {
        let mut slot = self.slot.lock();
        if slot.state.is_settled() {
            return false;
        }
        slot.state = WatchdogState::Expired;
        true
    }

    /// Wait until the watchdog settles, or until `timeout` elapses
    ///
    /// A result can be taken once; later calls see an interruption.
    pub async fn wait(&self, timeout: Option<Duration>) -> CommandResult<CommandMessage> {
        let deadline = timeout.map(|timeout| tokio::time::Instant::now() + timeout);

        loop {
            if let Some(outcome) = self.take_settled() {
                return outcome;
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, self.wake.notified())
                        .await
                        .is_err()
                    {
                        if self.expire() {
                            let waited_ms = self.age().as_millis() as u64;
                            debug!(
                                correlation_id = %self.correlation_id,
                                waited_ms = waited_ms,
                                "Watchdog expired"
                            );
                            return Err(CommandError::expired(&self.correlation_id, waited_ms));
                        }
                    }
                }
                None => self.wake.notified().await,
            }
        }
    }

    fn take_settled(&self) -> Option<CommandResult<CommandMessage>> {
        let mut slot = self.slot.lock();
        match slot.state {
            WatchdogState::InProgress => None,
            WatchdogState::Completed => Some(slot.result.take().ok_or_else(|| {
                CommandError::interrupted(format!(
                    "result for {} was already taken",
                    self.correlation_id
                ))
            })),
            WatchdogState::Expired => Some(Err(CommandError::expired(
                &self.correlation_id,
                self.admitted_at.elapsed().as_millis() as u64,
            ))),
            WatchdogState::Interrupted => Some(Err(CommandError::interrupted(
                slot.reason
                    .clone()
                    .unwrap_or_else(|| format!("wait for {} interrupted", self.correlation_id)),
            ))),
        }
    }
}
