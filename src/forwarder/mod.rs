//! Fan-out of one inbound message to the configured destination list.
//!
//! Destinations are delivered to strictly sequentially: the pacing delay
//! between sends is part of the rate-limit contract, so there is nothing to
//! gain from parallelism. Concurrent inbound messages run in independent
//! dispatcher tasks, each over its own config snapshot.

pub mod sink;

pub use sink::{MessageSink, SinkError};

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::config::Destination;

/// Margin added on top of the server-provided retry hint.
const THROTTLE_MARGIN: Duration = Duration::from_secs(1);

/// The message being fanned out, reduced to what delivery needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMessage {
    pub chat_id: i64,
    pub message_id: i32,
}

/// Forwards messages to a list of destinations with rate limiting.
#[derive(Debug, Clone)]
pub struct Forwarder {
    excluded: HashSet<i64>,
}

impl Forwarder {
    /// `excluded` is a static always-skip list, independent of the config
    /// store.
    #[must_use]
    pub fn new(excluded: impl IntoIterator<Item = i64>) -> Self {
        Self {
            excluded: excluded.into_iter().collect(),
        }
    }

    /// Deliver a copy of `message` to each destination in snapshot order.
    ///
    /// Fire-and-forget: per-destination failures are logged and absorbed,
    /// never surfaced to the caller. After every successful send the engine
    /// sleeps for `delay` before moving on, including after the last
    /// destination, matching the observable pacing of the original service.
    pub async fn forward<S>(
        &self,
        sink: &S,
        message: &SourceMessage,
        targets: &[Destination],
        delay: Duration,
    ) where
        S: MessageSink + ?Sized,
    {
        for target in targets {
            // Origin and exclusion checks happen before any network attempt.
            if target.chat_id == message.chat_id || self.excluded.contains(&target.chat_id) {
                debug!(
                    "Skipping target chat {}: message origin or statically excluded.",
                    target.chat_id
                );
                continue;
            }
            let sent = self.deliver(sink, message, target).await;
            if sent && !delay.is_zero() {
                sleep(delay).await;
            }
        }
    }

    /// Attempt delivery to one destination, retrying for as long as the
    /// remote keeps throttling. Returns `true` once the copy was accepted.
    async fn deliver<S>(&self, sink: &S, message: &SourceMessage, target: &Destination) -> bool
    where
        S: MessageSink + ?Sized,
    {
        loop {
            let attempt = sink
                .copy_message(
                    target.chat_id,
                    message.chat_id,
                    message.message_id,
                    target.thread_id,
                )
                .await;
            match attempt {
                Ok(()) => {
                    debug!(
                        "Forwarded message {} from {} to {}.",
                        message.message_id, message.chat_id, target.chat_id
                    );
                    return true;
                }
                Err(SinkError::Throttled { retry_after }) => {
                    let wait = retry_after + THROTTLE_MARGIN;
                    warn!(
                        "Rate limited while forwarding to {}. Sleeping for {}s.",
                        target.chat_id,
                        wait.as_secs()
                    );
                    sleep(wait).await;
                }
                Err(SinkError::Forbidden) => {
                    error!(
                        "Lost access to target chat {}. Consider removing it from configuration.",
                        target.chat_id
                    );
                    return false;
                }
                Err(SinkError::Other(err)) => {
                    error!(
                        "Failed to forward message {} to {}: {err:#}",
                        message.message_id, target.chat_id
                    );
                    return false;
                }
            }
        }
    }
}
