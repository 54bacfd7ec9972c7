//! Delivery boundary between the forwarding engine and the Telegram API.
//!
//! The engine only ever talks to a [`MessageSink`]; the production sink is
//! [`teloxide::Bot`], whose request errors are folded into the three outcomes
//! the engine distinguishes: throttled, forbidden, everything else.

use std::time::Duration;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId, ThreadId};
use teloxide::{ApiError, RequestError};
use thiserror::Error;

/// A single delivery failure as seen by the forwarding engine.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Remote backpressure: the API asks us to wait before sending again.
    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    Throttled { retry_after: Duration },
    /// The bot can no longer post to the chat (blocked, kicked, rights revoked).
    #[error("bot has no access to the chat")]
    Forbidden,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Capability to deliver a copy of a message to a chat.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Copy `message_id` from `source_chat_id` into `dest_chat_id`,
    /// addressed to `thread_id` when the destination is a forum topic.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] classifying the delivery failure.
    async fn copy_message(
        &self,
        dest_chat_id: i64,
        source_chat_id: i64,
        message_id: i32,
        thread_id: Option<i32>,
    ) -> Result<(), SinkError>;
}

#[async_trait]
impl MessageSink for Bot {
    async fn copy_message(
        &self,
        dest_chat_id: i64,
        source_chat_id: i64,
        message_id: i32,
        thread_id: Option<i32>,
    ) -> Result<(), SinkError> {
        let mut req = Requester::copy_message(
            self,
            ChatId(dest_chat_id),
            ChatId(source_chat_id),
            MessageId(message_id),
        );
        if let Some(thread) = thread_id {
            req = req.message_thread_id(ThreadId(MessageId(thread)));
        }
        req.await?;
        Ok(())
    }
}

impl From<RequestError> for SinkError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::RetryAfter(seconds) => Self::Throttled {
                retry_after: seconds.duration(),
            },
            RequestError::Api(api) if is_access_revoked(&api) => Self::Forbidden,
            other => Self::Other(anyhow::Error::new(other)),
        }
    }
}

fn is_access_revoked(err: &ApiError) -> bool {
    matches!(
        err,
        ApiError::BotBlocked
            | ApiError::BotKicked
            | ApiError::BotKickedFromSupergroup
            | ApiError::BotKickedFromChannel
            | ApiError::NotEnoughRightsToPostMessages
    )
}
