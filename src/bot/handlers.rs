//! Telegram update handlers: the admin command surface and the forwarding
//! endpoints for channel posts and group messages.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{Me, Message};
use teloxide::utils::command::BotCommands;
use tracing::error;

use crate::config::{ConfigError, ConfigStore};
use crate::forwarder::{Forwarder, SourceMessage};

/// Commands accepted from chats. Both are admin-gated.
#[derive(BotCommands, Clone, Copy, Debug)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    /// Register the issuing chat (and thread, if any) as a destination.
    Activate,
    /// Remove the issuing chat (and thread, if any) from the destinations.
    Deactivate,
}

/// Result of an activation request, decided before any reply is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivateOutcome {
    Registered,
    AlreadyRegistered,
    Denied,
}

/// Result of a deactivation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivateOutcome {
    Removed,
    NotRegistered,
    Denied,
}

/// Decide an activation request. Senders without a username are denied, as
/// are usernames not in the admin list (matched case-insensitively).
///
/// # Errors
///
/// Returns [`ConfigError`] when the registration cannot be persisted.
pub async fn activate(
    store: &ConfigStore,
    username: Option<&str>,
    chat_id: i64,
    thread_id: Option<i32>,
    title: &str,
) -> Result<ActivateOutcome, ConfigError> {
    match username {
        Some(name) if store.is_admin(name).await => {}
        _ => return Ok(ActivateOutcome::Denied),
    }
    if store.add_destination(chat_id, thread_id, title).await? {
        Ok(ActivateOutcome::Registered)
    } else {
        Ok(ActivateOutcome::AlreadyRegistered)
    }
}

/// Decide a deactivation request, gated like [`activate`].
///
/// # Errors
///
/// Returns [`ConfigError`] when the removal cannot be persisted.
pub async fn deactivate(
    store: &ConfigStore,
    username: Option<&str>,
    chat_id: i64,
    thread_id: Option<i32>,
) -> Result<DeactivateOutcome, ConfigError> {
    match username {
        Some(name) if store.is_admin(name).await => {}
        _ => return Ok(DeactivateOutcome::Denied),
    }
    if store.remove_destination(chat_id, thread_id).await? {
        Ok(DeactivateOutcome::Removed)
    } else {
        Ok(DeactivateOutcome::NotRegistered)
    }
}

/// Build the dispatcher schema.
///
/// Command branches come first so an `/activate` posted inside a source chat
/// is treated as a command, not forwarded. Channel posts carry no sender, so
/// commands arriving that way are parsed from the post text and end up denied
/// by the username gate, mirroring the admin rule.
#[must_use]
pub fn schema() -> teloxide::dispatching::UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(
            Update::filter_channel_post()
                .filter_map(|msg: Message, me: Me| {
                    msg.text()
                        .and_then(|text| parse_post_command(text, me.username()))
                })
                .endpoint(handle_command),
        )
        .branch(
            Update::filter_channel_post()
                .filter_async(is_source_chat)
                .endpoint(handle_forward),
        )
        .branch(
            Update::filter_message()
                .filter(|msg: Message| msg.chat.is_group() || msg.chat.is_supergroup())
                .filter_async(is_source_chat)
                .endpoint(handle_forward),
        )
}

/// Parse a command out of a channel post. Posts commonly address the bot
/// with a mention (`/activate@MyBot`), so parsing needs the bot's username.
fn parse_post_command(text: &str, bot_username: &str) -> Option<Command> {
    Command::parse(text, bot_username).ok()
}

async fn is_source_chat(msg: Message, store: Arc<ConfigStore>) -> bool {
    store.is_source(msg.chat.id.0).await
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    store: Arc<ConfigStore>,
) -> Result<(), teloxide::RequestError> {
    let username = msg.from.as_ref().and_then(|user| user.username.as_deref());
    let chat_id = msg.chat.id.0;
    let thread_id = msg.thread_id.map(|thread| thread.0 .0);

    let reply = match cmd {
        Command::Activate => {
            let title = msg.chat.title().unwrap_or_default();
            match activate(&store, username, chat_id, thread_id, title).await {
                Ok(ActivateOutcome::Registered) => "Channel registered for forwarding.",
                Ok(ActivateOutcome::AlreadyRegistered) => "Channel already registered.",
                Ok(ActivateOutcome::Denied) => {
                    "You do not have permission to activate forwarding in this chat."
                }
                Err(err) => {
                    error!("Failed to register chat {}: {}", chat_id, err);
                    "Failed to update configuration. Check the bot logs."
                }
            }
        }
        Command::Deactivate => match deactivate(&store, username, chat_id, thread_id).await {
            Ok(DeactivateOutcome::Removed) => "Channel removed from forwarding.",
            Ok(DeactivateOutcome::NotRegistered) => "Channel is not registered for forwarding.",
            Ok(DeactivateOutcome::Denied) => {
                "You do not have permission to deactivate forwarding in this chat."
            }
            Err(err) => {
                error!("Failed to deregister chat {}: {}", chat_id, err);
                "Failed to update configuration. Check the bot logs."
            }
        },
    };

    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_forward(
    bot: Bot,
    msg: Message,
    store: Arc<ConfigStore>,
    forwarder: Arc<Forwarder>,
) -> Result<(), teloxide::RequestError> {
    // Snapshot once at dispatch; admin mutations made while this fan-out is
    // in flight do not affect it.
    let snapshot = store.snapshot().await;
    let source = SourceMessage {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
    };
    forwarder
        .forward(&bot, &source, &snapshot.target_chats, snapshot.delay())
        .await;
    respond(())
}
