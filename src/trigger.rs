//! # Feature: Mention Responder
//!
//! Replies when someone mentions the bot in a guild channel. The reply comes
//! from the default engine, preceded by a typing indicator and a short random
//! pause, and is addressed to the sender.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.3.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Eligibility checks, sanitized replies, paced delivery, visible apology on engine failure

use crate::chat::{ChatOutput, ConversationTurn};
use crate::engine::EngineHandle;
use crate::moderation::ModerationPolicy;
use crate::sanitizer::{sanitize, UserResolver};
use anyhow::Result;
use chrono::Utc;
use log::{debug, error, warn};
use rand::Rng;
use serenity::model::id::UserId;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Why a message got no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    PrivateChannel,
    BotSender,
    NotAMember,
    Exempt,
    NotMentioned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Ignored(IgnoreReason),
    Replied(String),
    Apologized,
}

/// Pause before a reply is sent, in whole seconds picked uniformly from `min..=max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingDelay {
    min_secs: u64,
    max_secs: u64,
}

impl TypingDelay {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        TypingDelay {
            min_secs: min_secs.min(max_secs),
            max_secs: max_secs.max(min_secs),
        }
    }

    pub fn pick(&self) -> Duration {
        let secs = rand::rng().random_range(self.min_secs..=self.max_secs);
        Duration::from_secs(secs)
    }
}

impl Default for TypingDelay {
    fn default() -> Self {
        TypingDelay::new(1, 3)
    }
}

pub struct TriggerController {
    bot_id: UserId,
    engine: EngineHandle,
    moderation: Arc<dyn ModerationPolicy>,
    delay: TypingDelay,
}

impl TriggerController {
    pub fn new(
        bot_id: UserId,
        engine: EngineHandle,
        moderation: Arc<dyn ModerationPolicy>,
        delay: TypingDelay,
    ) -> Self {
        TriggerController {
            bot_id,
            engine,
            moderation,
            delay,
        }
    }

    pub fn bot_id(&self) -> UserId {
        self.bot_id
    }

    pub fn ignore_reason(&self, turn: &ConversationTurn) -> Option<IgnoreReason> {
        if turn.is_private() {
            return Some(IgnoreReason::PrivateChannel);
        }
        if turn.sender.is_bot || turn.sender.id == self.bot_id {
            return Some(IgnoreReason::BotSender);
        }
        if !turn.sender.is_member {
            return Some(IgnoreReason::NotAMember);
        }
        if self.moderation.is_exempt(turn) {
            return Some(IgnoreReason::Exempt);
        }
        if !turn.mentions_user(self.bot_id) {
            return Some(IgnoreReason::NotMentioned);
        }
        None
    }

    /// Entry point for every observed message.
    pub async fn handle_message(
        &self,
        turn: &ConversationTurn,
        resolver: &dyn UserResolver,
        chat: &dyn ChatOutput,
    ) -> Result<TurnOutcome> {
        if let Some(reason) = self.ignore_reason(turn) {
            debug!("Ignoring message {} in {}: {:?}", turn.sender.id, turn.channel_id, reason);
            return Ok(TurnOutcome::Ignored(reason));
        }

        self.respond(turn, resolver, chat).await
    }

    /// Sanitizes, asks the engine, shows typing, waits, then replies to the
    /// sender. Skips the eligibility checks; the `speak` command comes in here.
    pub async fn respond(
        &self,
        turn: &ConversationTurn,
        resolver: &dyn UserResolver,
        chat: &dyn ChatOutput,
    ) -> Result<TurnOutcome> {
        let text = turn.text_without_mention(self.bot_id);
        let cleaned = sanitize(&text, resolver).await;

        let reply = match self.engine.respond(&cleaned).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("❌ {} failed to answer {:?}: {:#}", self.engine.kind(), cleaned, e);
                chat.send_text(
                    turn.channel_id,
                    &format!("Sorry {}, I couldn't come up with a reply just now.", turn.sender.mention()),
                )
                .await?;
                return Ok(TurnOutcome::Apologized);
            }
        };

        if let Err(e) = chat.broadcast_typing(turn.channel_id).await {
            warn!("Could not show typing in {}: {}", turn.channel_id, e);
        }
        sleep(self.delay.pick()).await;

        chat.send_text(turn.channel_id, &format!("{} {}", turn.sender.mention(), reply))
            .await?;
        debug!(
            "Replied to {} in {} after {} ms",
            turn.sender.id,
            turn.channel_id,
            turn.age(Utc::now()).num_milliseconds()
        );
        Ok(TurnOutcome::Replied(reply))
    }
}
