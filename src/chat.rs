//! Chat-side types shared by the trigger controller and the command surface:
//! the inbound turn and the outbound message sink.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId, UserId};

#[derive(Debug, Clone)]
pub struct Sender {
    pub id: UserId,
    pub display_name: String,
    pub is_bot: bool,
    /// Present in the guild's member list (false for webhooks and DMs).
    pub is_member: bool,
    pub is_guild_owner: bool,
    pub role_ids: Vec<u64>,
}

impl Sender {
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id.0)
    }
}

/// One inbound message, as seen by the responder.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub sender: Sender,
    pub text: String,
    pub channel_id: ChannelId,
    /// `None` for private channels.
    pub guild_id: Option<GuildId>,
    /// Users the platform reports as mentioned.
    pub mentions: Vec<UserId>,
    /// When the platform received the message.
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn is_private(&self) -> bool {
        self.guild_id.is_none()
    }

    pub fn mentions_user(&self, user: UserId) -> bool {
        self.mentions.contains(&user) || mention_forms(user).iter().any(|form| self.text.contains(form.as_str()))
    }

    /// The text with every mention of `user` removed.
    pub fn text_without_mention(&self, user: UserId) -> String {
        let mut text = self.text.clone();
        for form in mention_forms(user) {
            text = text.replace(&form, " ");
        }
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Time between the message arriving and `now`, never negative.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.timestamp).max(chrono::Duration::zero())
    }

    /// Same turn, different text. Used when a command supplies the words.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        ConversationTurn {
            text: text.into(),
            ..self.clone()
        }
    }
}

fn mention_forms(user: UserId) -> [String; 2] {
    [format!("<@{}>", user.0), format!("<@!{}>", user.0)]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub title: String,
    pub description: String,
}

/// Where replies go.
#[async_trait]
pub trait ChatOutput: Send + Sync {
    async fn broadcast_typing(&self, channel: ChannelId) -> Result<()>;

    async fn send_text(&self, channel: ChannelId, text: &str) -> Result<()>;

    async fn send_embed(&self, channel: ChannelId, embed: &Embed) -> Result<()>;
}
