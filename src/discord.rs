//! Serenity and Songbird implementations of the chat and voice traits.

use crate::chat::{ChatOutput, ConversationTurn, Embed, Sender};
use crate::sanitizer::{parse_user_reference, TokenResolution, UserResolver};
use crate::voice::{VoiceConnection, VoiceConnector};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::debug;
use serenity::async_trait;
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::id::{ChannelId, GuildId, UserId};
use serenity::prelude::Context;
use songbird::tracks::{PlayMode, TrackHandle};
use songbird::{Call, Songbird};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct SerenityChat {
    http: Arc<Http>,
}

impl SerenityChat {
    pub fn new(http: Arc<Http>) -> Self {
        SerenityChat { http }
    }
}

#[async_trait]
impl ChatOutput for SerenityChat {
    async fn broadcast_typing(&self, channel: ChannelId) -> Result<()> {
        channel.broadcast_typing(&self.http).await?;
        Ok(())
    }

    async fn send_text(&self, channel: ChannelId, text: &str) -> Result<()> {
        channel.say(&self.http, text).await?;
        Ok(())
    }

    async fn send_embed(&self, channel: ChannelId, embed: &Embed) -> Result<()> {
        channel
            .send_message(&self.http, |m| {
                m.embed(|e| e.title(&embed.title).description(&embed.description))
            })
            .await?;
        Ok(())
    }
}

/// Resolves user references to display names within one guild.
pub struct GuildMemberResolver {
    ctx: Context,
    guild_id: GuildId,
}

impl GuildMemberResolver {
    pub fn new(ctx: Context, guild_id: GuildId) -> Self {
        GuildMemberResolver { ctx, guild_id }
    }
}

#[async_trait]
impl UserResolver for GuildMemberResolver {
    async fn resolve(&self, token: &str) -> Result<TokenResolution> {
        let Some(user_id) = parse_user_reference(token) else {
            return Ok(TokenResolution::Unresolved);
        };

        let member = self.guild_id.member(&self.ctx, UserId(user_id)).await?;
        Ok(TokenResolution::Resolved(member.display_name().into_owned()))
    }
}

/// One guild's songbird call plus the track it last started.
pub struct SongbirdConnection {
    call: Arc<Mutex<Call>>,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdConnection {
    fn new(call: Arc<Mutex<Call>>) -> Self {
        SongbirdConnection {
            call,
            current: Mutex::new(None),
        }
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn is_playing(&self) -> bool {
        let current = self.current.lock().await.clone();
        match current {
            Some(track) => matches!(track.get_info().await, Ok(state) if state.playing == PlayMode::Play),
            None => false,
        }
    }

    async fn play_file(&self, path: &Path) -> Result<()> {
        let source = songbird::ffmpeg(path)
            .await
            .map_err(|e| anyhow!("Could not open {} for playback: {:?}", path.display(), e))?;
        let track = self.call.lock().await.play_source(source);
        *self.current.lock().await = Some(track);
        Ok(())
    }
}

pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    connections: DashMap<GuildId, Arc<SongbirdConnection>>,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>) -> Self {
        SongbirdConnector {
            manager,
            connections: DashMap::new(),
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn existing(&self, guild: GuildId) -> Option<Arc<dyn VoiceConnection>> {
        let Some(call) = self.manager.get(guild) else {
            self.connections.remove(&guild);
            return None;
        };
        if call.lock().await.current_channel().is_none() {
            return None;
        }

        let connection = self
            .connections
            .entry(guild)
            .or_insert_with(|| Arc::new(SongbirdConnection::new(call)))
            .clone();
        Some(connection)
    }

    async fn join(&self, guild: GuildId, channel: ChannelId) -> Result<Arc<dyn VoiceConnection>> {
        let (call, joined) = self.manager.join(guild, channel).await;
        joined.map_err(|e| anyhow!("{}", e))?;
        debug!("Joined voice channel {} in guild {}", channel, guild);

        let connection = Arc::new(SongbirdConnection::new(call));
        self.connections.insert(guild, Arc::clone(&connection));
        Ok(connection)
    }
}

/// Builds the responder's view of a gateway message.
pub fn conversation_turn(ctx: &Context, msg: &Message) -> ConversationTurn {
    let guild = msg.guild_id.and_then(|id| ctx.cache.guild(id));
    let member = msg.member.as_ref();

    let display_name = member
        .and_then(|m| m.nick.clone())
        .unwrap_or_else(|| msg.author.name.clone());

    ConversationTurn {
        sender: Sender {
            id: msg.author.id,
            display_name,
            is_bot: msg.author.bot,
            is_member: msg.guild_id.is_some() && member.is_some() && msg.webhook_id.is_none(),
            is_guild_owner: guild.as_ref().map(|g| g.owner_id == msg.author.id).unwrap_or(false),
            role_ids: member
                .map(|m| m.roles.iter().map(|role| role.0).collect())
                .unwrap_or_default(),
        },
        text: msg.content.clone(),
        channel_id: msg.channel_id,
        guild_id: msg.guild_id,
        mentions: msg.mentions.iter().map(|user| user.id).collect(),
        timestamp: DateTime::<Utc>::from_timestamp(msg.timestamp.unix_timestamp(), 0).unwrap_or_else(Utc::now),
    }
}

/// The voice channel `user` is sitting in, according to the cache.
pub fn voice_channel_of(ctx: &Context, guild_id: GuildId, user: UserId) -> Option<ChannelId> {
    ctx.cache
        .guild(guild_id)
        .and_then(|guild| guild.voice_states.get(&user).and_then(|state| state.channel_id))
}
