//! Test doubles shared by the unit tests.

use crate::chat::{ChatOutput, ConversationTurn, Embed, Sender};
use crate::engine::{EngineKind, ResponseEngine};
use crate::voice::{Synthesizer, VoiceConnection, VoiceConnector};
use anyhow::{bail, Result};
use chrono::Utc;
use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const BOT_ID: u64 = 999_999_999_999_999_999;

/// A guild message from an ordinary member.
pub fn turn(text: &str) -> ConversationTurn {
    ConversationTurn {
        sender: Sender {
            id: UserId(7),
            display_name: "Kermit".to_string(),
            is_bot: false,
            is_member: true,
            is_guild_owner: false,
            role_ids: Vec::new(),
        },
        text: text.to_string(),
        channel_id: ChannelId(10),
        guild_id: Some(GuildId(1)),
        mentions: Vec::new(),
        timestamp: Utc::now(),
    }
}

/// Always gives the same reply and remembers what it was asked.
pub struct Canned {
    reply: String,
    heard: Arc<StdMutex<Vec<String>>>,
}

impl Canned {
    pub fn new(reply: &str) -> Self {
        Canned {
            reply: reply.to_string(),
            heard: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    pub fn heard(&self) -> Arc<StdMutex<Vec<String>>> {
        Arc::clone(&self.heard)
    }
}

#[async_trait]
impl ResponseEngine for Canned {
    fn kind(&self) -> EngineKind {
        EngineKind::Alice
    }

    fn respond(&mut self, input: &str) -> Result<String> {
        self.heard.lock().unwrap().push(input.to_string());
        Ok(self.reply.clone())
    }
}

pub struct Failing;

#[async_trait]
impl ResponseEngine for Failing {
    fn kind(&self) -> EngineKind {
        EngineKind::Alice
    }

    fn respond(&mut self, _input: &str) -> Result<String> {
        bail!("engine exploded")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text(ChannelId, String),
    Embed(ChannelId, Embed),
}

#[derive(Default)]
pub struct RecordingChat {
    sent: Mutex<Vec<Sent>>,
    typing: AtomicUsize,
}

impl RecordingChat {
    pub async fn sent(&self) -> Vec<Sent> {
        self.sent.lock().await.clone()
    }

    pub async fn typing_count(&self) -> usize {
        self.typing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatOutput for RecordingChat {
    async fn broadcast_typing(&self, _channel: ChannelId) -> Result<()> {
        self.typing.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_text(&self, channel: ChannelId, text: &str) -> Result<()> {
        self.sent.lock().await.push(Sent::Text(channel, text.to_string()));
        Ok(())
    }

    async fn send_embed(&self, channel: ChannelId, embed: &Embed) -> Result<()> {
        self.sent.lock().await.push(Sent::Embed(channel, embed.clone()));
        Ok(())
    }
}

/// A voice connection whose clips last a fixed time on the tokio clock.
pub struct FakeConnection {
    channel: ChannelId,
    clip: Duration,
    playing_until: StdMutex<Option<Instant>>,
    plays: AtomicUsize,
    overlaps: AtomicUsize,
}

impl FakeConnection {
    fn new(channel: ChannelId, clip: Duration) -> Self {
        FakeConnection {
            channel,
            clip,
            playing_until: StdMutex::new(None),
            plays: AtomicUsize::new(0),
            overlaps: AtomicUsize::new(0),
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn play_count(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    /// Clips started while another was still playing.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    /// Simulates audio something else started.
    pub fn start_playing(&self, length: Duration) {
        *self.playing_until.lock().unwrap() = Some(Instant::now() + length);
    }

    fn busy(&self) -> bool {
        matches!(*self.playing_until.lock().unwrap(), Some(until) if Instant::now() < until)
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    async fn is_playing(&self) -> bool {
        self.busy()
    }

    async fn play_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            bail!("no audio at {}", path.display());
        }
        if self.busy() {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.start_playing(self.clip);
        Ok(())
    }
}

pub struct FakeConnector {
    clip: Duration,
    refuse_joins: bool,
    joins: StdMutex<Vec<(GuildId, ChannelId)>>,
    connection: StdMutex<Option<Arc<FakeConnection>>>,
}

impl FakeConnector {
    pub fn new(clip: Duration) -> Self {
        FakeConnector {
            clip,
            refuse_joins: false,
            joins: StdMutex::new(Vec::new()),
            connection: StdMutex::new(None),
        }
    }

    pub fn refusing_joins(mut self) -> Self {
        self.refuse_joins = true;
        self
    }

    pub fn joins(&self) -> Vec<(GuildId, ChannelId)> {
        self.joins.lock().unwrap().clone()
    }

    pub fn connection(&self) -> Option<Arc<FakeConnection>> {
        self.connection.lock().unwrap().clone()
    }

    /// Sets up a connection as if the bot were already in `channel`.
    pub fn connect(&self, _guild: GuildId, channel: ChannelId) -> Arc<FakeConnection> {
        let connection = Arc::new(FakeConnection::new(channel, self.clip));
        *self.connection.lock().unwrap() = Some(Arc::clone(&connection));
        connection
    }
}

#[async_trait]
impl VoiceConnector for FakeConnector {
    async fn existing(&self, _guild: GuildId) -> Option<Arc<dyn VoiceConnection>> {
        self.connection().map(|c| c as Arc<dyn VoiceConnection>)
    }

    async fn join(&self, guild: GuildId, channel: ChannelId) -> Result<Arc<dyn VoiceConnection>> {
        if self.refuse_joins {
            bail!("missing permission to connect");
        }
        self.joins.lock().unwrap().push((guild, channel));
        Ok(self.connect(guild, channel))
    }
}

/// Writes a placeholder audio file and records the text it was given.
#[derive(Default)]
pub struct FakeSynthesizer {
    fail: AtomicBool,
    texts: StdMutex<Vec<String>>,
}

impl FakeSynthesizer {
    pub fn failing() -> Self {
        FakeSynthesizer {
            fail: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.texts.lock().unwrap().len()
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, text_file: &Path, audio_file: &Path) -> Result<()> {
        let text = std::fs::read_to_string(text_file)?;
        self.texts.lock().unwrap().push(text);
        if self.fail.load(Ordering::SeqCst) {
            bail!("tts crashed");
        }
        std::fs::write(audio_file, b"RIFF")?;
        Ok(())
    }
}
