//! # Feature: Voice Replies
//!
//! Reads a reply aloud in the requester's voice channel. The text goes through
//! an external text-to-speech program and the resulting file is played over
//! the guild's voice connection. Playback is serialized per guild and every
//! failure is logged and dropped; the text reply has already gone out.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.3.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Per-guild serialized playback with bounded TTS runs

use anyhow::{anyhow, bail, Context, Result};
use dashmap::DashMap;
use log::{debug, info, warn};
use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};

/// A live voice connection in one guild.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    async fn is_playing(&self) -> bool;

    /// Starts playing `path`. Returns once playback has begun.
    async fn play_file(&self, path: &Path) -> Result<()>;
}

#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn existing(&self, guild: GuildId) -> Option<Arc<dyn VoiceConnection>>;

    async fn join(&self, guild: GuildId, channel: ChannelId) -> Result<Arc<dyn VoiceConnection>>;
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text_file: &Path, audio_file: &Path) -> Result<()>;
}

/// Runs `<program> <text file> -o <audio file>`, e.g. festival's `text2wave`.
pub struct CommandSynthesizer {
    program: String,
    timeout: Duration,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        CommandSynthesizer {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Synthesizer for CommandSynthesizer {
    async fn synthesize(&self, text_file: &Path, audio_file: &Path) -> Result<()> {
        let mut command = Command::new(&self.program);
        command
            .arg(text_file)
            .arg("-o")
            .arg(audio_file)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = timeout(self.timeout, command.output())
            .await
            .map_err(|_| anyhow!("{} timed out after {:?}", self.program, self.timeout))?
            .with_context(|| format!("Could not run {}", self.program))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceRequest {
    pub guild_id: GuildId,
    /// The requester's current voice channel, if any.
    pub voice_channel: Option<ChannelId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceOutcome {
    NotInVoice,
    Played,
    Abandoned,
}

pub struct VoicePipeline {
    connector: Arc<dyn VoiceConnector>,
    synthesizer: Arc<dyn Synthesizer>,
    poll_interval: Duration,
    guild_locks: DashMap<GuildId, Arc<Mutex<()>>>,
}

impl VoicePipeline {
    pub fn new(connector: Arc<dyn VoiceConnector>, synthesizer: Arc<dyn Synthesizer>) -> Self {
        VoicePipeline {
            connector,
            synthesizer,
            poll_interval: Duration::from_millis(500),
            guild_locks: DashMap::new(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Speaks `text` in the requester's voice channel. Never fails.
    pub async fn speak(&self, text: &str, request: VoiceRequest) -> VoiceOutcome {
        let Some(channel) = request.voice_channel else {
            debug!("Requester in guild {} is not in voice, skipping playback", request.guild_id);
            return VoiceOutcome::NotInVoice;
        };

        let guild_lock = self.guild_locks.entry(request.guild_id).or_default().clone();
        let _playback = guild_lock.lock().await;

        match self.play(text, request.guild_id, channel).await {
            Ok(()) => {
                info!("🔊 Spoke a reply in guild {}", request.guild_id);
                VoiceOutcome::Played
            }
            Err(e) => {
                warn!("🔇 Voice playback abandoned in guild {}: {:#}", request.guild_id, e);
                VoiceOutcome::Abandoned
            }
        }
    }

    async fn play(&self, text: &str, guild: GuildId, channel: ChannelId) -> Result<()> {
        let connection = match self.connector.existing(guild).await {
            Some(connection) => connection,
            None => self
                .connector
                .join(guild, channel)
                .await
                .with_context(|| format!("Could not join voice channel {}", channel))?,
        };

        self.wait_until_idle(connection.as_ref()).await;

        let scratch = tempfile::tempdir().context("Could not create a scratch directory")?;
        let text_file = scratch.path().join("input.txt");
        let audio_file = scratch.path().join("output.wav");

        fs::write(&text_file, text)
            .await
            .with_context(|| format!("Could not write {}", text_file.display()))?;
        self.synthesizer.synthesize(&text_file, &audio_file).await?;
        connection.play_file(&audio_file).await?;

        // The player streams from the scratch file, so it has to outlive playback.
        self.wait_until_idle(connection.as_ref()).await;
        drop(scratch);
        Ok(())
    }

    async fn wait_until_idle(&self, connection: &dyn VoiceConnection) {
        while connection.is_playing().await {
            sleep(self.poll_interval).await;
        }
    }
}
