use super::{get_group_help, get_help_text, ChatCommand};
use crate::chat::{ChatOutput, ConversationTurn, Embed};
use crate::engine::{EngineKind, Engines};
use crate::moderation::ImmunityList;
use crate::personas::PersonaManager;
use crate::sanitizer::{sanitize, UserResolver};
use crate::trigger::{TriggerController, TurnOutcome};
use crate::voice::{VoiceOutcome, VoicePipeline, VoiceRequest};
use anyhow::Result;
use log::{error, info};
use serenity::model::id::ChannelId;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct CommandHandler {
    prefix: String,
    engines: Engines,
    personas: PersonaManager,
    trigger: Arc<TriggerController>,
    voice: Arc<VoicePipeline>,
    owners: Arc<ImmunityList>,
}

impl CommandHandler {
    pub fn new(
        prefix: impl Into<String>,
        engines: Engines,
        trigger: Arc<TriggerController>,
        voice: Arc<VoicePipeline>,
        owners: Arc<ImmunityList>,
    ) -> Self {
        CommandHandler {
            prefix: prefix.into(),
            engines,
            personas: PersonaManager::new(),
            trigger,
            voice,
            owners,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Runs one command. `voice_channel` is the author's current voice channel.
    /// When `speak` starts voice playback, the playback task is returned; it
    /// runs on its own and the caller does not need to wait for it.
    pub async fn handle(
        &self,
        command: ChatCommand,
        turn: &ConversationTurn,
        voice_channel: Option<ChannelId>,
        resolver: &dyn UserResolver,
        chat: &dyn ChatOutput,
    ) -> Result<Option<JoinHandle<VoiceOutcome>>> {
        info!("Processing command {:?} from user: {}", command, turn.sender.id);

        match command {
            ChatCommand::Help => {
                chat.send_text(turn.channel_id, &get_help_text(&self.prefix)).await?;
            }
            ChatCommand::GroupHelp(engine) => {
                chat.send_text(turn.channel_id, &get_group_help(engine, &self.prefix))
                    .await?;
            }
            ChatCommand::Speak { text } => {
                return self.handle_speak(&text, turn, voice_channel, resolver, chat).await;
            }
            ChatCommand::EngineSpeak { engine, text } => {
                self.handle_engine_speak(engine, &text, turn, resolver, chat).await?;
            }
            ChatCommand::Describe(engine) => {
                let persona = self.personas.get_persona(engine);
                let embed = Embed {
                    title: persona.description_title.to_string(),
                    description: persona.description.to_string(),
                };
                chat.send_embed(turn.channel_id, &embed).await?;
            }
            ChatCommand::Reset(engine) => {
                self.handle_reset(engine, turn, chat).await?;
            }
        }

        Ok(None)
    }

    async fn handle_speak(
        &self,
        text: &str,
        turn: &ConversationTurn,
        voice_channel: Option<ChannelId>,
        resolver: &dyn UserResolver,
        chat: &dyn ChatOutput,
    ) -> Result<Option<JoinHandle<VoiceOutcome>>> {
        if text.is_empty() {
            self.send_usage(turn, "speak <text>", chat).await?;
            return Ok(None);
        }

        let reply = match self.trigger.respond(&turn.with_text(text), resolver, chat).await? {
            TurnOutcome::Replied(reply) => reply,
            _ => return Ok(None),
        };

        let Some(guild_id) = turn.guild_id else {
            return Ok(None);
        };
        let request = VoiceRequest { guild_id, voice_channel };
        let voice = Arc::clone(&self.voice);
        Ok(Some(tokio::spawn(async move { voice.speak(&reply, request).await })))
    }

    async fn handle_engine_speak(
        &self,
        engine: EngineKind,
        text: &str,
        turn: &ConversationTurn,
        resolver: &dyn UserResolver,
        chat: &dyn ChatOutput,
    ) -> Result<()> {
        if text.is_empty() {
            let usage = format!("{} speak <text>", engine.command_name());
            return self.send_usage(turn, &usage, chat).await;
        }

        let cleaned = sanitize(&turn.with_text(text).text_without_mention(self.trigger.bot_id()), resolver).await;
        let reply = self.engines.get(engine).respond(&cleaned).await?;

        let embed = Embed {
            title: format!("Dear {},", turn.sender.display_name),
            description: self.personas.get_persona(engine).sign(&reply),
        };
        chat.send_embed(turn.channel_id, &embed).await
    }

    async fn handle_reset(&self, engine: EngineKind, turn: &ConversationTurn, chat: &dyn ChatOutput) -> Result<()> {
        if !self.owners.is_owner(turn.sender.id.0) {
            return chat
                .send_text(turn.channel_id, &format!("Only the bot owner can reset {}.", engine))
                .await;
        }

        let message = match self.engines.get(engine).reset().await {
            Ok(()) => {
                info!("🧠 {} reset by {}", engine, turn.sender.id);
                format!("{}'s brain has been wiped. Starting fresh!", engine)
            }
            Err(e) => {
                error!("❌ Failed to reset {}: {:#}", engine, e);
                format!("Could not reset {}: {}", engine, e)
            }
        };
        chat.send_text(turn.channel_id, &message).await
    }

    async fn send_usage(&self, turn: &ConversationTurn, usage: &str, chat: &dyn ChatOutput) -> Result<()> {
        let text = format!("Please provide a message to process. Usage: `{}{}`", self.prefix, usage);
        chat.send_text(turn.channel_id, &text).await
    }
}
