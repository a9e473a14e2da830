use anyhow::Result;
use log::{debug, error, info};
use serenity::async_trait;
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::UserId;
use serenity::prelude::*;
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;

use chatterbox::chat::ChatOutput;
use chatterbox::commands::{parse_command, CommandHandler};
use chatterbox::config::Config;
use chatterbox::discord::{
    conversation_turn, voice_channel_of, GuildMemberResolver, SerenityChat, SongbirdConnector,
};
use chatterbox::engine::{AimlEngine, ElizaEngine, EngineHandle, Engines};
use chatterbox::moderation::ImmunityList;
use chatterbox::sanitizer::{NoUsers, UserResolver};
use chatterbox::trigger::{TriggerController, TypingDelay};
use chatterbox::voice::{CommandSynthesizer, VoicePipeline};

struct Handler {
    command_handler: Arc<CommandHandler>,
    trigger: Arc<TriggerController>,
}

impl Handler {
    async fn handle_message(&self, ctx: &Context, msg: &Message) -> Result<()> {
        let turn = conversation_turn(ctx, msg);
        let chat = SerenityChat::new(Arc::clone(&ctx.http));
        let resolver: Box<dyn UserResolver> = match msg.guild_id {
            Some(guild_id) => Box::new(GuildMemberResolver::new(ctx.clone(), guild_id)),
            None => Box::new(NoUsers),
        };

        if !turn.sender.is_bot {
            if let Some(command) = parse_command(&turn.text, self.command_handler.prefix()) {
                let voice_channel = msg
                    .guild_id
                    .and_then(|guild_id| voice_channel_of(ctx, guild_id, msg.author.id));
                let playback = self
                    .command_handler
                    .handle(command, &turn, voice_channel, resolver.as_ref(), &chat)
                    .await?;
                if playback.is_some() {
                    debug!("Voice playback queued for {}", msg.author.id);
                }
                return Ok(());
            }
        }

        self.trigger
            .handle_message(&turn, resolver.as_ref(), &chat)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if let Err(e) = self.handle_message(&ctx, &msg).await {
            error!("Error handling message: {:#}", e);
            let chat = SerenityChat::new(Arc::clone(&ctx.http));
            if let Err(why) = chat
                .send_text(msg.channel_id, "Sorry, I encountered an error processing your message.")
                .await
            {
                error!("Failed to send error message: {}", why);
            }
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🎉 {} is connected and ready!", ready.user.name);
        info!("📡 Connected to {} guilds", ready.guilds.len());
        info!("🔗 Gateway session ID: {:?}", ready.session_id);
        info!("🤖 Bot ID: {}", ready.user.id);

        if let Some(shard) = ready.shard {
            info!("⚡ Shard: {}/{}", shard[0] + 1, shard[1]);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting ChatterBox Discord Bot...");

    let http = Http::new(&config.discord_token);
    let bot_user = http.get_current_user().await?;
    let app_owner = http.get_current_application_info().await?.owner.id;
    let bot_id: UserId = bot_user.id;
    info!("🤖 Running as {} ({}), owned by {}", bot_user.name, bot_id, app_owner);

    // ALICE answers to the string Discord uses to mention the bot.
    let alice = AimlEngine::bootstrap(&format!("<@{}>", bot_id.0), &config.brain_path).await?;
    info!("🧠 ALICE knows {} categories", alice.category_count());
    let engines = Engines::new(EngineHandle::new(alice), EngineHandle::new(ElizaEngine::new()?));

    let mut owner_ids = config.owner_ids.clone();
    owner_ids.push(app_owner.0);

    let policy = Arc::new(ImmunityList::new(owner_ids, config.immune_ids.iter().copied()));

    let (min_delay, max_delay) = config.typing_delay_secs;
    let trigger = Arc::new(TriggerController::new(
        bot_id,
        engines.default_engine().clone(),
        policy.clone(),
        TypingDelay::new(min_delay, max_delay),
    ));

    let songbird = Songbird::serenity();
    let voice = Arc::new(VoicePipeline::new(
        Arc::new(SongbirdConnector::new(Arc::clone(&songbird))),
        Arc::new(CommandSynthesizer::new(config.tts_command.clone(), config.tts_timeout)),
    ));

    let command_handler = CommandHandler::new(
        config.command_prefix.clone(),
        engines,
        Arc::clone(&trigger),
        voice,
        policy,
    );
    let handler = Handler {
        command_handler: Arc::new(command_handler),
        trigger,
    };

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {}", e);
            anyhow::anyhow!("Client creation failed: {}", e)
        })?;

    info!("Bot configured successfully. Connecting to Discord gateway...");
    info!("Gateway intents: {:?}", intents);

    if let Err(why) = client.start().await {
        error!("Gateway connection failed: {:?}", why);
        return Err(anyhow::anyhow!("Failed to establish gateway connection: {}", why));
    }

    Ok(())
}
