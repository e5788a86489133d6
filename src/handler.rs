//! TalkingBot // Handler
//!
//! Serenity event handler: registers the commands, answers the interactions and watches the voice states.

use serenity::{
    all::{Command, CommandInteraction, GuildId, Interaction, Ready, VoiceState},
    async_trait,
    builder::{CreateEmbed, CreateInteractionResponseFollowup, EditInteractionResponse},
    client::{Context, EventHandler},
    http::Http,
};
use tracing::{debug, error, info, warn};

use crate::{commands, response::Embed, TalkingBotContext};

/// Handles the events received from Discord.
pub struct TalkingBotHandler {
    pub talkingbot: TalkingBotContext,
}

#[async_trait]
impl EventHandler for TalkingBotHandler {
    async fn ready(&self, context: Context, ready: Ready) {
        info!("(ready): client connected as {}", ready.user.name);

        register_commands(&context.http, &self.talkingbot.guilds).await;
    }

    async fn interaction_create(&self, context: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            handle_command(&self.talkingbot, &context, &command).await;
        }
    }

    async fn voice_state_update(&self, context: Context, _old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        let bot_id = context.cache.current_user().id;

        if new.user_id == bot_id && new.channel_id.is_none() {
            self.talkingbot.presence.bot_disconnected(guild_id).await;
            return;
        }

        if let Some(listeners) = count_listeners(&context, guild_id) {
            self.talkingbot
                .presence
                .listeners_changed(guild_id, listeners);
        }
    }
}

/// Counts the users other than bots in the bot's voice channel.
fn count_listeners(context: &Context, guild_id: GuildId) -> Option<usize> {
    let bot_id = context.cache.current_user().id;
    let guild = context.cache.guild(guild_id)?;
    let channel_id = guild.voice_states.get(&bot_id)?.channel_id?;

    Some(
        guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(channel_id) && state.user_id != bot_id)
            .filter(|state| !state.member.as_ref().is_some_and(|member| member.user.bot))
            .count(),
    )
}

/// Handles a command interaction.
pub async fn handle_command(
    talkingbot: &TalkingBotContext,
    context: &Context,
    command: &CommandInteraction,
) {
    // Defer the interaction to avoid the "This interaction failed" message.
    if let Err(e) = command.defer(&context.http).await {
        error!("(handle_command): failed to defer interaction: {}", e);
        return;
    }

    debug!("(handle_command): executing {}", command.data.name);

    let Some(response) = commands::execute(talkingbot, context, command).await else {
        error!("(handle_command): unknown command: {}", command.data.name);
        return;
    };

    let embed = response.embed.as_ref().map(create_embed);

    if response.ephemeral {
        // The deferred response is public, ephemeral messages need a follow-up.
        if let Err(e) = command.delete_response(&context.http).await {
            warn!("(handle_command): cannot delete the deferred response: {}", e);
        }

        let mut followup = CreateInteractionResponseFollowup::new().ephemeral(true);

        if let Some(text) = response.text {
            followup = followup.content(text);
        }

        if let Some(embed) = embed {
            followup = followup.embed(embed);
        }

        if let Err(e) = command.create_followup(&context.http, followup).await {
            error!("(handle_command): cannot respond to the interaction: {}", e);
        }

        return;
    }

    let mut message = EditInteractionResponse::new();

    if let Some(text) = response.text {
        message = message.content(text);
    }

    if let Some(embed) = embed {
        message = message.embed(embed);
    }

    if let Err(e) = command.edit_response(&context.http, message).await {
        error!("(handle_command): cannot respond to the interaction: {}", e);
    }
}

/// Creates a Discord embed.
fn create_embed(embed: &Embed) -> CreateEmbed {
    let mut builder = CreateEmbed::new().color(embed.color);

    if let Some(title) = &embed.title {
        builder = builder.title(title.clone());
    }

    if let Some(description) = &embed.description {
        builder = builder.description(description.clone());
    }

    if let Some(url) = &embed.url {
        builder = builder.url(url.clone());
    }

    if let Some(thumbnail) = &embed.thumbnail {
        builder = builder.thumbnail(thumbnail.clone());
    }

    builder.fields(
        embed
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.value.clone(), field.inline)),
    )
}

/// Registers the commands globally, or only in `guilds` if it isn't empty.
pub async fn register_commands(http: impl AsRef<Http>, guilds: &[GuildId]) -> bool {
    let commands = commands::register();

    debug!(
        "(register_commands): registering {} commands...",
        commands.len()
    );

    if guilds.is_empty() {
        return match Command::set_global_commands(http, commands).await {
            Ok(v) => {
                info!("(register_commands): registered {} commands", v.len());
                true
            }
            Err(e) => {
                error!("(register_commands): cannot register the commands: {}", e);
                false
            }
        };
    }

    let mut registered = true;

    for guild_id in guilds {
        match guild_id.set_commands(http.as_ref(), commands.clone()).await {
            Ok(v) => info!(
                "(register_commands): registered {} commands in {}",
                v.len(),
                guild_id
            ),
            Err(e) => {
                error!(
                    "(register_commands): cannot register the commands in {}: {}",
                    guild_id, e
                );
                registered = false;
            }
        }
    }

    registered
}
