//! TalkingBot // Commands
//!
//! Definitions of the slash commands and the conversion of their options into manager calls.

use serenity::{
    all::{ChannelId, CommandInteraction, CommandOptionType, GuildId, UserId},
    builder::{CreateCommand, CreateCommandOption},
    client::Context,
};
use tracing::warn;

use crate::{
    looping::INFINITE,
    manager::PlayRequest,
    node::{SearchSource, VoiceChannel},
    queue::LAST_POSITION,
    response::Response,
    session::{Error, InvalidArgument},
    TalkingBotContext,
};

/// Creates the definition of every command.
pub fn register() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("join")
            .description("Joins the voice channel you are in.")
            .dm_permission(false),
        CreateCommand::new("play")
            .description("Searches and plays the requested song, joining your voice channel if necessary.")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "query",
                    "URL or search terms.",
                )
                .required(true),
            )
            .add_option(CreateCommandOption::new(
                CommandOptionType::String,
                "timecode",
                "Where the song starts, like 1:30.",
            ))
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "source",
                    "Where the search terms are searched.",
                )
                .add_string_choice("YouTube", SearchSource::YouTube.name())
                .add_string_choice("YouTube Music", SearchSource::YouTubeMusic.name())
                .add_string_choice("SoundCloud", SearchSource::SoundCloud.name()),
            )
            .dm_permission(false),
        CreateCommand::new("leave")
            .description("Stops the music and leaves the voice channel.")
            .dm_permission(false),
        CreateCommand::new("stop")
            .description("Stops the music and clears the queue.")
            .dm_permission(false),
        CreateCommand::new("skip")
            .description("Skips to the next song in the queue.")
            .dm_permission(false),
        CreateCommand::new("pause")
            .description("Pauses the music.")
            .dm_permission(false),
        CreateCommand::new("resume")
            .description("Resumes the music.")
            .dm_permission(false),
        CreateCommand::new("volume")
            .description("Changes the volume of the music.")
            .add_option(
                CreateCommandOption::new(CommandOptionType::Integer, "volume", "From 1 to 100.")
                    .min_int_value(1)
                    .max_int_value(100)
                    .required(true),
            )
            .dm_permission(false),
        CreateCommand::new("length")
            .description("Shows the length of the current song.")
            .dm_permission(false),
        CreateCommand::new("position")
            .description("Shows where the current song is.")
            .dm_permission(false),
        CreateCommand::new("loop")
            .description("Loops the current song.")
            .add_option(CreateCommandOption::new(
                CommandOptionType::Integer,
                "times",
                "How many times the song repeats, forever if not set.",
            ))
            .dm_permission(false),
        CreateCommand::new("goto")
            .description("Goes to a position of the current song.")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "timecode", "Like 1:30.")
                    .required(true),
            )
            .dm_permission(false),
        CreateCommand::new("queue")
            .description("Shows the queue.")
            .dm_permission(false),
        CreateCommand::new("remove")
            .description("Removes a song from the queue.")
            .add_option(CreateCommandOption::new(
                CommandOptionType::Integer,
                "index",
                "Position of the song in the queue, the last one if not set.",
            ))
            .dm_permission(false),
    ]
}

/// Gets a string option.
fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_str())
}

/// Gets an integer option.
fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_i64())
}

/// Voice channel of the user, from the cache.
fn user_channel(context: &Context, guild_id: GuildId, user_id: UserId) -> Option<VoiceChannel> {
    let guild = context.cache.guild(guild_id)?;
    let id: ChannelId = guild.voice_states.get(&user_id)?.channel_id?;
    let name = guild
        .channels
        .get(&id)
        .map(|channel| channel.name.clone())
        .unwrap_or_else(|| id.to_string());

    Some(VoiceChannel { id, name })
}

fn invalid_timecode() -> Response {
    Response::ephemeral(Error::InvalidArgument(InvalidArgument::Timecode).to_string())
}

/// Executes a command, returns [`None`] for unknown commands.
pub async fn execute(
    talkingbot: &TalkingBotContext,
    context: &Context,
    command: &CommandInteraction,
) -> Option<Response> {
    let Some(guild_id) = command.guild_id else {
        return Some(Response::ephemeral("This command only works in servers."));
    };

    let manager = &talkingbot.manager;

    Some(match command.data.name.as_str() {
        "join" => {
            let channel = user_channel(context, guild_id, command.user.id);
            manager.join(guild_id, channel).await
        }
        "play" => play(talkingbot, context, command, guild_id).await,
        "leave" => {
            talkingbot.presence.cancel_leave(guild_id);
            manager.leave(guild_id).await
        }
        "stop" => manager.stop(guild_id).await,
        "skip" => manager.skip(guild_id).await,
        "pause" => manager.pause(guild_id).await,
        "resume" => manager.resume(guild_id).await,
        "volume" => {
            let volume = integer_option(command, "volume").unwrap_or(100);
            manager.set_volume(guild_id, volume).await
        }
        "length" => manager.length(guild_id).await,
        "position" => manager.position(guild_id).await,
        "loop" => {
            let times = integer_option(command, "times").unwrap_or(INFINITE);
            manager.set_loop(guild_id, times).await
        }
        "goto" => {
            let timecode = string_option(command, "timecode").unwrap_or_default();

            match talkingbot.timecode_parser.parse(timecode) {
                Some(position) => manager.seek(guild_id, position).await,
                None => invalid_timecode(),
            }
        }
        "queue" => manager.queue(guild_id).await,
        "remove" => {
            let index = integer_option(command, "index").unwrap_or(LAST_POSITION);
            manager.remove(guild_id, index).await
        }
        _ => return None,
    })
}

async fn play(
    talkingbot: &TalkingBotContext,
    context: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
) -> Response {
    let Some(query) = string_option(command, "query") else {
        warn!("(play): no query provided");
        return Response::ephemeral(Error::NothingFound.to_string());
    };

    let start = match string_option(command, "timecode") {
        Some(timecode) => match talkingbot.timecode_parser.parse(timecode) {
            Some(v) => v,
            None => return invalid_timecode(),
        },
        None => Default::default(),
    };

    let source = string_option(command, "source").and_then(|s| s.parse::<SearchSource>().ok());

    talkingbot
        .manager
        .play(
            guild_id,
            PlayRequest {
                query: query.to_owned(),
                channel: user_channel(context, guild_id, command.user.id),
                requester: command.user.id,
                start,
                source,
            },
        )
        .await
}
