//! TalkingBot
//!
//! Music bot for Discord backed by a Lavalink node: per-guild audio sessions, their queues and loops, and the slash commands driving them.

use std::sync::Arc;

use serenity::all::GuildId;

pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod handler;
pub mod lavalink;
pub mod looping;
pub mod manager;
pub mod node;
pub mod parsers;
pub mod presence;
pub mod queue;
pub mod registry;
pub mod response;
pub mod session;
pub mod track;

#[cfg(test)]
mod test;

/// Color of the "now playing" and "enqueued" embeds.
pub const TALKINGBOT_PRIMARY_COLOR: u32 = 0x0A90FA;

/// Color of the queue embed.
pub const TALKINGBOT_QUEUE_COLOR: u32 = 0x10FF90;

/// Shared state used by the event handler.
#[derive(Clone)]
pub struct TalkingBotContext {
    /// Music commands.
    pub manager: manager::AudioManager,

    /// Idle and disconnection watcher.
    pub presence: presence::VoicePresence,

    /// Parser of the `timecode` options.
    pub timecode_parser: Arc<parsers::TimecodeParser>,

    /// Guilds where the commands are registered, global registration if empty.
    pub guilds: Arc<Vec<GuildId>>,
}
