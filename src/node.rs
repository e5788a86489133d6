//! TalkingBot // Node
//!
//! Contract between the audio core and the remote audio node (Lavalink or any other backend able to search and stream tracks into a voice channel).
//!
//! Every call made by the core goes through [`NodeClient`], which bounds it with a timeout so a stuck node can't hold a guild's session forever.

use std::{
    error,
    fmt::{self, Display, Formatter},
    future::Future,
    result,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use serenity::all::{ChannelId, GuildId};
use tokio::time::timeout;
use tracing::warn;

use crate::track::Track;

/// Errors reported by the audio node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The node isn't connected or ready.
    Unavailable,

    /// The call didn't complete in time.
    Timeout(Duration),

    /// The node received the call but failed to execute it.
    Operation(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "audio node unavailable"),
            Self::Timeout(duration) => {
                write!(f, "audio node didn't respond in {} ms", duration.as_millis())
            }
            Self::Operation(message) => write!(f, "{}", message),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// Where plain text queries are searched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SearchSource {
    YouTube,
    YouTubeMusic,
    #[default]
    SoundCloud,
}

impl SearchSource {
    /// Identifier prefix understood by Lavalink's source managers.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::YouTube => "ytsearch",
            Self::YouTubeMusic => "ytmsearch",
            Self::SoundCloud => "scsearch",
        }
    }

    /// Name used in the configuration and as the slash command choice value.
    pub fn name(&self) -> &'static str {
        match self {
            Self::YouTube => "youtube",
            Self::YouTubeMusic => "youtube_music",
            Self::SoundCloud => "soundcloud",
        }
    }
}

impl FromStr for SearchSource {
    type Err = String;

    fn from_str(s: &str) -> result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "youtube" | "yt" => Ok(Self::YouTube),
            "youtube_music" | "youtubemusic" | "ytm" => Ok(Self::YouTubeMusic),
            "soundcloud" | "sc" => Ok(Self::SoundCloud),
            other => Err(format!("unknown search source: {}", other)),
        }
    }
}

/// A voice channel the bot can connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceChannel {
    pub id: ChannelId,
    pub name: String,
}

/// Handle of an established voice connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceConnection {
    pub guild_id: GuildId,
    pub channel: VoiceChannel,
}

/// The reason why a track stopped playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEndReason {
    /// The track reached its end.
    Finished,
    /// The track failed to load.
    LoadFailed,
    /// The track was stopped.
    Stopped,
    /// Another track was started over it.
    Replaced,
    /// The player was cleaned up.
    Cleanup,
}

/// Lifecycle events emitted by the audio node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    TrackEnd {
        guild_id: GuildId,
        track: Track,
        reason: TrackEndReason,
    },
    TrackStuck {
        guild_id: GuildId,
        track: Track,
        threshold: Duration,
    },
    TrackException {
        guild_id: GuildId,
        track: Track,
        message: String,
    },
    /// The node lost its voice websocket to Discord.
    SocketClosed {
        guild_id: GuildId,
        code: u16,
        reason: String,
        by_remote: bool,
    },
}

impl NodeEvent {
    /// Guild this event belongs to.
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::TrackEnd { guild_id, .. }
            | Self::TrackStuck { guild_id, .. }
            | Self::TrackException { guild_id, .. }
            | Self::SocketClosed { guild_id, .. } => *guild_id,
        }
    }
}

/// Operations provided by a remote audio node.
#[async_trait]
pub trait AudioNode: Send + Sync {
    /// Returns true if the node can accept calls right now.
    fn is_available(&self) -> bool;

    /// Resolves a URL or searches a plain text query, an empty vector means nothing was found.
    async fn search(&self, query: &str, source: SearchSource) -> Result<Vec<Track>>;

    /// Connects the bot to a voice channel.
    async fn connect(&self, guild_id: GuildId, channel: VoiceChannel) -> Result<VoiceConnection>;

    /// Destroys the player and leaves the voice channel.
    async fn disconnect(&self, connection: &VoiceConnection) -> Result<()>;

    /// Starts a track, replacing the current one.
    async fn play(&self, connection: &VoiceConnection, track: &Track) -> Result<()>;

    async fn pause(&self, connection: &VoiceConnection) -> Result<()>;

    async fn resume(&self, connection: &VoiceConnection) -> Result<()>;

    async fn stop(&self, connection: &VoiceConnection) -> Result<()>;

    async fn seek(&self, connection: &VoiceConnection, position: Duration) -> Result<()>;

    /// Sets the volume, from 0 to 100.
    async fn set_volume(&self, connection: &VoiceConnection, volume: u8) -> Result<()>;

    /// Current playback position of the player.
    async fn position(&self, connection: &VoiceConnection) -> Result<Duration>;
}

/// Shared handle to an [`AudioNode`] that bounds every call with a timeout.
#[derive(Clone)]
pub struct NodeClient {
    node: Arc<dyn AudioNode>,
    timeout: Duration,
}

impl NodeClient {
    pub fn new(node: Arc<dyn AudioNode>, timeout: Duration) -> Self {
        Self { node, timeout }
    }

    pub fn is_available(&self) -> bool {
        self.node.is_available()
    }

    async fn bounded<T, F>(&self, operation: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match timeout(self.timeout, future).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "({}): audio node didn't respond in {} ms",
                    operation,
                    self.timeout.as_millis()
                );
                Err(Error::Timeout(self.timeout))
            }
        }
    }

    pub async fn search(&self, query: &str, source: SearchSource) -> Result<Vec<Track>> {
        self.bounded("search", self.node.search(query, source)).await
    }

    pub async fn connect(&self, guild_id: GuildId, channel: VoiceChannel) -> Result<VoiceConnection> {
        self.bounded("connect", self.node.connect(guild_id, channel))
            .await
    }

    pub async fn disconnect(&self, connection: &VoiceConnection) -> Result<()> {
        self.bounded("disconnect", self.node.disconnect(connection))
            .await
    }

    pub async fn play(&self, connection: &VoiceConnection, track: &Track) -> Result<()> {
        self.bounded("play", self.node.play(connection, track)).await
    }

    pub async fn pause(&self, connection: &VoiceConnection) -> Result<()> {
        self.bounded("pause", self.node.pause(connection)).await
    }

    pub async fn resume(&self, connection: &VoiceConnection) -> Result<()> {
        self.bounded("resume", self.node.resume(connection)).await
    }

    pub async fn stop(&self, connection: &VoiceConnection) -> Result<()> {
        self.bounded("stop", self.node.stop(connection)).await
    }

    pub async fn seek(&self, connection: &VoiceConnection, position: Duration) -> Result<()> {
        self.bounded("seek", self.node.seek(connection, position))
            .await
    }

    pub async fn set_volume(&self, connection: &VoiceConnection, volume: u8) -> Result<()> {
        self.bounded("set_volume", self.node.set_volume(connection, volume))
            .await
    }

    pub async fn position(&self, connection: &VoiceConnection) -> Result<Duration> {
        self.bounded("position", self.node.position(connection))
            .await
    }
}
