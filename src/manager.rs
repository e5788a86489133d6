//! TalkingBot // Manager
//!
//! Command facade over the guild sessions. Every operation checks the audio node first, runs with the guild's session locked and always returns a [`Response`], errors included.

use std::{sync::Arc, time::Duration};

use serenity::all::{GuildId, UserId};
use tracing::{debug, warn};

use crate::{
    looping::{LoopChange, INFINITE},
    node::{NodeClient, SearchSource, VoiceChannel},
    registry::{SessionGuard, SessionRegistry},
    response::{Embed, Response},
    session::{self, Error, PlayOutcome, QueueSnapshot},
    track::{format_duration, Track},
    TALKINGBOT_PRIMARY_COLOR, TALKINGBOT_QUEUE_COLOR,
};

/// Arguments of the play command.
#[derive(Debug, Clone)]
pub struct PlayRequest {
    /// URL or plain text query.
    pub query: String,

    /// Where the track starts if it's played immediately.
    pub start: Duration,

    /// Search backend for plain text queries, the configured default if none.
    pub source: Option<SearchSource>,

    /// Who asked for the track.
    pub requester: UserId,

    /// Voice channel of the requester.
    pub channel: Option<VoiceChannel>,
}

/// Entry point of every music command.
#[derive(Clone)]
pub struct AudioManager {
    registry: Arc<SessionRegistry>,
    node: NodeClient,
    default_source: SearchSource,
}

impl AudioManager {
    pub fn new(registry: Arc<SessionRegistry>, node: NodeClient, default_source: SearchSource) -> Self {
        Self {
            registry,
            node,
            default_source,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn node(&self) -> &NodeClient {
        &self.node
    }

    fn ensure_available(&self) -> session::Result<()> {
        if !self.node.is_available() {
            return Err(Error::ServiceUnavailable);
        }

        Ok(())
    }

    /// Locks an existing session.
    async fn session(&self, guild_id: GuildId) -> session::Result<SessionGuard> {
        self.ensure_available()?;
        self.registry
            .acquire(guild_id)
            .await
            .ok_or(Error::NotConnected)
    }

    /// Unregisters the session if the operation left it without a voice connection.
    fn release(&self, session: &SessionGuard) {
        if !session.is_connected() && self.registry.remove(session) {
            debug!("(release): session of {} removed", session.guild_id());
        }
    }

    pub async fn join(&self, guild_id: GuildId, channel: Option<VoiceChannel>) -> Response {
        respond("join", guild_id, self.try_join(guild_id, channel).await, |channel| {
            Response::text(format!("Connected to {}", channel.name))
        })
    }

    async fn try_join(
        &self,
        guild_id: GuildId,
        channel: Option<VoiceChannel>,
    ) -> session::Result<VoiceChannel> {
        self.ensure_available()?;

        let mut session = self.registry.acquire_or_create(guild_id).await;
        let result = session.join(&self.node, channel).await;
        self.release(&session);

        result
    }

    /// Searches the query and plays the first result, joining the requester's channel if needed.
    pub async fn play(&self, guild_id: GuildId, request: PlayRequest) -> Response {
        let requester = request.requester;
        let start = request.start;

        respond("play", guild_id, self.try_play(guild_id, request).await, |outcome| {
            match outcome {
                PlayOutcome::NowPlaying {
                    track,
                    start_ignored,
                } => {
                    let mut response = Response::embed(now_playing_embed(&track, Some(requester)));

                    if start_ignored {
                        response.text = Some(format!(
                            "Couldn't go to {}, playing from the beginning",
                            format_duration(start)
                        ));
                    }

                    response
                }
                PlayOutcome::Enqueued { track, .. } => {
                    Response::embed(enqueued_embed(&track, requester))
                }
            }
        })
    }

    async fn try_play(
        &self,
        guild_id: GuildId,
        request: PlayRequest,
    ) -> session::Result<PlayOutcome> {
        self.ensure_available()?;

        if request.channel.is_none() {
            return Err(Error::UserNotInVoice);
        }

        let mut session = self.registry.acquire_or_create(guild_id).await;
        let result = self.play_locked(&mut session, request).await;
        self.release(&session);

        result
    }

    async fn play_locked(
        &self,
        session: &mut SessionGuard,
        request: PlayRequest,
    ) -> session::Result<PlayOutcome> {
        let source = request.source.unwrap_or(self.default_source);
        let track = self
            .node
            .search(&request.query, source)
            .await?
            .into_iter()
            .next()
            .ok_or(Error::NothingFound)?;

        if !session.is_connected() {
            session.join(&self.node, request.channel).await?;
        }

        session.play(&self.node, track, request.start).await
    }

    pub async fn leave(&self, guild_id: GuildId) -> Response {
        respond("leave", guild_id, self.try_leave(guild_id).await, |_| {
            Response::text("I have left the vc")
        })
    }

    async fn try_leave(&self, guild_id: GuildId) -> session::Result<VoiceChannel> {
        let mut session = self.session(guild_id).await?;
        let result = session.leave(&self.node).await;
        self.release(&session);

        result
    }

    pub async fn stop(&self, guild_id: GuildId) -> Response {
        respond("stop", guild_id, self.try_stop(guild_id).await, |_| {
            Response::text("Stopped playing the music and cleared the queue")
        })
    }

    async fn try_stop(&self, guild_id: GuildId) -> session::Result<()> {
        let mut session = self.session(guild_id).await?;
        session.stop(&self.node).await
    }

    pub async fn pause(&self, guild_id: GuildId) -> Response {
        respond("pause", guild_id, self.try_pause(guild_id).await, |_| {
            Response::text("Paused the music")
        })
    }

    async fn try_pause(&self, guild_id: GuildId) -> session::Result<Track> {
        let mut session = self.session(guild_id).await?;
        session.pause(&self.node).await
    }

    pub async fn resume(&self, guild_id: GuildId) -> Response {
        respond("resume", guild_id, self.try_resume(guild_id).await, |_| {
            Response::text("Resumed the music")
        })
    }

    async fn try_resume(&self, guild_id: GuildId) -> session::Result<Track> {
        let mut session = self.session(guild_id).await?;
        session.resume(&self.node).await
    }

    pub async fn skip(&self, guild_id: GuildId) -> Response {
        respond("skip", guild_id, self.try_skip(guild_id).await, |track| {
            Response::embed(now_playing_embed(&track, None))
        })
    }

    async fn try_skip(&self, guild_id: GuildId) -> session::Result<Track> {
        let mut session = self.session(guild_id).await?;
        session.skip(&self.node).await
    }

    /// Moves the playback of the current track.
    pub async fn seek(&self, guild_id: GuildId, position: Duration) -> Response {
        respond("seek", guild_id, self.try_seek(guild_id, position).await, |position| {
            Response::text(format!("Skipped to {}", format_duration(position)))
        })
    }

    async fn try_seek(&self, guild_id: GuildId, position: Duration) -> session::Result<Duration> {
        let mut session = self.session(guild_id).await?;
        session.seek(&self.node, position).await
    }

    /// Removes a queued track by its 1-based position, `-1` removes the last one.
    pub async fn remove(&self, guild_id: GuildId, position: i64) -> Response {
        respond("remove", guild_id, self.try_remove(guild_id, position).await, |track| {
            Response::text(format!("Removed the track **{}**", track.title))
        })
    }

    async fn try_remove(&self, guild_id: GuildId, position: i64) -> session::Result<Track> {
        let mut session = self.session(guild_id).await?;
        session.remove(position)
    }

    pub async fn set_volume(&self, guild_id: GuildId, volume: i64) -> Response {
        respond("set_volume", guild_id, self.try_set_volume(guild_id, volume).await, |volume| {
            Response::text(format!("Changed volume to **{}**/100", volume))
        })
    }

    async fn try_set_volume(&self, guild_id: GuildId, volume: i64) -> session::Result<u8> {
        let mut session = self.session(guild_id).await?;
        session.set_volume(&self.node, volume).await
    }

    /// Loops the current track `times` times, `-1` loops forever.
    pub async fn set_loop(&self, guild_id: GuildId, times: i64) -> Response {
        respond("set_loop", guild_id, self.try_set_loop(guild_id, times).await, |change| {
            let verb = match change {
                LoopChange::Enabled => "set",
                LoopChange::Reset => "reset",
            };

            if times == INFINITE {
                Response::text(format!("Successfully {} to loop indefinitely", verb))
            } else {
                Response::text(format!("Successfully {} to loop {} times", verb, times))
            }
        })
    }

    async fn try_set_loop(&self, guild_id: GuildId, times: i64) -> session::Result<LoopChange> {
        let mut session = self.session(guild_id).await?;
        session.set_loop(times)
    }

    pub async fn queue(&self, guild_id: GuildId) -> Response {
        respond("queue", guild_id, self.try_queue(guild_id).await, |snapshot| {
            Response::embed(queue_embed(&snapshot))
        })
    }

    async fn try_queue(&self, guild_id: GuildId) -> session::Result<QueueSnapshot> {
        let session = self.session(guild_id).await?;
        session.snapshot()
    }

    /// Duration of the current track.
    pub async fn length(&self, guild_id: GuildId) -> Response {
        respond("length", guild_id, self.try_length(guild_id).await, |track| {
            Response::text(format!("Duration: {}", format_duration(track.duration)))
        })
    }

    async fn try_length(&self, guild_id: GuildId) -> session::Result<Track> {
        let session = self.session(guild_id).await?;
        session.now_playing()
    }

    /// Playback position of the current track, only shown to the invoking user.
    pub async fn position(&self, guild_id: GuildId) -> Response {
        respond("position", guild_id, self.try_position(guild_id).await, |(position, track)| {
            Response::ephemeral(format!(
                "Current track position: **{}**/{}",
                format_duration(position),
                format_duration(track.duration)
            ))
        })
    }

    async fn try_position(&self, guild_id: GuildId) -> session::Result<(Duration, Track)> {
        let session = self.session(guild_id).await?;
        session.position(&self.node).await
    }
}

/// Converts the result of an operation into its response, errors become ephemeral messages.
fn respond<T>(
    operation: &str,
    guild_id: GuildId,
    result: session::Result<T>,
    success: impl FnOnce(T) -> Response,
) -> Response {
    match result {
        Ok(value) => success(value),
        Err(e) => {
            match &e {
                Error::Upstream(message) => {
                    warn!("({}): audio node failed in {}: {}", operation, guild_id, message)
                }
                Error::ServiceUnavailable => {
                    warn!("({}): audio node unavailable for {}", operation, guild_id)
                }
                e => debug!("({}): rejected in {}: {:?}", operation, guild_id, e),
            }

            Response::ephemeral(e.to_string())
        }
    }
}

fn now_playing_embed(track: &Track, requester: Option<UserId>) -> Embed {
    let embed = Embed::new(TALKINGBOT_PRIMARY_COLOR)
        .title(track.title.clone())
        .description(format!("Now playing {}", track.markdown_link()))
        .url(track.url.clone())
        .thumbnail(track.artwork_url.clone())
        .field("Duration", format_duration(track.duration), true);

    match requester {
        Some(user) => embed
            .field("Requested by", format!("<@{}>", user), true)
            .field("Video author", track.author.clone(), false),
        None => embed.field("Video author", track.author.clone(), false),
    }
}

fn enqueued_embed(track: &Track, requester: UserId) -> Embed {
    Embed::new(TALKINGBOT_PRIMARY_COLOR)
        .title(format!("Enqueued {}", track.title))
        .description(format!("Added {} to the queue", track.markdown_link()))
        .url(track.url.clone())
        .thumbnail(track.artwork_url.clone())
        .field("Duration", format_duration(track.duration), true)
        .field("Requested by", format!("<@{}>", requester), true)
        .field("Video author", track.author.clone(), false)
}

fn queue_embed(snapshot: &QueueSnapshot) -> Embed {
    let current = if snapshot.paused {
        format!("{} (paused)", snapshot.current.markdown_link())
    } else {
        snapshot.current.markdown_link()
    };

    snapshot.tracks.iter().enumerate().fold(
        Embed::new(TALKINGBOT_QUEUE_COLOR)
            .title("Queue")
            .description("This is a list of all tracks on this server currently")
            .field("**Currently playing**", current, false),
        |embed, (index, track)| embed.field((index + 1).to_string(), track.markdown_link(), true),
    )
}
