//! TalkingBot // Session
//!
//! Per-guild audio session: the voice connection, the playback state machine, the queue and the loop state.
//!
//! A session never talks to Discord directly, every side effect goes through the [`NodeClient`] given to each operation. Callers must hold the session's lock (see [`crate::registry`]) for the whole operation, including the node calls, so operations on the same guild never interleave.

use std::{
    collections::HashSet,
    error,
    fmt::{self, Display, Formatter},
    result,
    time::Duration,
};

use serenity::all::GuildId;
use tracing::{debug, warn};

use crate::{
    looping::{self, InvalidTimes, LoopChange, LoopController},
    node::{self, NodeClient, TrackEndReason, VoiceChannel, VoiceConnection},
    queue::{self, TrackQueue},
    track::Track,
};

/// Volume used by new sessions.
pub const DEFAULT_VOLUME: u8 = 100;

/// Offset sent instead of zero when seeking, Lavalink drops position updates with a zero value.
pub const MIN_SEEK_OFFSET: Duration = Duration::from_millis(1);

/// Invalid values received by a session operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidArgument {
    /// The timecode couldn't be parsed.
    Timecode,

    /// The seek position is after the end of the track.
    SeekOutOfRange,

    /// The start position is after the end of the track.
    StartOutOfRange,

    /// The queue position doesn't exist.
    Queue(queue::Error),

    /// The loop count is invalid.
    LoopTimes(InvalidTimes),
}

/// Every way a session operation can fail, all of them are displayable to users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The audio node is unreachable or didn't respond in time.
    ServiceUnavailable,

    /// The operation requires a voice connection.
    NotConnected,

    /// The invoking user isn't in a voice channel.
    UserNotInVoice,

    AlreadyConnected,

    AlreadyPlaying,

    AlreadyPaused,

    AlreadyStopped,

    /// Nothing is loaded in the player.
    NothingPlaying,

    /// Skip was requested while the player is paused.
    SkipWhilePaused,

    /// Skip was requested with nothing queued after the current track.
    OnlyCurrentTrack,

    /// Loop was requested with nothing loaded.
    NothingToLoop,

    /// The current track doesn't support seeking.
    NotSeekable,

    /// The search returned no tracks.
    NothingFound,

    InvalidArgument(InvalidArgument),

    /// The audio node failed the operation.
    Upstream(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceUnavailable => write!(
                f,
                "Music service is now unavailable! Contact administrator if you have any questions."
            ),
            Self::NotConnected => write!(f, "Not connected to any voice channel!"),
            Self::UserNotInVoice => write!(f, "You must be connected to a vc"),
            Self::AlreadyConnected => write!(f, "I am already connected to a vc"),
            Self::AlreadyPlaying => write!(f, "Music is already playing"),
            Self::AlreadyPaused => write!(f, "Music is already paused"),
            Self::AlreadyStopped => write!(f, "Music is already stopped"),
            Self::NothingPlaying => {
                write!(f, "No songs in queue. Add a song with `/play` command")
            }
            Self::SkipWhilePaused => write!(f, "Music is paused. Resume to skip."),
            Self::OnlyCurrentTrack => write!(
                f,
                "Only currently playing song is in the queue. You can stop the playback using `/stop` or `/leave`"
            ),
            Self::NothingToLoop => {
                write!(f, "Music is not playing. To loop, play something first")
            }
            Self::NotSeekable => write!(f, "Cannot go to any position on this track!"),
            Self::NothingFound => write!(f, "Couldn't find anything."),
            Self::InvalidArgument(InvalidArgument::Timecode) => write!(
                f,
                "Failed to parse timecode! Format for the timecode is: 0:00"
            ),
            Self::InvalidArgument(InvalidArgument::SeekOutOfRange) => {
                write!(f, "The timecode is outside of track's length!")
            }
            Self::InvalidArgument(InvalidArgument::StartOutOfRange) => {
                write!(f, "Set timecode is outside of track's length!")
            }
            Self::InvalidArgument(InvalidArgument::Queue(queue::Error::IndexOutOfRange {
                len,
                ..
            })) => write!(
                f,
                "Index is not present inside the Queue. Enter values from (1 to {})",
                len
            ),
            Self::InvalidArgument(InvalidArgument::Queue(queue::Error::Empty)) => {
                write!(f, "The queue is empty, there is nothing to remove")
            }
            Self::InvalidArgument(InvalidArgument::LoopTimes(_)) => {
                write!(f, "Cannot loop negative or zero times")
            }
            Self::Upstream(message) => write!(f, "Error\n{}", message),
        }
    }
}

impl error::Error for Error {}

impl From<node::Error> for Error {
    fn from(value: node::Error) -> Self {
        match value {
            node::Error::Unavailable | node::Error::Timeout(_) => Self::ServiceUnavailable,
            node::Error::Operation(message) => Self::Upstream(message),
        }
    }
}

impl From<queue::Error> for Error {
    fn from(value: queue::Error) -> Self {
        Self::InvalidArgument(InvalidArgument::Queue(value))
    }
}

impl From<InvalidTimes> for Error {
    fn from(value: InvalidTimes) -> Self {
        Self::InvalidArgument(InvalidArgument::LoopTimes(value))
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Playback state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Not in a voice channel.
    Disconnected,

    /// In a voice channel with nothing loaded.
    Idle,

    Playing(Track),

    Paused(Track),
}

/// Result of a play request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    /// The track started immediately.
    NowPlaying {
        track: Track,

        /// The node refused to move to the requested start, the track plays from the beginning.
        start_ignored: bool,
    },

    /// Something was already loaded, the track was added to the queue.
    Enqueued {
        track: Track,

        /// 1-based position of the track in the queue.
        position: usize,
    },
}

/// Read-only view of the queue for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub current: Track,
    pub paused: bool,
    pub tracks: Vec<Track>,
}

/// What a node event did to the session, mostly used for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event doesn't refer to the current track of a connected session.
    Ignored,

    /// End of a track this session replaced or stopped by itself.
    Acknowledged,

    /// The loop replayed the track.
    Replayed(Track),

    /// The next queued track started.
    Advanced(Track),

    /// The track ended abnormally, the player is now idle.
    Cleared,

    /// The queue is empty, the player is now idle.
    Exhausted,

    /// The failed track went back to the queue and nothing left in it can be played.
    Requeued,

    /// The node failed while starting the next track.
    Failed(Error),
}

/// Per-guild aggregate of the voice connection, playback state, queue and loop.
#[derive(Debug)]
pub struct GuildAudioSession {
    guild_id: GuildId,
    connection: Option<VoiceConnection>,
    status: Status,
    queue: TrackQueue,
    looping: LoopController,
    volume: u8,

    /// Last track replaced or stopped by the session itself, its end event is expected and dropped.
    superseded: Option<Track>,

    /// Encoded tracks that got stuck or raised an exception since the last normal end.
    failed: HashSet<String>,
}

impl GuildAudioSession {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            connection: None,
            status: Status::Disconnected,
            queue: TrackQueue::new(),
            looping: LoopController::new(),
            volume: DEFAULT_VOLUME,
            superseded: None,
            failed: HashSet::new(),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn connection(&self) -> Option<&VoiceConnection> {
        self.connection.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn queue(&self) -> &TrackQueue {
        &self.queue
    }

    pub fn looping(&self) -> &LoopController {
        &self.looping
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// The track loaded in the player, playing or paused.
    pub fn current(&self) -> Option<&Track> {
        match &self.status {
            Status::Playing(track) | Status::Paused(track) => Some(track),
            Status::Disconnected | Status::Idle => None,
        }
    }

    fn is_current(&self, track: &Track) -> bool {
        self.current().is_some_and(|current| current.is_same(track))
    }

    fn require_connection(&self) -> Result<VoiceConnection> {
        self.connection.clone().ok_or(Error::NotConnected)
    }

    fn require_current(&self) -> Result<Track> {
        self.require_connection()?;
        self.current().cloned().ok_or(Error::NothingPlaying)
    }

    /// Drops every piece of playback state and forgets the voice connection.
    fn teardown(&mut self) {
        self.connection = None;
        self.status = Status::Disconnected;
        self.queue.clear();
        self.looping.reset();
        self.superseded = None;
        self.failed.clear();
    }

    /// Connects to the user's voice channel.
    pub async fn join(
        &mut self,
        node: &NodeClient,
        channel: Option<VoiceChannel>,
    ) -> Result<VoiceChannel> {
        if self.connection.is_some() {
            return Err(Error::AlreadyConnected);
        }

        let channel = channel.ok_or(Error::UserNotInVoice)?;
        let connection = node.connect(self.guild_id, channel).await?;
        let joined = connection.channel.clone();

        self.connection = Some(connection);
        self.status = Status::Idle;

        Ok(joined)
    }

    /// Starts the track if nothing is loaded, otherwise adds it to the queue.
    ///
    /// `start` is only used when the track starts immediately.
    pub async fn play(
        &mut self,
        node: &NodeClient,
        track: Track,
        start: Duration,
    ) -> Result<PlayOutcome> {
        let connection = self.require_connection()?;

        if self.current().is_some() {
            self.queue.enqueue(track.clone());
            return Ok(PlayOutcome::Enqueued {
                track,
                position: self.queue.len(),
            });
        }

        if start > track.duration {
            return Err(Error::InvalidArgument(InvalidArgument::StartOutOfRange));
        }

        node.play(&connection, &track).await?;
        self.status = Status::Playing(track.clone());

        let mut start_ignored = false;

        if !start.is_zero() {
            if let Err(e) = node.seek(&connection, start).await {
                warn!("(play): cannot seek to the start position: {}", e);
                start_ignored = true;
            }
        }

        Ok(PlayOutcome::NowPlaying {
            track,
            start_ignored,
        })
    }

    pub async fn pause(&mut self, node: &NodeClient) -> Result<Track> {
        let connection = self.require_connection()?;

        let track = match &self.status {
            Status::Playing(track) => track.clone(),
            Status::Paused(_) => return Err(Error::AlreadyPaused),
            Status::Idle | Status::Disconnected => return Err(Error::NothingPlaying),
        };

        node.pause(&connection).await?;
        self.status = Status::Paused(track.clone());

        Ok(track)
    }

    pub async fn resume(&mut self, node: &NodeClient) -> Result<Track> {
        let connection = self.require_connection()?;

        let track = match &self.status {
            Status::Paused(track) => track.clone(),
            Status::Playing(_) => return Err(Error::AlreadyPlaying),
            Status::Idle | Status::Disconnected => return Err(Error::NothingPlaying),
        };

        node.resume(&connection).await?;
        self.status = Status::Playing(track.clone());

        Ok(track)
    }

    /// Stops the current track, clears the queue and disables the loop.
    pub async fn stop(&mut self, node: &NodeClient) -> Result<()> {
        let connection = self.require_connection()?;
        let current = self.current().cloned().ok_or(Error::AlreadyStopped)?;

        node.stop(&connection).await?;

        self.superseded = Some(current);
        self.queue.clear();
        self.looping.reset();
        self.failed.clear();
        self.status = Status::Idle;

        Ok(())
    }

    /// Replaces the current track with the next one from the queue.
    pub async fn skip(&mut self, node: &NodeClient) -> Result<Track> {
        let connection = self.require_connection()?;

        let current = match &self.status {
            Status::Playing(track) => track.clone(),
            Status::Paused(_) => return Err(Error::SkipWhilePaused),
            Status::Idle | Status::Disconnected => return Err(Error::NothingPlaying),
        };

        let next = self.queue.try_dequeue().ok_or(Error::OnlyCurrentTrack)?;

        if let Err(e) = node.play(&connection, &next).await {
            self.queue.requeue_front(next);
            return Err(e.into());
        }

        self.superseded = Some(current);
        self.status = Status::Playing(next.clone());

        Ok(next)
    }

    /// Moves the playback of the current track to `position`, returning the requested position.
    pub async fn seek(&mut self, node: &NodeClient, position: Duration) -> Result<Duration> {
        let connection = self.require_connection()?;
        let track = self.require_current()?;

        if !track.seekable {
            return Err(Error::NotSeekable);
        }

        if position > track.duration {
            return Err(Error::InvalidArgument(InvalidArgument::SeekOutOfRange));
        }

        let target = if position.is_zero() {
            MIN_SEEK_OFFSET
        } else {
            position
        };

        debug!("(seek): seeking to {} ms", target.as_millis());
        node.seek(&connection, target).await?;

        Ok(position)
    }

    /// Removes a track from the queue by its 1-based position, see [`queue::LAST_POSITION`].
    pub fn remove(&mut self, position: i64) -> Result<Track> {
        self.require_connection()?;
        Ok(self.queue.remove_at(position)?)
    }

    /// Sets the volume, clamping it to 0..=100, returning the applied value.
    pub async fn set_volume(&mut self, node: &NodeClient, volume: i64) -> Result<u8> {
        let connection = self.require_connection()?;
        let volume = volume.clamp(0, 100) as u8;

        node.set_volume(&connection, volume).await?;
        self.volume = volume;

        Ok(volume)
    }

    /// Loops the current track `times` times, [`looping::INFINITE`] loops forever.
    pub fn set_loop(&mut self, times: i64) -> Result<LoopChange> {
        looping::validate_times(times)?;
        self.require_connection()?;

        if self.current().is_none() {
            return Err(Error::NothingToLoop);
        }

        Ok(self.looping.set_loop(times)?)
    }

    pub fn now_playing(&self) -> Result<Track> {
        self.require_current()
    }

    /// Asks the node where the playback of the current track is.
    pub async fn position(&self, node: &NodeClient) -> Result<(Duration, Track)> {
        let connection = self.require_connection()?;
        let track = self.require_current()?;
        let position = node.position(&connection).await?;

        Ok((position, track))
    }

    pub fn snapshot(&self) -> Result<QueueSnapshot> {
        let current = self.require_current()?;

        Ok(QueueSnapshot {
            paused: matches!(self.status, Status::Paused(_)),
            tracks: self.queue.iter().cloned().collect(),
            current,
        })
    }

    /// Stops the playback if needed and leaves the voice channel.
    ///
    /// The local state is always torn down, even if the node fails to disconnect.
    pub async fn leave(&mut self, node: &NodeClient) -> Result<VoiceChannel> {
        let connection = self.require_connection()?;

        if self.current().is_some() {
            if let Err(e) = self.stop(node).await {
                warn!("(leave): cannot stop the playback: {}", e);
            }
        }

        let disconnected = node.disconnect(&connection).await;
        self.teardown();
        disconnected?;

        Ok(connection.channel)
    }

    /// Handles the end of a track reported by the node.
    pub async fn on_track_end(
        &mut self,
        node: &NodeClient,
        track: &Track,
        reason: TrackEndReason,
    ) -> EventOutcome {
        let Some(connection) = self.connection.clone() else {
            return EventOutcome::Ignored;
        };

        if reason != TrackEndReason::Finished {
            if self.superseded.as_ref().is_some_and(|t| t.is_same(track)) {
                self.superseded = None;
                return EventOutcome::Acknowledged;
            }

            if !self.is_current(track) {
                return EventOutcome::Ignored;
            }

            self.looping.reset();
            self.status = Status::Idle;
            return EventOutcome::Cleared;
        }

        if !self.is_current(track) {
            return EventOutcome::Ignored;
        }

        self.failed.clear();

        if self.looping.on_track_finished_normally() {
            let current = track.clone();
            return match node.play(&connection, &current).await {
                Ok(()) => {
                    self.status = Status::Playing(current.clone());
                    EventOutcome::Replayed(current)
                }
                Err(e) => {
                    self.looping.reset();
                    self.status = Status::Idle;
                    EventOutcome::Failed(e.into())
                }
            };
        }

        let Some(next) = self.queue.try_dequeue() else {
            self.looping.reset();
            self.status = Status::Idle;
            return EventOutcome::Exhausted;
        };

        self.start_next(node, &connection, next).await
    }

    /// Handles a track that got stuck or raised an exception: it goes to the back of the queue and the next one starts.
    ///
    /// Playback stops instead when the next track already failed since the last normal end.
    pub async fn on_track_failed(&mut self, node: &NodeClient, track: &Track) -> EventOutcome {
        let Some(connection) = self.connection.clone() else {
            return EventOutcome::Ignored;
        };

        if !self.is_current(track) {
            return EventOutcome::Ignored;
        }

        self.looping.reset();
        self.superseded = Some(track.clone());
        self.failed.insert(track.encoded.clone());
        self.queue.enqueue(track.clone());

        match self.queue.try_dequeue() {
            Some(next) if !self.failed.contains(&next.encoded) => {
                self.start_next(node, &connection, next).await
            }
            next => {
                if let Some(next) = next {
                    self.queue.requeue_front(next);
                }

                // The next track already failed since the last normal end.
                if let Err(e) = node.stop(&connection).await {
                    warn!("(on_track_failed): cannot stop the failed track: {}", e);
                }

                self.status = Status::Idle;
                EventOutcome::Requeued
            }
        }
    }

    async fn start_next(
        &mut self,
        node: &NodeClient,
        connection: &VoiceConnection,
        next: Track,
    ) -> EventOutcome {
        match node.play(connection, &next).await {
            Ok(()) => {
                self.status = Status::Playing(next.clone());
                EventOutcome::Advanced(next)
            }
            Err(e) => {
                self.queue.requeue_front(next);
                self.looping.reset();
                self.status = Status::Idle;
                EventOutcome::Failed(e.into())
            }
        }
    }
}
