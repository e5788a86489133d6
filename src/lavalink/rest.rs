//! TalkingBot // Lavalink // REST
//!
//! Objects exchanged with the Lavalink v4 REST API.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::track::Track as AudioTrack;

/// Error response returned by the REST API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Timestamp of the error in milliseconds since the epoch.
    pub timestamp: u64,
    /// HTTP status code.
    pub status: u16,
    /// HTTP status code message.
    pub error: String,
    /// Error message.
    pub message: String,
    /// Request path.
    pub path: String,
}

/// Exception raised by Lavalink while loading or playing a track.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exception {
    pub message: Option<String>,
    pub severity: String,
    pub cause: String,
}

/// Discord voice connection handed to Lavalink.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceState {
    pub token: String,
    pub endpoint: String,
    pub session_id: String,
}

/// Track to be loaded in the player, a null `encoded` stops the player.
#[derive(Debug, Clone, Serialize)]
pub struct UpdatePlayerTrack {
    pub encoded: Option<String>,
}

/// Body of `PATCH /v4/sessions/{session}/players/{guild}`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<UpdatePlayerTrack>,

    /// Position in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,

    /// Volume from 0 to 1000.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceState>,
}

impl UpdatePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a track, [`None`] stops the current one.
    pub fn encoded_track(&mut self, encoded: Option<String>) -> &mut Self {
        self.track = Some(UpdatePlayerTrack { encoded });
        self
    }

    pub fn position(&mut self, position: u64) -> &mut Self {
        self.position = Some(position);
        self
    }

    pub fn volume(&mut self, volume: u16) -> &mut Self {
        self.volume = Some(volume);
        self
    }

    pub fn paused(&mut self, paused: bool) -> &mut Self {
        self.paused = Some(paused);
        self
    }

    pub fn voice_state(&mut self, voice: VoiceState) -> &mut Self {
        self.voice = Some(voice);
        self
    }
}

/// Body of `PATCH /v4/sessions/{session}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSession {
    pub resuming: bool,

    /// Seconds the session survives a disconnection.
    pub timeout: u64,
}

/// State of a player.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub time: u64,
    /// Position of the track in milliseconds.
    pub position: u64,
    pub connected: bool,
    pub ping: i64,
}

/// A player associated with a guild.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub guild_id: String,
    pub track: Option<Track>,
    pub volume: u16,
    pub paused: bool,
    pub state: PlayerState,
}

/// A single audio track.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Base64 encoded track data.
    pub encoded: String,
    pub info: TrackInfo,
}

/// Information about a track.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub identifier: String,
    pub is_seekable: bool,
    pub author: String,
    /// Length in milliseconds.
    pub length: u64,
    pub is_stream: bool,
    pub position: u64,
    pub title: String,
    pub uri: Option<String>,
    pub artwork_url: Option<String>,
    pub isrc: Option<String>,
    pub source_name: String,
}

impl From<Track> for AudioTrack {
    fn from(value: Track) -> Self {
        Self {
            encoded: value.encoded,
            title: value.info.title,
            url: value.info.uri.unwrap_or_default(),
            author: value.info.author,
            duration: Duration::from_millis(value.info.length),
            artwork_url: value.info.artwork_url,
            seekable: value.info.is_seekable,
        }
    }
}

/// Information about a playlist.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    pub name: String,
    /// Index of the selected track, -1 if none.
    pub selected_track: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub info: PlaylistInfo,
    pub tracks: Vec<Track>,
}

/// Response of `GET /v4/loadtracks`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "loadType", content = "data", rename_all = "camelCase")]
pub enum LoadResult {
    Track(Track),
    Playlist(Playlist),
    Search(Vec<Track>),
    Empty {},
    Error(Exception),
}

impl LoadResult {
    /// Tracks of the result, the selected track of a playlist comes first.
    pub fn into_tracks(self) -> Vec<Track> {
        match self {
            Self::Track(track) => vec![track],
            Self::Playlist(mut playlist) => {
                if let Ok(selected) = usize::try_from(playlist.info.selected_track) {
                    if selected < playlist.tracks.len() {
                        playlist.tracks.rotate_left(selected);
                    }
                }

                playlist.tracks
            }
            Self::Search(tracks) => tracks,
            Self::Empty {} | Self::Error(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK: &str = r#"{
        "encoded": "QAAAjQIAJVJpY2sgQXN0bGV5",
        "info": {
            "identifier": "dQw4w9WgXcQ",
            "isSeekable": true,
            "author": "RickAstleyVEVO",
            "length": 212000,
            "isStream": false,
            "position": 0,
            "title": "Never Gonna Give You Up",
            "uri": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "artworkUrl": null,
            "isrc": null,
            "sourceName": "youtube"
        },
        "pluginInfo": {},
        "userData": {}
    }"#;

    #[test]
    fn parses_single_track() {
        let body = format!(r#"{{"loadType":"track","data":{}}}"#, TRACK);
        let tracks = serde_json::from_str::<LoadResult>(&body)
            .unwrap()
            .into_tracks();

        assert_eq!(tracks.len(), 1);

        let track = AudioTrack::from(tracks[0].clone());
        assert_eq!(track.title, "Never Gonna Give You Up");
        assert_eq!(track.duration, Duration::from_secs(212));
        assert!(track.seekable);
    }

    #[test]
    fn parses_empty_and_error_as_nothing() {
        let empty = serde_json::from_str::<LoadResult>(r#"{"loadType":"empty","data":{}}"#).unwrap();
        assert!(empty.into_tracks().is_empty());

        let error = serde_json::from_str::<LoadResult>(
            r#"{"loadType":"error","data":{"message":"blocked","severity":"common","cause":"x"}}"#,
        )
        .unwrap();
        assert!(error.into_tracks().is_empty());
    }

    #[test]
    fn playlist_starts_at_selected_track() {
        let second = TRACK.replace("QAAAjQIAJVJpY2sgQXN0bGV5", "second");
        let body = format!(
            r#"{{"loadType":"playlist","data":{{"info":{{"name":"mix","selectedTrack":1}},"pluginInfo":{{}},"tracks":[{},{}]}}}}"#,
            TRACK, second
        );
        let tracks = serde_json::from_str::<LoadResult>(&body)
            .unwrap()
            .into_tracks();

        assert_eq!(tracks[0].encoded, "second");
        assert_eq!(tracks.len(), 2);
    }

    #[test]
    fn stop_serializes_null_track() {
        let mut update = UpdatePlayer::new();
        update.encoded_track(None);

        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"track":{"encoded":null}}"#
        );
    }
}
