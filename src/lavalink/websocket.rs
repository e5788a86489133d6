//! TalkingBot // Lavalink // WebSocket
//!
//! Messages received from the Lavalink v4 websocket and their conversion to [`NodeEvent`].

use std::time::Duration;

use serde::Deserialize;
use serenity::all::GuildId;

use super::rest::{Exception, Track};
use crate::node::{NodeEvent, TrackEndReason};

#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum Operation {
    Ready(ReadyOp),
    PlayerUpdate,
    Stats,
    Event(EventOp),
}

/// Sent by Lavalink once the websocket is ready.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyOp {
    pub resumed: bool,
    /// Session used by the REST API, not a Discord voice session.
    pub session_id: String,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum EventOp {
    TrackStartEvent,
    TrackEndEvent(TrackEndEvent),
    TrackExceptionEvent(TrackExceptionEvent),
    TrackStuckEvent(TrackStuckEvent),
    WebSocketClosedEvent(WebSocketClosedEvent),
}

#[derive(Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
enum EndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl From<EndReason> for TrackEndReason {
    fn from(value: EndReason) -> Self {
        match value {
            EndReason::Finished => Self::Finished,
            EndReason::LoadFailed => Self::LoadFailed,
            EndReason::Stopped => Self::Stopped,
            EndReason::Replaced => Self::Replaced,
            EndReason::Cleanup => Self::Cleanup,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackEndEvent {
    guild_id: String,
    track: Track,
    reason: EndReason,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackExceptionEvent {
    guild_id: String,
    track: Track,
    exception: Exception,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackStuckEvent {
    guild_id: String,
    track: Track,
    threshold_ms: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebSocketClosedEvent {
    guild_id: String,
    code: u16,
    reason: String,
    by_remote: bool,
}

/// A decoded websocket message.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Ready { resumed: bool, session_id: String },
    Event(NodeEvent),
    /// Player updates, stats and events without a guild session counterpart.
    Ignored,
}

/// Errors produced while decoding a websocket message.
#[derive(Debug)]
pub enum ParseError {
    Json(serde_json::Error),
    InvalidGuildId(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(e) => e.fmt(f),
            Self::InvalidGuildId(id) => write!(f, "invalid guild id: {}", id),
        }
    }
}

impl std::error::Error for ParseError {}

fn guild_id(value: &str) -> Result<GuildId, ParseError> {
    value
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(GuildId::new)
        .ok_or_else(|| ParseError::InvalidGuildId(value.to_owned()))
}

/// Decodes a text message received from the websocket.
pub fn parse_message(message: &str) -> Result<Incoming, ParseError> {
    let operation = serde_json::from_str::<Operation>(message).map_err(ParseError::Json)?;

    let event = match operation {
        Operation::Ready(ready) => {
            return Ok(Incoming::Ready {
                resumed: ready.resumed,
                session_id: ready.session_id,
            })
        }
        Operation::PlayerUpdate | Operation::Stats => return Ok(Incoming::Ignored),
        Operation::Event(event) => event,
    };

    Ok(match event {
        EventOp::TrackStartEvent => Incoming::Ignored,
        EventOp::TrackEndEvent(event) => Incoming::Event(NodeEvent::TrackEnd {
            guild_id: guild_id(&event.guild_id)?,
            track: event.track.into(),
            reason: event.reason.into(),
        }),
        EventOp::TrackExceptionEvent(event) => Incoming::Event(NodeEvent::TrackException {
            guild_id: guild_id(&event.guild_id)?,
            track: event.track.into(),
            message: event
                .exception
                .message
                .unwrap_or(event.exception.cause),
        }),
        EventOp::TrackStuckEvent(event) => Incoming::Event(NodeEvent::TrackStuck {
            guild_id: guild_id(&event.guild_id)?,
            track: event.track.into(),
            threshold: Duration::from_millis(event.threshold_ms),
        }),
        EventOp::WebSocketClosedEvent(event) => Incoming::Event(NodeEvent::SocketClosed {
            guild_id: guild_id(&event.guild_id)?,
            code: event.code,
            reason: event.reason,
            by_remote: event.by_remote,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK: &str = r#"{"encoded":"abc","info":{"identifier":"id","isSeekable":true,"author":"someone","length":1000,"isStream":false,"position":0,"title":"song","uri":"https://example.com/song","artworkUrl":null,"isrc":null,"sourceName":"http"},"pluginInfo":{},"userData":{}}"#;

    #[test]
    fn parses_ready() {
        let message = r#"{"op":"ready","resumed":false,"sessionId":"la3kfsdf5eafe848"}"#;

        assert_eq!(
            parse_message(message).unwrap(),
            Incoming::Ready {
                resumed: false,
                session_id: "la3kfsdf5eafe848".to_owned()
            }
        );
    }

    #[test]
    fn parses_track_end() {
        let message = format!(
            r#"{{"op":"event","type":"TrackEndEvent","guildId":"42","track":{},"reason":"replaced"}}"#,
            TRACK
        );

        match parse_message(&message).unwrap() {
            Incoming::Event(NodeEvent::TrackEnd {
                guild_id,
                track,
                reason,
            }) => {
                assert_eq!(guild_id, GuildId::new(42));
                assert_eq!(track.encoded, "abc");
                assert_eq!(reason, TrackEndReason::Replaced);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn parses_stuck_and_exception() {
        let stuck = format!(
            r#"{{"op":"event","type":"TrackStuckEvent","guildId":"1","track":{},"thresholdMs":10000}}"#,
            TRACK
        );
        assert!(matches!(
            parse_message(&stuck).unwrap(),
            Incoming::Event(NodeEvent::TrackStuck { threshold, .. }) if threshold == Duration::from_secs(10)
        ));

        let exception = format!(
            r#"{{"op":"event","type":"TrackExceptionEvent","guildId":"1","track":{},"exception":{{"message":null,"severity":"fault","cause":"broken pipe"}}}}"#,
            TRACK
        );
        assert!(matches!(
            parse_message(&exception).unwrap(),
            Incoming::Event(NodeEvent::TrackException { message, .. }) if message == "broken pipe"
        ));
    }

    #[test]
    fn ignores_stats_and_player_updates() {
        let stats = r#"{"op":"stats","players":1,"playingPlayers":1,"uptime":123}"#;
        let update = r#"{"op":"playerUpdate","guildId":"1","state":{"time":1,"position":2,"connected":true,"ping":0}}"#;

        assert_eq!(parse_message(stats).unwrap(), Incoming::Ignored);
        assert_eq!(parse_message(update).unwrap(), Incoming::Ignored);
    }

    #[test]
    fn rejects_zero_guild_id() {
        let message = r#"{"op":"event","type":"WebSocketClosedEvent","guildId":"0","code":4006,"reason":"","byRemote":true}"#;

        assert!(matches!(
            parse_message(message),
            Err(ParseError::InvalidGuildId(_))
        ));
    }
}
