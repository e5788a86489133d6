//! TalkingBot // Lavalink
//!
//! Lavalink v4 client implementing [`AudioNode`]. Voice connections are made through [`Songbird`] in gateway-only mode and handed to Lavalink as the player's voice state.

use std::{
    fmt::{self, Display, Formatter},
    result,
    sync::{Arc, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use async_tungstenite::{
    tokio::{connect_async, ConnectStream},
    tungstenite::{
        self,
        client::IntoClientRequest,
        http::{header::InvalidHeaderValue, HeaderValue},
        Message,
    },
    WebSocketStream,
};
use dashmap::DashMap;
use futures::StreamExt;
use reqwest::{header::HeaderMap, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serenity::all::{GuildId, UserId};
use songbird::{ConnectionInfo, Songbird};
use tokio::{
    select, spawn,
    sync::{mpsc::UnboundedSender, oneshot},
    time::sleep,
};
use tracing::{debug, error, info, warn};

use crate::{
    node::{self, AudioNode, NodeEvent, SearchSource, VoiceChannel, VoiceConnection},
    track::Track,
};

use self::{
    rest::{ErrorResponse, LoadResult, Player, UpdatePlayer, UpdateSession, VoiceState},
    websocket::{parse_message, Incoming},
};

pub mod rest;
pub mod websocket;

/// Name sent to Lavalink as the client name and user agent.
pub const CLIENT_NAME: &str = concat!("talkingbot/", env!("CARGO_PKG_VERSION"));

/// Delay between reconnection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Seconds Lavalink keeps our players alive after the websocket drops.
pub const RESUME_TIMEOUT: u64 = 60;

#[derive(Debug)]
pub enum Error {
    WebSocket(tungstenite::Error),
    Reqwest(reqwest::Error),
    InvalidHeaderValue(InvalidHeaderValue),
    InvalidRequestHeader(reqwest::header::InvalidHeaderValue),
    RestError(ErrorResponse),
    InvalidResponse(serde_json::Error),
    Voice(songbird::error::JoinError),
    NotConnected,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebSocket(e) => e.fmt(f),
            Self::Reqwest(e) => e.fmt(f),
            Self::InvalidHeaderValue(e) => e.fmt(f),
            Self::InvalidRequestHeader(e) => e.fmt(f),
            Self::RestError(e) => write!(f, "rest api error: {}", e.message),
            Self::InvalidResponse(e) => e.fmt(f),
            Self::Voice(e) => write!(f, "cannot join the voice channel: {}", e),
            Self::NotConnected => write!(f, "lavalink isn't connected"),
        }
    }
}

impl std::error::Error for Error {}

impl From<Error> for node::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::NotConnected => Self::Unavailable,
            e => Self::Operation(e.to_string()),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Where and how to reach a Lavalink server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// `host:port` of the server.
    pub host: String,
    pub password: String,
    pub tls: bool,
}

/// Connection to a Lavalink server.
pub struct Lavalink {
    http_client: Client,
    node: NodeInfo,
    user_id: UserId,
    session_id: RwLock<Option<String>>,
    voice_manager: Arc<Songbird>,
    connections: DashMap<GuildId, ConnectionInfo>,
}

impl Lavalink {
    /// Connects to Lavalink and waits for its ready message, events are sent to `events` from then on.
    ///
    /// The websocket is reconnected in the background whenever it drops.
    pub async fn connect(
        node: NodeInfo,
        user_id: UserId,
        voice_manager: Arc<Songbird>,
        events: UnboundedSender<NodeEvent>,
        timeout: Duration,
    ) -> Result<Arc<Self>> {
        let http_client = http_client(&node.password)?;

        let lavalink = Arc::new(Self {
            session_id: RwLock::new(None),
            connections: DashMap::new(),
            http_client,
            node,
            user_id,
            voice_manager,
        });

        let stream = lavalink.open_socket(None).await?;
        let (sender, receiver) = oneshot::channel();
        let handle = spawn(lavalink.clone().run(stream, events, sender));

        select! {
            _ = sleep(timeout) => {
                handle.abort();
                Err(Error::NotConnected)
            }
            msg = receiver => {
                if msg.is_err() {
                    handle.abort();
                    return Err(Error::NotConnected);
                }

                Ok(lavalink)
            }
        }
    }

    fn rest_uri(&self, path: &str) -> String {
        format!(
            "{}://{}/v4/{}",
            match self.node.tls {
                true => "https",
                false => "http",
            },
            self.node.host,
            path
        )
    }

    fn session_id(&self) -> Result<String> {
        self.session_id
            .read()
            .ok()
            .and_then(|id| id.clone())
            .ok_or(Error::NotConnected)
    }

    fn set_session_id(&self, session_id: Option<String>) {
        match self.session_id.write() {
            Ok(mut guard) => *guard = session_id,
            Err(e) => error!("(set_session_id): session id lock poisoned: {}", e),
        }
    }

    async fn open_socket(&self, resume: Option<&str>) -> Result<WebSocketStream<ConnectStream>> {
        let uri = format!(
            "{}://{}/v4/websocket",
            match self.node.tls {
                true => "wss",
                false => "ws",
            },
            self.node.host
        );

        let mut request = uri.into_client_request().map_err(Error::WebSocket)?;
        let headers = request.headers_mut();

        headers.insert(
            "Authorization",
            HeaderValue::from_str(&self.node.password).map_err(Error::InvalidHeaderValue)?,
        );
        headers.insert(
            "User-Id",
            HeaderValue::from_str(&self.user_id.to_string()).map_err(Error::InvalidHeaderValue)?,
        );
        headers.insert("Client-Name", HeaderValue::from_static(CLIENT_NAME));

        if let Some(session_id) = resume {
            headers.insert(
                "Session-Id",
                HeaderValue::from_str(session_id).map_err(Error::InvalidHeaderValue)?,
            );
        }

        Ok(connect_async(request).await.map_err(Error::WebSocket)?.0)
    }

    /// Reads the websocket until the event channel closes, reconnecting when needed.
    async fn run(
        self: Arc<Self>,
        mut stream: WebSocketStream<ConnectStream>,
        events: UnboundedSender<NodeEvent>,
        ready: oneshot::Sender<()>,
    ) {
        let mut ready = Some(ready);

        loop {
            let last_session = self.read_socket(&mut stream, &events, &mut ready).await;
            self.set_session_id(None);

            if events.is_closed() {
                info!("(run): event receiver dropped, closing lavalink connection");
                break;
            }

            warn!(
                "(run): lavalink disconnected, reconnecting in {} ms",
                RECONNECT_DELAY.as_millis()
            );

            stream = loop {
                sleep(RECONNECT_DELAY).await;

                match self.open_socket(last_session.as_deref()).await {
                    Ok(v) => break v,
                    Err(e) => warn!("(run): cannot reconnect to lavalink: {}", e),
                }
            };
        }
    }

    /// Handles messages until the socket closes, returning the session that was active.
    async fn read_socket(
        &self,
        stream: &mut WebSocketStream<ConnectStream>,
        events: &UnboundedSender<NodeEvent>,
        ready: &mut Option<oneshot::Sender<()>>,
    ) -> Option<String> {
        let mut session = None;

        while let Some(message) = stream.next().await {
            let message = match message {
                Ok(Message::Text(v)) => v,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!("(read_socket): websocket error: {}", e);
                    break;
                }
            };

            match parse_message(&message) {
                Ok(Incoming::Ready {
                    resumed,
                    session_id,
                }) => {
                    info!(
                        "(read_socket): lavalink ready with session {} (resumed: {})",
                        session_id, resumed
                    );

                    if let Err(e) = self.enable_resuming(&session_id).await {
                        warn!("(read_socket): cannot enable session resuming: {}", e);
                    }

                    self.set_session_id(Some(session_id.clone()));
                    session = Some(session_id);

                    if let Some(sender) = ready.take() {
                        _ = sender.send(());
                    }
                }
                Ok(Incoming::Event(event)) => {
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Ok(Incoming::Ignored) => (),
                Err(e) => warn!("(read_socket): cannot parse message: {}", e),
            }
        }

        session
    }

    async fn enable_resuming(&self, session_id: &str) -> Result<()> {
        let request = self
            .http_client
            .patch(self.rest_uri(&format!("sessions/{}", session_id)))
            .json(&UpdateSession {
                resuming: true,
                timeout: RESUME_TIMEOUT,
            });

        send_request::<serde_json::Value>(request).await.map(|_| ())
    }

    pub async fn load_tracks(&self, identifier: &str) -> Result<LoadResult> {
        let request = self
            .http_client
            .get(self.rest_uri("loadtracks"))
            .query(&[("identifier", identifier)]);

        send_request(request).await
    }

    pub async fn update_player(&self, guild_id: GuildId, player: &UpdatePlayer) -> Result<Player> {
        let session_id = self.session_id()?;
        let request = self
            .http_client
            .patch(self.rest_uri(&format!("sessions/{}/players/{}", session_id, guild_id)))
            .json(player);

        send_request(request).await
    }

    pub async fn get_player(&self, guild_id: GuildId) -> Result<Player> {
        let session_id = self.session_id()?;
        let request = self
            .http_client
            .get(self.rest_uri(&format!("sessions/{}/players/{}", session_id, guild_id)));

        send_request(request).await
    }

    pub async fn destroy_player(&self, guild_id: GuildId) -> Result<()> {
        let session_id = self.session_id()?;
        let response = self
            .http_client
            .delete(self.rest_uri(&format!("sessions/{}/players/{}", session_id, guild_id)))
            .send()
            .await
            .map_err(Error::Reqwest)?;

        if response.status().is_success() {
            return Ok(());
        }

        let body = response.bytes().await.map_err(Error::Reqwest)?;
        Err(parse_error(&body))
    }

    async fn update(&self, guild_id: GuildId, build: impl FnOnce(&mut UpdatePlayer)) -> node::Result<()> {
        let mut player = UpdatePlayer::new();
        build(&mut player);

        self.update_player(guild_id, &player).await?;
        Ok(())
    }
}

/// HTTP client sending the password on every request.
fn http_client(password: &str) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        "Authorization",
        reqwest::header::HeaderValue::from_str(password).map_err(Error::InvalidRequestHeader)?,
    );

    Client::builder()
        .default_headers(headers)
        .user_agent(CLIENT_NAME)
        .build()
        .map_err(Error::Reqwest)
}

async fn send_request<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(Error::Reqwest)?
        .bytes()
        .await
        .map_err(Error::Reqwest)?;

    parse_response(&response)
}

fn parse_error(response: &[u8]) -> Error {
    match serde_json::from_slice::<ErrorResponse>(response) {
        Ok(v) => Error::RestError(v),
        Err(e) => Error::InvalidResponse(e),
    }
}

fn parse_response<T: DeserializeOwned>(response: &[u8]) -> Result<T> {
    serde_json::from_slice::<T>(response).map_err(|_| parse_error(response))
}

fn is_url(query: &str) -> bool {
    query.starts_with("https://") || query.starts_with("http://")
}

#[async_trait]
impl AudioNode for Lavalink {
    fn is_available(&self) -> bool {
        self.session_id().is_ok()
    }

    async fn search(&self, query: &str, source: SearchSource) -> node::Result<Vec<Track>> {
        let identifier = if is_url(query) {
            query.to_owned()
        } else {
            format!("{}:{}", source.prefix(), query)
        };

        debug!("(search): loading {}", identifier);

        let result = self.load_tracks(&identifier).await?;

        if let LoadResult::Error(exception) = &result {
            warn!(
                "(search): lavalink failed to load {}: {}",
                identifier,
                exception.message.as_deref().unwrap_or(&exception.cause)
            );
        }

        Ok(result.into_tracks().into_iter().map(Track::from).collect())
    }

    async fn connect(&self, guild_id: GuildId, channel: VoiceChannel) -> node::Result<VoiceConnection> {
        let (info, _) = self
            .voice_manager
            .join_gateway(guild_id, channel.id)
            .await
            .map_err(Error::Voice)?;

        let voice = VoiceState {
            token: info.token.clone(),
            endpoint: info.endpoint.clone(),
            session_id: info.session_id.clone(),
        };

        if let Err(e) = self.update(guild_id, |p| {
            p.voice_state(voice);
        })
        .await
        {
            if let Err(e) = self.voice_manager.remove(guild_id).await {
                warn!("(connect): cannot leave the voice channel: {}", e);
            }

            return Err(e);
        }

        self.connections.insert(guild_id, info);

        Ok(VoiceConnection { guild_id, channel })
    }

    async fn disconnect(&self, connection: &VoiceConnection) -> node::Result<()> {
        let guild_id = connection.guild_id;
        let destroyed = self.destroy_player(guild_id).await;

        self.connections.remove(&guild_id);

        if let Err(e) = self.voice_manager.remove(guild_id).await {
            warn!("(disconnect): cannot leave the voice channel: {}", e);
        }

        Ok(destroyed?)
    }

    async fn play(&self, connection: &VoiceConnection, track: &Track) -> node::Result<()> {
        let voice = self.connections.get(&connection.guild_id).map(|info| VoiceState {
            token: info.token.clone(),
            endpoint: info.endpoint.clone(),
            session_id: info.session_id.clone(),
        });

        self.update(connection.guild_id, |p| {
            p.encoded_track(Some(track.encoded.clone())).paused(false);

            // Recreates the player if Lavalink lost it.
            if let Some(voice) = voice {
                p.voice_state(voice);
            }
        })
        .await
    }

    async fn pause(&self, connection: &VoiceConnection) -> node::Result<()> {
        self.update(connection.guild_id, |p| {
            p.paused(true);
        })
        .await
    }

    async fn resume(&self, connection: &VoiceConnection) -> node::Result<()> {
        self.update(connection.guild_id, |p| {
            p.paused(false);
        })
        .await
    }

    async fn stop(&self, connection: &VoiceConnection) -> node::Result<()> {
        self.update(connection.guild_id, |p| {
            p.encoded_track(None);
        })
        .await
    }

    async fn seek(&self, connection: &VoiceConnection, position: Duration) -> node::Result<()> {
        let position = u64::try_from(position.as_millis()).unwrap_or(u64::MAX);

        self.update(connection.guild_id, |p| {
            p.position(position);
        })
        .await
    }

    async fn set_volume(&self, connection: &VoiceConnection, volume: u8) -> node::Result<()> {
        self.update(connection.guild_id, |p| {
            p.volume(volume.into());
        })
        .await
    }

    async fn position(&self, connection: &VoiceConnection) -> node::Result<Duration> {
        let player = self.get_player(connection.guild_id).await?;

        Ok(Duration::from_millis(player.state.position))
    }
}
