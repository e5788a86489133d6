//! Configuration parsing and management.

use std::{
    env, error,
    fmt::{self, Display, Formatter},
    fs::read_to_string,
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use serde::Deserialize;
use serenity::all::GuildId;
use tracing::{debug, warn};

use crate::{lavalink::NodeInfo, node::SearchSource};

#[cfg(windows)]
mod windows {
    //! Windows-specific configuration parsing and management.

    use std::{
        env,
        path::{Path, PathBuf},
    };

    /// The default configuration file path.
    pub fn default_config_file() -> PathBuf {
        Path::new(&env::var("APPDATA").unwrap_or("C:\\ProgramData".to_owned()))
            .join("TalkingBot\\Config.toml")
    }
}

#[cfg(windows)]
pub use windows::*;

#[cfg(unix)]
mod unix {
    //! Unix-specific configuration parsing and management.

    use std::{
        env,
        path::{Path, PathBuf},
    };

    /// The default configuration file path.
    pub fn default_config_file() -> PathBuf {
        Path::new(&env::var("XDG_CONFIG_HOME").unwrap_or("/etc".to_owned()))
            .join("talkingbot/config.toml")
    }
}

#[cfg(unix)]
pub use unix::*;

/// Default timeout of the calls made to the audio node, in milliseconds.
pub const DEFAULT_NODE_TIMEOUT: u64 = 5000;

/// Default time the bot stays alone in a voice channel, in seconds.
pub const DEFAULT_IDLE_TIMEOUT: u64 = 30;

/// The command line arguments.
#[derive(Debug, Parser, PartialEq, Eq, Clone)]
#[command(name = "TalkingBot", version, about, long_about = None)]
pub struct Args {
    /// Configuration file path.
    #[arg(short, long, help = "The configuration file path.", long_help = None)]
    pub config_file: Option<PathBuf>,
}

/// Errors that can occur while parsing the configuration file.
#[derive(Debug)]
pub enum LoadFileError {
    /// An I/O error occurred while reading the file.
    Io(io::Error),

    /// A TOML error occurred while parsing the file.
    Toml(toml::de::Error),
}

impl Display for LoadFileError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::Toml(err) => write!(f, "TOML error: {}", err),
        }
    }
}

impl error::Error for LoadFileError {}

/// Get the default Lavalink address.
fn default_lavalink_address() -> String {
    "127.0.0.1:2333".to_owned()
}

/// The default password for Lavalink.
fn default_lavalink_password() -> String {
    "youshallnotpass".to_owned()
}

/// Configuration of the Lavalink node.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LavalinkConfig {
    /// The address of the Lavalink server.
    #[serde(default = "default_lavalink_address")]
    pub address: String,
    /// The password of the Lavalink server.
    #[serde(default = "default_lavalink_password")]
    pub password: String,
    /// Whether to use TLS to connect to the Lavalink server.
    #[serde(default)]
    pub tls: bool,
}

impl Default for LavalinkConfig {
    fn default() -> Self {
        Self {
            address: default_lavalink_address(),
            password: default_lavalink_password(),
            tls: false,
        }
    }
}

impl From<&str> for LavalinkConfig {
    fn from(s: &str) -> Self {
        // Get the components from the string.
        let mut components = s.split(',');

        let address = components
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_owned())
            .unwrap_or(default_lavalink_address());

        let password = components
            .next()
            .map(|s| s.to_owned())
            .unwrap_or(default_lavalink_password());

        let tls = components
            .next()
            .map(|s| matches!(s.to_lowercase().as_str(), "true" | "yes" | "1" | "enabled"))
            .unwrap_or(false);

        Self {
            address,
            password,
            tls,
        }
    }
}

impl From<LavalinkConfig> for NodeInfo {
    fn from(config: LavalinkConfig) -> Self {
        Self {
            host: config.address,
            password: config.password,
            tls: config.tls,
        }
    }
}

/// The configuration of the bot.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// The token of the Discord bot.
    pub discord_token: Option<String>,
    /// The Lavalink configuration.
    pub lavalink: Option<LavalinkConfig>,
    /// Guilds where the commands are registered, globally if none.
    pub guilds: Option<Vec<u64>>,
    /// Timeout of the calls made to Lavalink, in milliseconds.
    pub node_timeout: Option<u64>,
    /// Time the bot stays alone in a voice channel, in seconds.
    pub idle_timeout: Option<u64>,
    /// Search backend used by default in `/play`.
    pub search_source: Option<String>,
}

impl Config {
    /// Parse the configuration from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadFileError> {
        let file_content = read_to_string(path).map_err(LoadFileError::Io)?;
        toml::de::from_str(&file_content).map_err(LoadFileError::Toml)
    }

    /// Overwrite configuration values that are empty with the ones from the environment.
    pub fn or_from_env(self) -> Self {
        self.or_from(|key| env::var(key).ok())
    }

    /// Overwrite configuration values that are empty with the ones returned by `lookup`.
    pub fn or_from(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let discord_token = self
            .discord_token
            .or_else(|| lookup("TALKINGBOT_DISCORD_TOKEN"));

        let lavalink = self
            .lavalink
            .or_else(|| lookup("TALKINGBOT_LAVALINK").map(|s| LavalinkConfig::from(s.as_str())));

        let guilds = self.guilds.or_else(|| {
            lookup("TALKINGBOT_GUILDS").map(|s| {
                s.split(',')
                    .filter_map(|id| match id.trim().parse::<u64>() {
                        Ok(v) => Some(v),
                        Err(e) => {
                            warn!("(or_from): ignoring invalid guild id {:?}: {}", id, e);
                            None
                        }
                    })
                    .collect()
            })
        });

        let node_timeout = self
            .node_timeout
            .or_else(|| lookup("TALKINGBOT_NODE_TIMEOUT").and_then(|s| s.trim().parse().ok()));

        let idle_timeout = self
            .idle_timeout
            .or_else(|| lookup("TALKINGBOT_IDLE_TIMEOUT").and_then(|s| s.trim().parse().ok()));

        let search_source = self
            .search_source
            .or_else(|| lookup("TALKINGBOT_SEARCH_SOURCE"));

        Self {
            discord_token,
            lavalink,
            guilds,
            node_timeout,
            idle_timeout,
            search_source,
        }
    }

    pub fn lavalink(&self) -> LavalinkConfig {
        self.lavalink.clone().unwrap_or_default()
    }

    /// Guilds where the commands are registered, empty means global registration.
    pub fn guilds(&self) -> Vec<GuildId> {
        self.guilds
            .iter()
            .flatten()
            .filter(|id| **id != 0)
            .map(|id| GuildId::new(*id))
            .collect()
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout.unwrap_or(DEFAULT_NODE_TIMEOUT))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT))
    }

    pub fn search_source(&self) -> SearchSource {
        match self.search_source.as_deref().map(str::parse::<SearchSource>) {
            Some(Ok(v)) => v,
            Some(Err(e)) => {
                warn!("(search_source): {}, using the default", e);
                SearchSource::default()
            }
            None => SearchSource::default(),
        }
    }
}

/// Try to load the configuration file, falling back to the environment.
pub fn load_configuration() -> Config {
    debug!("(load_configuration): searching for the configuration file...");
    let args = Args::parse();

    let config_file = args
        .config_file
        .or(env::var("TALKINGBOT_CONFIG_FILE").ok().map(PathBuf::from))
        .unwrap_or(default_config_file());

    debug!(
        "(load_configuration): loading the configuration file: {:?}",
        config_file
    );
    let config = match Config::from_file(config_file) {
        Ok(v) => v,
        Err(e) => {
            warn!(
                "(load_configuration): failed to load the configuration file: {}",
                e
            );
            Config::default()
        }
    };

    config.or_from_env()
}
