//! TalkingBot // Registry
//!
//! Map of the guilds with an audio session. Each session lives behind its own lock so guilds never wait on each other.

use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use dashmap::DashMap;
use serenity::all::GuildId;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::session::GuildAudioSession;

/// Exclusive access to a registered session, released on drop.
pub struct SessionGuard(OwnedMutexGuard<GuildAudioSession>);

impl Deref for SessionGuard {
    type Target = GuildAudioSession;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Owns every [`GuildAudioSession`], at most one per guild.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<Mutex<GuildAudioSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_registered(&self, guild_id: GuildId, session: &Arc<Mutex<GuildAudioSession>>) -> bool {
        self.sessions
            .get(&guild_id)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), session))
    }

    /// Waits for the lock of the guild's session, if one exists.
    pub async fn acquire(&self, guild_id: GuildId) -> Option<SessionGuard> {
        loop {
            let session = self.sessions.get(&guild_id)?.value().clone();
            let guard = session.lock_owned().await;

            // The session may have been removed while we were waiting for it.
            if self.is_registered(guild_id, OwnedMutexGuard::mutex(&guard)) {
                return Some(SessionGuard(guard));
            }

            debug!("(acquire): session of {} was replaced, retrying", guild_id);
        }
    }

    /// Waits for the lock of the guild's session, creating it first if needed.
    pub async fn acquire_or_create(&self, guild_id: GuildId) -> SessionGuard {
        loop {
            let session = self
                .sessions
                .entry(guild_id)
                .or_insert_with(|| Arc::new(Mutex::new(GuildAudioSession::new(guild_id))))
                .value()
                .clone();
            let guard = session.lock_owned().await;

            if self.is_registered(guild_id, OwnedMutexGuard::mutex(&guard)) {
                return SessionGuard(guard);
            }

            debug!("(acquire_or_create): session of {} was replaced, retrying", guild_id);
        }
    }

    /// Unregisters the session held by `guard`, returns false if it was already replaced.
    pub fn remove(&self, guard: &SessionGuard) -> bool {
        let guild_id = guard.guild_id();
        let session = OwnedMutexGuard::mutex(&guard.0);

        self.sessions
            .remove_if(&guild_id, |_, registered| Arc::ptr_eq(registered, session))
            .is_some()
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
