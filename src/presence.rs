//! TalkingBot // Presence
//!
//! Reacts to voice channel changes: leaves when the bot is disconnected and after staying alone for too long.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use serenity::all::GuildId;
use tokio::{spawn, task::JoinHandle, time::sleep};
use tracing::{debug, info};

use crate::manager::AudioManager;

/// Tracks the pending idle leaves of every guild.
#[derive(Clone)]
pub struct VoicePresence {
    manager: AudioManager,
    idle_timeout: Duration,
    leave_handles: Arc<DashMap<GuildId, JoinHandle<()>>>,
}

impl VoicePresence {
    pub fn new(manager: AudioManager, idle_timeout: Duration) -> Self {
        Self {
            manager,
            idle_timeout,
            leave_handles: Arc::new(DashMap::new()),
        }
    }

    /// The bot was removed from its voice channel.
    pub async fn bot_disconnected(&self, guild_id: GuildId) {
        self.cancel_leave(guild_id);

        if !self.manager.registry().contains(guild_id) {
            return;
        }

        info!("(bot_disconnected): removed from the voice channel in {}", guild_id);
        let response = self.manager.leave(guild_id).await;
        debug!("(bot_disconnected): {}", response.content());
    }

    /// Someone joined or left the bot's channel, `listeners` doesn't count the bot itself.
    pub fn listeners_changed(&self, guild_id: GuildId, listeners: usize) {
        if !self.manager.registry().contains(guild_id) {
            return;
        }

        if listeners == 0 {
            self.schedule_leave(guild_id);
        } else {
            self.cancel_leave(guild_id);
        }
    }

    /// Leaves the guild's voice channel after the idle timeout, unless cancelled.
    pub fn schedule_leave(&self, guild_id: GuildId) {
        self.leave_handles.entry(guild_id).or_insert_with(|| {
            debug!(
                "(schedule_leave): leaving {} in {} s",
                guild_id,
                self.idle_timeout.as_secs()
            );

            let presence = self.clone();
            spawn(async move {
                sleep(presence.idle_timeout).await;
                presence.leave_handles.remove(&guild_id);

                info!("(schedule_leave): alone for too long in {}, leaving", guild_id);
                let response = presence.manager.leave(guild_id).await;
                debug!("(schedule_leave): {}", response.content());
            })
        });
    }

    pub fn cancel_leave(&self, guild_id: GuildId) {
        if let Some((_, handle)) = self.leave_handles.remove(&guild_id) {
            debug!("(cancel_leave): leave of {} cancelled", guild_id);
            handle.abort();
        }
    }

    pub fn is_leave_scheduled(&self, guild_id: GuildId) -> bool {
        self.leave_handles.contains_key(&guild_id)
    }
}
