//! TalkingBot // Dispatcher
//!
//! Routes the events emitted by the audio node to the guild sessions.
//!
//! Events are routed to one worker task per guild, so the events of a guild are handled in emission order while different guilds are handled in parallel. Each event is applied while holding the session's lock, which serializes it with the commands of the same guild.

use std::{
    collections::HashMap,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use futures::FutureExt;
use serenity::all::GuildId;
use tokio::{
    select,
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    node::{NodeClient, NodeEvent},
    registry::SessionRegistry,
    session::EventOutcome,
};

/// Handle of the running dispatcher.
pub struct AudioEventDispatcher {
    shutdown: oneshot::Sender<()>,
    router: JoinHandle<()>,
    workers: Arc<AtomicUsize>,
}

impl AudioEventDispatcher {
    /// Starts consuming `events`.
    pub fn spawn(
        registry: Arc<SessionRegistry>,
        node: NodeClient,
        events: UnboundedReceiver<NodeEvent>,
    ) -> Self {
        let (shutdown, shutdown_receiver) = oneshot::channel();
        let workers = Arc::new(AtomicUsize::new(0));
        let router = tokio::spawn(route(
            registry,
            node,
            events,
            shutdown_receiver,
            workers.clone(),
        ));

        Self {
            shutdown,
            router,
            workers,
        }
    }

    /// Number of guilds with a running worker.
    pub fn workers(&self) -> usize {
        self.workers.load(Ordering::Relaxed)
    }

    /// Stops routing new events and waits for the router to exit.
    ///
    /// Workers finish the events they already received.
    pub async fn shutdown(self) {
        _ = self.shutdown.send(());

        if let Err(e) = self.router.await {
            error!("(shutdown): dispatcher router failed: {}", e);
        }
    }
}

/// Router side of a guild worker.
struct Worker {
    id: u64,
    sender: UnboundedSender<NodeEvent>,

    /// Events sent to the worker so far.
    sent: u64,
}

/// Sent by a worker that found no session after handling its `processed`-th event.
struct Idle {
    guild_id: GuildId,
    worker: u64,
    processed: u64,
}

async fn route(
    registry: Arc<SessionRegistry>,
    node: NodeClient,
    mut events: UnboundedReceiver<NodeEvent>,
    mut shutdown: oneshot::Receiver<()>,
    active: Arc<AtomicUsize>,
) {
    let mut workers = HashMap::<GuildId, Worker>::new();
    let (idle_sender, mut idle_receiver) = unbounded_channel::<Idle>();
    let mut next_id = 0;

    loop {
        let event = select! {
            _ = &mut shutdown => break,
            Some(idle) = idle_receiver.recv() => {
                // A worker is only dropped once it has handled everything it was sent.
                let retire = workers.get(&idle.guild_id).is_some_and(|worker| {
                    worker.id == idle.worker
                        && worker.sent == idle.processed
                        && !registry.contains(idle.guild_id)
                });

                if retire {
                    workers.remove(&idle.guild_id);
                    active.store(workers.len(), Ordering::Relaxed);
                    debug!("(route): worker of {} retired", idle.guild_id);
                }

                continue;
            }
            event = events.recv() => match event {
                Some(v) => v,
                None => break,
            },
        };

        let guild_id = event.guild_id();
        let worker = workers.entry(guild_id).or_insert_with(|| {
            next_id += 1;
            Worker {
                id: next_id,
                sender: spawn_worker(guild_id, next_id, &registry, &node, &idle_sender),
                sent: 0,
            }
        });

        if let Err(e) = worker.sender.send(event) {
            warn!("(route): worker of {} is gone, restarting it", guild_id);

            next_id += 1;
            *worker = Worker {
                id: next_id,
                sender: spawn_worker(guild_id, next_id, &registry, &node, &idle_sender),
                sent: 0,
            };
            _ = worker.sender.send(e.0);
        }

        worker.sent += 1;
        active.store(workers.len(), Ordering::Relaxed);
    }

    info!("(route): dispatcher stopped");
}

fn spawn_worker(
    guild_id: GuildId,
    id: u64,
    registry: &Arc<SessionRegistry>,
    node: &NodeClient,
    idle: &UnboundedSender<Idle>,
) -> UnboundedSender<NodeEvent> {
    let (sender, mut receiver) = unbounded_channel::<NodeEvent>();
    let (registry, node, idle) = (registry.clone(), node.clone(), idle.clone());

    tokio::spawn(async move {
        let mut processed = 0;

        while let Some(event) = receiver.recv().await {
            let handled = AssertUnwindSafe(handle_event(&registry, &node, event))
                .catch_unwind()
                .await;

            if handled.is_err() {
                error!("(worker): handling an event of {} panicked", guild_id);
            }

            processed += 1;

            if !registry.contains(guild_id) {
                _ = idle.send(Idle {
                    guild_id,
                    worker: id,
                    processed,
                });
            }
        }
    });

    sender
}

/// Applies a single event to its guild's session.
///
/// Returns [`None`] when the event doesn't touch any session.
pub async fn handle_event(
    registry: &SessionRegistry,
    node: &NodeClient,
    event: NodeEvent,
) -> Option<EventOutcome> {
    let guild_id = event.guild_id();

    let outcome = match event {
        NodeEvent::SocketClosed {
            code,
            reason,
            by_remote,
            ..
        } => {
            warn!(
                "(handle_event): voice socket of {} closed with {} ({}), by remote: {}",
                guild_id, code, reason, by_remote
            );
            return None;
        }
        NodeEvent::TrackEnd { track, reason, .. } => {
            let Some(mut session) = registry.acquire(guild_id).await else {
                debug!("(handle_event): no session for {}", guild_id);
                return None;
            };

            session.on_track_end(node, &track, reason).await
        }
        NodeEvent::TrackStuck {
            track, threshold, ..
        } => {
            warn!(
                "(handle_event): {} got stuck for {} ms in {}",
                track.title,
                threshold.as_millis(),
                guild_id
            );

            let mut session = registry.acquire(guild_id).await?;
            session.on_track_failed(node, &track).await
        }
        NodeEvent::TrackException { track, message, .. } => {
            warn!(
                "(handle_event): {} raised an exception in {}: {}",
                track.title, guild_id, message
            );

            let mut session = registry.acquire(guild_id).await?;
            session.on_track_failed(node, &track).await
        }
    };

    match &outcome {
        EventOutcome::Ignored => debug!("(handle_event): stale event ignored in {}", guild_id),
        EventOutcome::Failed(e) => {
            error!("(handle_event): cannot start the next track in {}: {}", guild_id, e)
        }
        outcome => debug!("(handle_event): {:?} in {}", outcome, guild_id),
    }

    Some(outcome)
}
