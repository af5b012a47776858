//! Session hub: one actor task per game.
//!
//! Each session runs in its own Tokio task that owns a [`Pipeline`] and
//! reads frames from a bounded mpsc channel. Frames for one game are
//! therefore processed strictly in the order they were queued, while
//! different games proceed concurrently with no shared mutable state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tabletalk_dispatch::Dispatcher;
use tabletalk_protocol::{Decoder, GameId, SchemaRegistry};
use tabletalk_session::{LifecycleState, SessionInfo};
use tokio::sync::{mpsc, oneshot};

use crate::{HubError, Outcome, Pipeline, PipelineConfig};

/// Builds the dispatcher for a newly opened session.
pub type DispatcherFactory = Box<dyn Fn(&GameId) -> Dispatcher + Send + Sync>;

/// Commands sent to a session actor through its channel.
///
/// The `oneshot::Sender` in some variants is the reply channel.
enum SessionCommand {
    /// Process a frame and report the outcome.
    Ingest {
        frame: Vec<u8>,
        reply: oneshot::Sender<Outcome>,
    },

    /// Process a frame without waiting for the outcome.
    Push { frame: Vec<u8> },

    /// Request a session snapshot.
    GetInfo {
        reply: oneshot::Sender<Option<SessionInfo>>,
    },

    /// Tear the session down and stop the actor.
    Close {
        reply: oneshot::Sender<Option<SessionInfo>>,
    },

    /// Stop the actor if no session was ever opened. Replies whether it
    /// stopped.
    Release { reply: oneshot::Sender<bool> },
}

/// Handle to a running session actor.
///
/// Cheap to clone; it wraps an `mpsc::Sender`. Clones can submit from
/// different tasks, and their frames are queued in arrival order.
#[derive(Clone)]
pub struct SessionHandle {
    game_id: GameId,
    sender: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    /// Queues a frame and waits for its outcome.
    pub async fn submit(&self, frame: Vec<u8>) -> Result<Outcome, HubError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Ingest {
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| self.closed())?;
        reply_rx.await.map_err(|_| self.closed())
    }

    /// Queues a frame (fire-and-forget). Outcomes still reach the
    /// session's dispatcher.
    pub async fn push(&self, frame: Vec<u8>) -> Result<(), HubError> {
        self.sender
            .send(SessionCommand::Push { frame })
            .await
            .map_err(|_| self.closed())
    }

    pub async fn info(&self) -> Result<Option<SessionInfo>, HubError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::GetInfo { reply: reply_tx })
            .await
            .map_err(|_| self.closed())?;
        reply_rx.await.map_err(|_| self.closed())
    }

    /// Tears the session down; frames queued behind this are dropped.
    pub async fn close(&self) -> Result<Option<SessionInfo>, HubError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Close { reply: reply_tx })
            .await
            .map_err(|_| self.closed())?;
        reply_rx.await.map_err(|_| self.closed())
    }

    /// Stops the actor if its session was never opened.
    ///
    /// Returns `true` if the actor stopped. A session that is open or
    /// already torn down is left alone.
    pub async fn release(&self) -> Result<bool, HubError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Release { reply: reply_tx })
            .await
            .map_err(|_| self.closed())?;
        reply_rx.await.map_err(|_| self.closed())
    }

    /// Returns `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn closed(&self) -> HubError {
        HubError::Closed(self.game_id.clone())
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("game_id", &self.game_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The actor state. Runs inside a Tokio task.
struct SessionActor {
    game_id: GameId,
    pipeline: Pipeline,
    receiver: mpsc::Receiver<SessionCommand>,
}

impl SessionActor {
    /// Processes commands until the session is destroyed or closed.
    async fn run(mut self) {
        tracing::debug!(game_id = %self.game_id, "session actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                SessionCommand::Ingest { frame, reply } => {
                    let outcome = self.pipeline.ingest_frame(&frame);
                    let _ = reply.send(outcome);
                }
                SessionCommand::Push { frame } => {
                    let outcome = self.pipeline.ingest_frame(&frame);
                    if !outcome.is_accepted() {
                        tracing::debug!(
                            game_id = %self.game_id,
                            ?outcome,
                            "pushed frame not accepted"
                        );
                    }
                }
                SessionCommand::GetInfo { reply } => {
                    let _ = reply.send(self.pipeline.info());
                }
                SessionCommand::Close { reply } => {
                    let _ = reply.send(self.pipeline.close());
                    break;
                }
                SessionCommand::Release { reply } => {
                    let unopened = self.pipeline.is_waiting();
                    let _ = reply.send(unopened);
                    if unopened {
                        break;
                    }
                }
            }

            if self.pipeline.is_closed() {
                break;
            }
        }

        tracing::debug!(game_id = %self.game_id, "session actor stopped");
    }
}

/// Spawns a session actor and returns a handle to it.
///
/// `channel_size` bounds the queue; when it is full, submitters wait.
fn spawn_session(game_id: GameId, pipeline: Pipeline, channel_size: usize) -> SessionHandle {
    let (tx, rx) = mpsc::channel(channel_size.max(1));

    let actor = SessionActor {
        game_id: game_id.clone(),
        pipeline,
        receiver: rx,
    };
    tokio::spawn(actor.run());

    SessionHandle {
        game_id,
        sender: tx,
    }
}

/// Routes frames to per-game session actors, starting them on demand.
///
/// A game whose session was destroyed (everyone disconnected) or closed
/// stays closed: later frames for it return [`HubError::Closed`] and are
/// never applied, until [`Hub::forget`] drops the record. An actor whose
/// first submitted frame does not open a session is stopped and leaves
/// no record.
///
/// Must be used from within a Tokio runtime.
pub struct Hub {
    config: PipelineConfig,
    registry: Arc<SchemaRegistry>,
    factory: DispatcherFactory,
    sessions: HashMap<GameId, SessionHandle>,
    finished: HashSet<GameId>,
}

impl Hub {
    /// Creates a hub whose sessions log handler faults but have no
    /// handlers of their own.
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_dispatchers(config, |_: &GameId| Dispatcher::new())
    }

    /// Creates a hub that builds each session's dispatcher with `factory`.
    pub fn with_dispatchers<F>(config: PipelineConfig, factory: F) -> Self
    where
        F: Fn(&GameId) -> Dispatcher + Send + Sync + 'static,
    {
        Self {
            config,
            registry: Arc::new(SchemaRegistry::builtin()),
            factory: Box::new(factory),
            sessions: HashMap::new(),
            finished: HashSet::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the handle for `game_id`, starting its actor if needed.
    ///
    /// # Errors
    /// [`HubError::Closed`] if the game's session has already ended.
    pub fn handle(&mut self, game_id: &GameId) -> Result<SessionHandle, HubError> {
        self.prune();
        if self.finished.contains(game_id) {
            return Err(HubError::Closed(game_id.clone()));
        }
        if let Some(handle) = self.sessions.get(game_id) {
            return Ok(handle.clone());
        }

        let decoder = Decoder::new(Arc::clone(&self.registry), self.config.compat);
        let pipeline = Pipeline::new(
            decoder,
            self.config.lifecycle.clone(),
            (self.factory)(game_id),
        )
        .bind(game_id.clone());
        let handle = spawn_session(game_id.clone(), pipeline, self.config.channel_size);
        self.sessions.insert(game_id.clone(), handle.clone());
        tracing::info!(%game_id, "session actor spawned");
        Ok(handle)
    }

    /// Submits one frame for `game_id` and waits for its outcome.
    pub async fn submit(
        &mut self,
        game_id: &GameId,
        frame: impl Into<Vec<u8>>,
    ) -> Result<Outcome, HubError> {
        let handle = self.handle(game_id)?;
        match handle.submit(frame.into()).await {
            Ok(outcome) => {
                match &outcome {
                    Outcome::Accepted { transition, .. } => {
                        if transition.to == LifecycleState::Disconnected {
                            self.retire(game_id);
                        }
                    }
                    _ => self.release(game_id, &handle).await,
                }
                Ok(outcome)
            }
            Err(error) => {
                self.retire(game_id);
                Err(error)
            }
        }
    }

    /// Returns a snapshot of a running session (`None` until its
    /// `game_connect` has been accepted).
    pub async fn info(&self, game_id: &GameId) -> Result<Option<SessionInfo>, HubError> {
        match self.sessions.get(game_id) {
            Some(handle) => handle.info().await,
            None if self.finished.contains(game_id) => Err(HubError::Closed(game_id.clone())),
            None => Err(HubError::NotFound(game_id.clone())),
        }
    }

    /// Closes a running session and returns its final snapshot.
    pub async fn close(&mut self, game_id: &GameId) -> Result<Option<SessionInfo>, HubError> {
        let handle = self
            .sessions
            .get(game_id)
            .cloned()
            .ok_or_else(|| HubError::NotFound(game_id.clone()))?;
        self.retire(game_id);
        let info = handle.close().await?;
        tracing::info!(%game_id, "session closed by hub");
        Ok(info)
    }

    /// Closes every running session.
    pub async fn shutdown(&mut self) {
        for game_id in self.game_ids() {
            let _ = self.close(&game_id).await;
        }
    }

    /// Games with a running session actor, sorted.
    pub fn game_ids(&self) -> Vec<GameId> {
        let mut ids: Vec<GameId> = self
            .sessions
            .iter()
            .filter(|(_, handle)| !handle.is_closed())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn session_count(&self) -> usize {
        self.game_ids().len()
    }

    /// Returns `true` if the game's session has ended.
    pub fn is_finished(&self, game_id: &GameId) -> bool {
        self.finished.contains(game_id)
    }

    /// Drops the record of a finished game so its id can open a new
    /// session. Returns `false` if the game was not finished.
    pub fn forget(&mut self, game_id: &GameId) -> bool {
        let forgotten = self.finished.remove(game_id);
        if forgotten {
            tracing::debug!(%game_id, "finished game forgotten");
        }
        forgotten
    }

    pub fn finished_count(&self) -> usize {
        self.finished.len()
    }

    /// Stops an actor that was spawned for a frame that never opened
    /// its session. The game is not marked finished.
    async fn release(&mut self, game_id: &GameId, handle: &SessionHandle) {
        if let Ok(true) = handle.release().await {
            self.sessions.remove(game_id);
            tracing::debug!(%game_id, "unopened session actor released");
        }
    }

    fn retire(&mut self, game_id: &GameId) {
        self.sessions.remove(game_id);
        self.finished.insert(game_id.clone());
    }

    /// Drops handles whose actor stopped on its own (e.g. after a pushed
    /// final disconnect).
    fn prune(&mut self) {
        let stopped: Vec<GameId> = self
            .sessions
            .iter()
            .filter(|(_, handle)| handle.is_closed())
            .map(|(id, _)| id.clone())
            .collect();
        for game_id in stopped {
            self.retire(&game_id);
        }
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("config", &self.config)
            .field("sessions", &self.game_ids())
            .field("finished", &self.finished.len())
            .finish_non_exhaustive()
    }
}
