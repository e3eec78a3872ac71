//! # Preview Driver
//!
//! Async shell around a [`PreviewSession`]. A single task owns the session
//! and serializes every input to it:
//!
//! ```text
//!   PreviewHandle ──commands──┐
//!   completion stream ────────┤
//!   scheduler deadline ───────┼──> select! ──> PreviewSession
//!   regeneration / hydration ─┘                     │
//!       tasks (JoinSet)  <──── Regenerate/Hydrate ──┤
//!                                                   ↓
//!                                  broadcast<PreviewUpdate>
//! ```
//!
//! The session reads time as `std::time::Instant`; the driver takes it from
//! tokio's clock so paused-time tests stay deterministic.

use crate::collaborators::{PageHydrator, Regenerator, StreamMessage};
use crate::config::PreviewConfig;
use crate::errors::CollaboratorError;
use crate::handle::{PreviewHandle, PreviewUpdate, UserCommand};
use folio_engine::{
    EngineError, EpochId, HydrationRequest, NoticeLevel, PageContent, PageStub, PreviewSession,
    RegenerationRequest, SessionOutput,
};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Settled collaborator call
#[derive(Debug)]
enum TaskResult {
    Regenerated {
        epoch: EpochId,
        result: Result<Vec<PageStub>, CollaboratorError>,
    },
    Hydrated {
        epoch: EpochId,
        number: u32,
        result: Result<PageContent, CollaboratorError>,
    },
}

pub struct PreviewDriver<R, H> {
    session: PreviewSession,
    regenerator: Arc<R>,
    hydrator: Arc<H>,
    hydration_timeout: Duration,
    commands: mpsc::Receiver<UserCommand>,
    updates: broadcast::Sender<PreviewUpdate>,
    tasks: JoinSet<TaskResult>,
}

impl<R: Regenerator, H: PageHydrator> PreviewDriver<R, H> {
    pub fn new(config: &PreviewConfig, regenerator: R, hydrator: H) -> (Self, PreviewHandle) {
        let (command_tx, commands) = mpsc::channel(config.event_buffer);
        let (updates, _) = broadcast::channel(config.event_buffer);

        let driver = Self {
            session: PreviewSession::new(config.session_options()),
            regenerator: Arc::new(regenerator),
            hydrator: Arc::new(hydrator),
            hydration_timeout: config.hydration_timeout(),
            commands,
            updates: updates.clone(),
            tasks: JoinSet::new(),
        };

        (driver, PreviewHandle::new(command_tx, updates))
    }

    /// Spawn the driver on the current runtime, reading completion events
    /// from `stream`
    pub fn spawn<S>(
        config: &PreviewConfig,
        regenerator: R,
        hydrator: H,
        stream: S,
    ) -> (PreviewHandle, JoinHandle<()>)
    where
        S: Stream<Item = StreamMessage> + Send + 'static,
    {
        let (driver, handle) = Self::new(config, regenerator, hydrator);
        let task = tokio::spawn(driver.run(stream.boxed()));
        (handle, task)
    }

    /// Run until `Shutdown` or until every handle is dropped
    pub async fn run(mut self, mut stream: BoxStream<'static, StreamMessage>) {
        info!("Preview driver started");
        let mut stream_open = true;

        loop {
            let deadline = self.session.next_deadline().map(Instant::from_std);

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(UserCommand::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },

                message = stream.next(), if stream_open => match message {
                    Some(message) => self.on_stream_message(message),
                    None => {
                        debug!("Completion stream closed");
                        stream_open = false;
                    }
                },

                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.on_task_settled(joined)
                }

                _ = sleep_until(deadline) => {
                    let outputs = self.session.poll_timers(now());
                    self.emit(outputs);
                }
            }
        }

        self.tasks.abort_all();
        info!("Preview driver stopped");
    }

    fn on_command(&mut self, command: UserCommand) {
        let now = now();
        let outputs = match command {
            UserCommand::Start(initial) => self.session.start(initial, now),
            UserCommand::Edit { field, value } => self.session.on_user_edit(field, value, now),
            UserCommand::SelectItems(items) => self.session.on_item_selection_changed(items, now),
            UserCommand::ExtraFields { item_id, fields } => {
                self.session.on_item_extra_fields_changed(item_id, fields, now)
            }
            UserCommand::Reorder(sequence) => self
                .session
                .on_manual_reorder(sequence, now)
                .unwrap_or_else(rejected),
            UserCommand::DropCard {
                number,
                group,
                to_index,
            } => self
                .session
                .on_card_dropped(number, group, to_index, now)
                .unwrap_or_else(rejected),
            UserCommand::ForceRefresh => self.session.on_force_refresh(now),
            UserCommand::Navigate(target) => self.session.on_navigate(target),
            UserCommand::Shutdown => Vec::new(),
        };
        self.emit(outputs);
    }

    fn on_stream_message(&mut self, message: StreamMessage) {
        let outputs = match message {
            StreamMessage::Envelope(envelope) => self.session.on_stream_event(envelope),
            StreamMessage::Frame(frame) => self.session.on_stream_frame(&frame),
        };
        self.emit(outputs);
    }

    fn on_task_settled(&mut self, joined: Result<TaskResult, JoinError>) {
        let result = match joined {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Collaborator task aborted");
                return;
            }
        };

        let now = now();
        let outputs = match result {
            TaskResult::Regenerated {
                epoch,
                result: Ok(stubs),
            } => self.session.on_regeneration_accepted(epoch, stubs, now),
            TaskResult::Regenerated {
                epoch,
                result: Err(e),
            } => self
                .session
                .on_regeneration_failed(epoch, &EngineError::from(e), now),
            TaskResult::Hydrated {
                epoch,
                number,
                result,
            } => self
                .session
                .on_hydration_result(epoch, number, result.map_err(EngineError::from)),
        };
        self.emit(outputs);
    }

    /// Carry out commands and publish everything to observers
    fn emit(&mut self, outputs: Vec<SessionOutput>) {
        for output in outputs {
            match &output {
                SessionOutput::Regenerate(request) => self.spawn_regeneration(request.clone()),
                SessionOutput::Hydrate(request) => self.spawn_hydration(request.clone()),
                _ => {}
            }
            // No subscribers is fine
            let _ = self.updates.send(PreviewUpdate::new(output));
        }
    }

    fn spawn_regeneration(&mut self, request: RegenerationRequest) {
        let regenerator = Arc::clone(&self.regenerator);
        let epoch = request.epoch;
        debug!(%epoch, "Requesting regeneration");

        self.tasks.spawn(async move {
            let result = regenerator.regenerate(request).await;
            TaskResult::Regenerated { epoch, result }
        });
    }

    fn spawn_hydration(&mut self, request: HydrationRequest) {
        let hydrator = Arc::clone(&self.hydrator);
        let timeout = self.hydration_timeout;
        let (epoch, number) = (request.epoch, request.number);
        debug!(%epoch, number, purpose = ?request.purpose, "Requesting page content");

        self.tasks.spawn(async move {
            let result = match tokio::time::timeout(timeout, hydrator.hydrate(request)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(%epoch, number, "Page content fetch timed out");
                    Err(CollaboratorError::Timeout(timeout))
                }
            };
            TaskResult::Hydrated {
                epoch,
                number,
                result,
            }
        });
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn rejected(e: EngineError) -> Vec<SessionOutput> {
    warn!(error = %e, "Reorder rejected");
    vec![SessionOutput::Notification {
        level: NoticeLevel::Error,
        message: e.to_string(),
    }]
}
