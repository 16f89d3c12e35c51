use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;

use super::collaborators::{FrameSource, InferenceClient, VoiceIo};
use super::intent::Intent;
use super::pipeline::dispatch_camera_init;
use super::state::{RequestCounter, RequestId, Session, SessionEvent, SessionNotice, Status};
use crate::config::{Config, PromptConfig};

/// The external subsystems the session drives.
#[derive(Clone)]
pub struct Collaborators {
    pub frames: Arc<dyn FrameSource>,
    pub inference: Arc<dyn InferenceClient>,
    pub voice: Arc<dyn VoiceIo>,
}

/// Tunables the state machine reads.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub prompts: PromptConfig,
    pub recovery_delay: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            prompts: config.prompts.clone(),
            recovery_delay: config.recovery_delay(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Cloneable entry point for UI controls.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    sender: async_channel::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn trigger(&self, intent: Intent) {
        self.send(SessionEvent::Trigger(intent));
    }

    pub fn cancel(&self) {
        self.send(SessionEvent::Cancel);
    }

    pub fn shutdown(&self) {
        self.send(SessionEvent::Shutdown);
    }

    fn send(&self, event: SessionEvent) {
        if self.sender.try_send(event).is_err() {
            log::warn!("Session controller has stopped, dropping event");
        }
    }
}

/// Owns the session and sequences capture, inference and speech.
///
/// All session mutation happens inside [`SessionController::handle_event`],
/// called from a single task. Collaborator work runs in spawned tasks that
/// report back through the event channel, tagged with their [`RequestId`].
pub struct SessionController {
    pub(super) session: Session,
    pub(super) collaborators: Collaborators,
    pub(super) settings: SessionSettings,
    pub(super) requests: RequestCounter,
    /// Spawned work belonging to the active run.
    pub(super) task: Option<AbortHandle>,
    pub(super) events_tx: async_channel::Sender<SessionEvent>,
    events_rx: async_channel::Receiver<SessionEvent>,
    notices: async_channel::Sender<SessionNotice>,
    camera_init: Option<AbortHandle>,
}

impl SessionController {
    pub fn new(
        collaborators: Collaborators,
        settings: SessionSettings,
    ) -> (Self, SessionHandle, async_channel::Receiver<SessionNotice>) {
        let (events_tx, events_rx) = async_channel::unbounded();
        let (notices, notices_rx) = async_channel::unbounded();

        let handle = SessionHandle {
            sender: events_tx.clone(),
        };
        let controller = Self {
            session: Session::new(),
            collaborators,
            settings,
            requests: RequestCounter::default(),
            task: None,
            events_tx,
            events_rx,
            notices,
            camera_init: None,
        };
        (controller, handle, notices_rx)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Initialize the camera, then process events until `Shutdown`.
    pub async fn run(mut self) {
        log::info!("Session starting");
        self.camera_init = Some(dispatch_camera_init(
            self.collaborators.frames.clone(),
            self.events_tx.clone(),
        ));

        while let Ok(event) = self.events_rx.recv().await {
            if matches!(event, SessionEvent::Shutdown) {
                break;
            }
            self.handle_event(event);
        }

        self.stop_all();
        log::info!("Session stopped");
    }

    /// Apply a transition and publish it.
    pub(super) fn transition(
        &mut self,
        status: Status,
        message: String,
        request: Option<RequestId>,
        intent: Option<Intent>,
    ) {
        log::debug!(
            "{:?} -> {status:?} (request={request:?}, intent={intent:?})",
            self.session.status()
        );
        self.session.set(status, message, request, intent);
        self.publish(SessionNotice::Changed(self.session.snapshot()));
    }

    pub(super) fn publish(&self, notice: SessionNotice) {
        let _ = self.notices.try_send(notice);
    }

    /// Replace the active run's task, aborting the previous one.
    pub(super) fn set_task(&mut self, task: Option<AbortHandle>) {
        if let Some(previous) = std::mem::replace(&mut self.task, task) {
            previous.abort();
        }
    }

    pub(super) fn stop_all(&mut self) {
        self.set_task(None);
        if let Some(init) = self.camera_init.take() {
            init.abort();
        }
        self.collaborators.voice.cancel_speech();
    }
}
