use super::controller::SessionController;
use super::intent::{instruction_for, Intent, PipelineRun};
use super::pipeline::{dispatch_inference, dispatch_listen, dispatch_speech, schedule_recovery};
use super::state::{RequestId, SessionEvent, SessionNotice, Status};
use crate::error::SessionError;

impl SessionController {
    /// Handle one event. This is the session state machine.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Trigger(intent) => self.on_trigger(intent),
            SessionEvent::Cancel => self.cancel(),
            SessionEvent::CameraReady => {
                if self.session.status() == Status::Initializing {
                    log::info!("Camera ready");
                    self.transition(Status::Ready, String::new(), None, None);
                } else {
                    log::info!("Ignoring camera ready while status={:?}", self.session.status());
                }
            }
            SessionEvent::CameraFailed(err) => {
                if self.session.status() == Status::Initializing {
                    self.fail(err);
                } else {
                    log::info!("Ignoring camera failure while status={:?}", self.session.status());
                }
            }
            SessionEvent::ListenFinished {
                request,
                transcript,
            } => {
                if self.accepts(request, Status::Listening, "transcript") {
                    self.on_transcript(request, transcript);
                }
            }
            SessionEvent::InferenceFinished { request, result } => {
                if self.accepts(request, Status::Processing, "inference result") {
                    match result {
                        Ok(text) => self.on_answer(request, text),
                        Err(err) => self.fail(err),
                    }
                }
            }
            SessionEvent::SpeechFinished { request } => {
                if !self.session.is_current(request) {
                    log::info!("Dropping stale speech completion for {request}");
                    return;
                }
                match self.session.status() {
                    Status::Speaking => {
                        self.set_task(None);
                        let message = self.session.message().to_string();
                        self.transition(Status::Ready, message, None, None);
                    }
                    Status::Error => {
                        let delay = self.settings.recovery_delay;
                        log::info!("Error announced, recovering in {delay:?}");
                        let task = schedule_recovery(delay, request, self.events_tx.clone());
                        self.set_task(Some(task));
                    }
                    other => log::info!("Ignoring speech completion while status={other:?}"),
                }
            }
            SessionEvent::RecoveryElapsed { request } => {
                if self.accepts(request, Status::Error, "recovery timer") {
                    self.set_task(None);
                    let message = self.session.message().to_string();
                    self.transition(Status::Ready, message, None, None);
                }
            }
            SessionEvent::Shutdown => self.stop_all(),
        }
    }

    /// Cancel the active run if the session is busy; otherwise do nothing.
    pub fn cancel(&mut self) {
        if !self.session.is_busy() {
            log::debug!("Nothing to cancel while status={:?}", self.session.status());
            return;
        }
        log::info!(
            "Cancelling {:?} run {:?}",
            self.session.active_intent(),
            self.session.active_request()
        );
        self.set_task(None);
        self.collaborators.voice.cancel_speech();
        let message = self.session.message().to_string();
        self.transition(Status::Ready, message, None, None);
    }

    fn on_trigger(&mut self, intent: Intent) {
        let status = self.session.status();
        if status == Status::Ready {
            self.start_run(intent);
        } else if status.is_busy() {
            if intent == Intent::Converse || self.session.active_intent() == Some(intent) {
                self.cancel();
            } else {
                log::info!("Ignoring {intent:?} while status={status:?}");
            }
        } else {
            log::info!("Ignoring {intent:?} while status={status:?}");
        }
    }

    fn start_run(&mut self, intent: Intent) {
        if !intent.is_one_shot() {
            self.start_listening();
            return;
        }

        let request = self.requests.next();
        log::info!("Starting {intent:?} {request}");
        self.transition(Status::Capturing, String::new(), Some(request), Some(intent));

        let Some(frame) = self.collaborators.frames.capture_frame() else {
            self.fail(SessionError::FrameCaptureFailed);
            return;
        };

        self.transition(Status::Processing, String::new(), Some(request), Some(intent));
        let run = PipelineRun {
            intent,
            frame,
            instruction: instruction_for(&self.settings.prompts, intent, None),
            request,
        };
        self.begin_inference(run);
    }

    fn start_listening(&mut self) {
        if !self.collaborators.voice.recognition_available() {
            let message = SessionError::VoiceUnsupported.to_string();
            log::warn!("{message}");
            self.publish(SessionNotice::Alert(message));
            return;
        }

        let request = self.requests.next();
        log::info!("Listening for a question {request}");
        self.transition(
            Status::Listening,
            String::new(),
            Some(request),
            Some(Intent::Converse),
        );
        let task = dispatch_listen(
            self.collaborators.voice.clone(),
            request,
            self.events_tx.clone(),
        );
        self.set_task(Some(task));
    }

    fn on_transcript(&mut self, request: RequestId, transcript: Option<String>) {
        let question = transcript
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let Some(question) = question else {
            log::info!("No question heard, back to ready");
            self.set_task(None);
            let message = self.session.message().to_string();
            self.transition(Status::Ready, message, None, None);
            return;
        };

        log::info!("Question: {question}");
        self.transition(
            Status::Processing,
            format!("Analizando: \"{question}\""),
            Some(request),
            Some(Intent::Converse),
        );

        let Some(frame) = self.collaborators.frames.capture_frame() else {
            self.fail(SessionError::FrameCaptureFailed);
            return;
        };

        let run = PipelineRun {
            intent: Intent::Converse,
            frame,
            instruction: instruction_for(&self.settings.prompts, Intent::Converse, Some(&question)),
            request,
        };
        self.begin_inference(run);
    }

    fn begin_inference(&mut self, run: PipelineRun) {
        let task = dispatch_inference(
            self.collaborators.inference.clone(),
            run,
            self.events_tx.clone(),
        );
        self.set_task(Some(task));
    }

    fn on_answer(&mut self, request: RequestId, text: String) {
        let text = text.trim().to_string();
        log::info!("Answer for {request}: {text}");
        let intent = self.session.active_intent();
        self.transition(Status::Speaking, text.clone(), Some(request), intent);
        let task = dispatch_speech(
            self.collaborators.voice.clone(),
            request,
            text,
            self.events_tx.clone(),
        );
        self.set_task(Some(task));
    }

    /// Enter `error`, announce the failure, and recover once it has been spoken.
    fn fail(&mut self, err: SessionError) {
        let request = match self.session.active_request() {
            Some(request) => request,
            None => self.requests.next(),
        };
        let message = err.to_string();
        log::error!("Session error ({request}): {message}");

        self.transition(Status::Error, message.clone(), Some(request), None);
        let task = dispatch_speech(
            self.collaborators.voice.clone(),
            request,
            message,
            self.events_tx.clone(),
        );
        self.set_task(Some(task));
    }

    /// True if `request` is the active run and the session is in `expected`.
    fn accepts(&self, request: RequestId, expected: Status, what: &str) -> bool {
        if !self.session.is_current(request) {
            log::info!("Dropping stale {what} for {request}");
            return false;
        }
        let status = self.session.status();
        if status != expected {
            log::info!("Ignoring {what} while status={status:?}");
            return false;
        }
        true
    }
}
