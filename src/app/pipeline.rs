use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;

use super::collaborators::{FrameSource, InferenceClient, VoiceIo};
use super::intent::PipelineRun;
use super::state::{RequestId, SessionEvent};

type EventSender = async_channel::Sender<SessionEvent>;

/// Acquire the camera and report the outcome.
pub fn dispatch_camera_init(frames: Arc<dyn FrameSource>, sender: EventSender) -> AbortHandle {
    tokio::spawn(async move {
        let event = match frames.initialize().await {
            Ok(()) => SessionEvent::CameraReady,
            Err(e) => SessionEvent::CameraFailed(e),
        };
        let _ = sender.send(event).await;
    })
    .abort_handle()
}

/// Send the run's frame and instruction to the vision model.
pub fn dispatch_inference(
    inference: Arc<dyn InferenceClient>,
    run: PipelineRun,
    sender: EventSender,
) -> AbortHandle {
    tokio::spawn(async move {
        let request = run.request;
        log::info!(
            "Querying model for {:?} {request} ({} bytes)",
            run.intent,
            run.frame.bytes().len()
        );
        let result = inference.query(run.frame, run.instruction).await;
        let _ = sender
            .send(SessionEvent::InferenceFinished { request, result })
            .await;
    })
    .abort_handle()
}

/// Speak `text` and report completion for `request`.
pub fn dispatch_speech(
    voice: Arc<dyn VoiceIo>,
    request: RequestId,
    text: String,
    sender: EventSender,
) -> AbortHandle {
    tokio::spawn(async move {
        voice.speak(text).await;
        let _ = sender.send(SessionEvent::SpeechFinished { request }).await;
    })
    .abort_handle()
}

/// Capture one spoken question.
pub fn dispatch_listen(
    voice: Arc<dyn VoiceIo>,
    request: RequestId,
    sender: EventSender,
) -> AbortHandle {
    tokio::spawn(async move {
        let transcript = voice.listen().await;
        let _ = sender
            .send(SessionEvent::ListenFinished {
                request,
                transcript,
            })
            .await;
    })
    .abort_handle()
}

/// Fire `RecoveryElapsed` after `delay`.
pub fn schedule_recovery(delay: Duration, request: RequestId, sender: EventSender) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = sender.send(SessionEvent::RecoveryElapsed { request }).await;
    })
    .abort_handle()
}
