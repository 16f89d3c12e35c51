//! Fake collaborators and a harness that runs a controller on the test runtime.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use sight_assist::app::{
    Collaborators, Frame, FrameSource, InferenceClient, SessionController, SessionHandle,
    SessionNotice, SessionSettings, Snapshot, Status, VoiceIo,
};
use sight_assist::error::SessionError;

pub const SPEECH_TIME: Duration = Duration::from_secs(1);

pub fn frame_x() -> Frame {
    Frame::jpeg(vec![0xFF, 0xD8, b'X', 0xFF, 0xD9])
}

pub struct FakeCamera {
    init: Mutex<Option<SessionError>>,
    frame: Mutex<Option<Frame>>,
    pub captures: AtomicUsize,
}

impl FakeCamera {
    pub fn with_frame(frame: Option<Frame>) -> Arc<Self> {
        Arc::new(Self {
            init: Mutex::new(None),
            frame: Mutex::new(frame),
            captures: AtomicUsize::new(0),
        })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        let camera = Self::with_frame(None);
        *camera.init.lock().unwrap() = Some(SessionError::CameraInitFailed(reason.into()));
        camera
    }
}

#[async_trait]
impl FrameSource for FakeCamera {
    async fn initialize(&self) -> Result<(), SessionError> {
        match self.init.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn capture_frame(&self) -> Option<Frame> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        self.frame.lock().unwrap().clone()
    }
}

/// Each query waits until the test answers it.
#[derive(Default)]
pub struct ScriptedModel {
    pending: Mutex<VecDeque<oneshot::Sender<Result<String, SessionError>>>>,
    pub instructions: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer the oldest outstanding query. Returns false if its caller is gone
    /// or no query shows up.
    pub async fn respond(&self, result: Result<String, SessionError>) -> bool {
        for _ in 0..1_000 {
            let next = self.pending.lock().unwrap().pop_front();
            if let Some(tx) = next {
                return tx.send(result).is_ok();
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        false
    }

    pub fn instructions(&self) -> Vec<String> {
        self.instructions.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceClient for ScriptedModel {
    async fn query(&self, _frame: Frame, instruction: String) -> Result<String, SessionError> {
        self.instructions.lock().unwrap().push(instruction);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().push_back(tx);
        rx.await
            .unwrap_or(Err(SessionError::InferenceFailed(None)))
    }
}

pub struct FakeVoice {
    available: bool,
    speech_time: Duration,
    pub spoken: Mutex<Vec<String>>,
    pub cancels: AtomicUsize,
    heard_tx: async_channel::Sender<Option<String>>,
    heard_rx: async_channel::Receiver<Option<String>>,
}

impl FakeVoice {
    pub fn new(available: bool) -> Arc<Self> {
        Self::with_speech_time(available, SPEECH_TIME)
    }

    pub fn with_speech_time(available: bool, speech_time: Duration) -> Arc<Self> {
        let (heard_tx, heard_rx) = async_channel::unbounded();
        Arc::new(Self {
            available,
            speech_time,
            spoken: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
            heard_tx,
            heard_rx,
        })
    }

    /// Result of the next `listen`.
    pub fn hear(&self, transcript: Option<&str>) {
        self.heard_tx
            .try_send(transcript.map(str::to_string))
            .unwrap();
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceIo for FakeVoice {
    fn recognition_available(&self) -> bool {
        self.available
    }

    async fn speak(&self, text: String) {
        self.spoken.lock().unwrap().push(text);
        tokio::time::sleep(self.speech_time).await;
    }

    fn cancel_speech(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    async fn listen(&self) -> Option<String> {
        self.heard_rx.recv().await.ok().flatten()
    }
}

pub struct Harness {
    pub handle: SessionHandle,
    pub notices: async_channel::Receiver<SessionNotice>,
    pub camera: Arc<FakeCamera>,
    pub model: Arc<ScriptedModel>,
    pub voice: Arc<FakeVoice>,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn start(
        camera: Arc<FakeCamera>,
        model: Arc<ScriptedModel>,
        voice: Arc<FakeVoice>,
    ) -> Self {
        let collaborators = Collaborators {
            frames: camera.clone(),
            inference: model.clone(),
            voice: voice.clone(),
        };
        let (controller, handle, notices) =
            SessionController::new(collaborators, SessionSettings::default());
        let task = tokio::spawn(controller.run());
        Self {
            handle,
            notices,
            camera,
            model,
            voice,
            task,
        }
    }

    /// Harness whose camera is ready with frame X, past the initial transition.
    pub async fn ready(voice: Arc<FakeVoice>) -> Self {
        let h = Self::start(FakeCamera::with_frame(Some(frame_x())), ScriptedModel::new(), voice);
        h.expect(Status::Ready).await;
        h
    }

    pub async fn next_notice(&self) -> SessionNotice {
        tokio::time::timeout(Duration::from_secs(120), self.notices.recv())
            .await
            .expect("timed out waiting for a notice")
            .expect("controller dropped its notice channel")
    }

    /// The next notice must be a change to `status`.
    pub async fn expect(&self, status: Status) -> Snapshot {
        match self.next_notice().await {
            SessionNotice::Changed(snapshot) => {
                assert_eq!(snapshot.status, status, "unexpected transition: {snapshot:?}");
                snapshot
            }
            other => panic!("expected {status:?}, got {other:?}"),
        }
    }

    /// Let all timers run and check nothing was published.
    pub async fn assert_quiet(&self) {
        tokio::time::sleep(Duration::from_secs(30)).await;
        if let Ok(notice) = self.notices.try_recv() {
            panic!("unexpected notice: {notice:?}");
        }
    }
}
