use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::app::{Frame, FrameSource};
use crate::config::CameraConfig;
use crate::error::{BoxError, SessionError, CAMERA_ACCESS_MESSAGE};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Drop the pending bytes if a frame grows past this without ending.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Splits a concatenated MJPEG byte stream into individual JPEG images.
#[derive(Debug, Default)]
pub struct JpegSplitter {
    pending: Vec<u8>,
}

impl JpegSplitter {
    /// Feed a chunk; returns every frame completed by it, oldest first.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            let Some(start) = find(&self.pending, &SOI, 0) else {
                // Keep a trailing 0xFF, it may be the first half of a marker.
                let keep = usize::from(self.pending.last() == Some(&0xFF));
                let cut = self.pending.len() - keep;
                self.pending.drain(..cut);
                break;
            };
            self.pending.drain(..start);

            match find(&self.pending, &EOI, SOI.len()) {
                Some(end) => {
                    let frame: Vec<u8> = self.pending.drain(..end + EOI.len()).collect();
                    frames.push(frame);
                }
                None => {
                    if self.pending.len() > MAX_FRAME_BYTES {
                        log::warn!(
                            "Discarding {} bytes without a JPEG end marker",
                            self.pending.len()
                        );
                        self.pending.clear();
                    }
                    break;
                }
            }
        }

        frames
    }
}

fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(2)
        .position(|w| w == needle)
        .map(|i| i + from)
}

/// Camera read through an `ffmpeg` child process emitting MJPEG on stdout.
///
/// A reader thread keeps only the most recent frame, so `capture_frame`
/// never blocks. The process is killed when the camera is dropped.
pub struct FfmpegCamera {
    config: CameraConfig,
    latest: Arc<Mutex<Option<Frame>>>,
    child: Mutex<Option<Child>>,
}

impl FfmpegCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            latest: Arc::new(Mutex::new(None)),
            child: Mutex::new(None),
        }
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            self.config.input_format.clone(),
            "-i".into(),
            self.config.device.clone(),
            "-vf".into(),
            format!("fps={}", self.config.fps.max(1)),
            "-f".into(),
            "image2pipe".into(),
            "-vcodec".into(),
            "mjpeg".into(),
            "-q:v".into(),
            "5".into(),
            "-".into(),
        ]
    }

    /// Start ffmpeg and the reader thread. The receiver fires on the first frame.
    fn start(&self) -> Result<oneshot::Receiver<()>, BoxError> {
        let program = &self.config.program;
        log::info!("Opening camera {} via {program}", self.config.device);

        let mut child = Command::new(program)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| format!("Failed to spawn {program}: {e}"))?;

        let stdout = child.stdout.take().ok_or("ffmpeg stdout not captured")?;
        if let Ok(mut slot) = self.child.lock() {
            *slot = Some(child);
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let latest = self.latest.clone();
        std::thread::Builder::new()
            .name("camera-reader".into())
            .spawn(move || read_frames(stdout, latest, ready_tx))?;

        Ok(ready_rx)
    }

    fn stop(&self) {
        let child = self.child.lock().ok().and_then(|mut slot| slot.take());
        if let Some(mut child) = child {
            log::info!("Releasing camera");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn read_frames(
    mut stdout: ChildStdout,
    latest: Arc<Mutex<Option<Frame>>>,
    ready: oneshot::Sender<()>,
) {
    let mut ready = Some(ready);
    let mut splitter = JpegSplitter::default();
    let mut chunk = vec![0u8; 64 * 1024];

    loop {
        match stdout.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                if let Some(frame) = splitter.push(&chunk[..n]).pop() {
                    if let Ok(mut slot) = latest.lock() {
                        *slot = Some(Frame::jpeg(frame));
                    }
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(());
                    }
                }
            }
            Err(e) => {
                log::error!("Camera read error: {e}");
                break;
            }
        }
    }

    log::warn!("Camera stream ended");
    if let Ok(mut slot) = latest.lock() {
        *slot = None;
    }
}

#[async_trait]
impl FrameSource for FfmpegCamera {
    async fn initialize(&self) -> Result<(), SessionError> {
        let failed = || SessionError::CameraInitFailed(CAMERA_ACCESS_MESSAGE.to_string());

        let first_frame = self.start().map_err(|e| {
            log::error!("Error accessing camera: {e}");
            failed()
        })?;

        let timeout = Duration::from_millis(self.config.startup_timeout_ms);
        match tokio::time::timeout(timeout, first_frame).await {
            Ok(Ok(())) => {
                log::info!("Camera streaming");
                Ok(())
            }
            Ok(Err(_)) => {
                log::error!("Camera stream ended before the first frame");
                self.stop();
                Err(failed())
            }
            Err(_) => {
                log::error!("No camera frame within {timeout:?}");
                self.stop();
                Err(failed())
            }
        }
    }

    fn capture_frame(&self) -> Option<Frame> {
        self.latest.lock().ok()?.clone()
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        self.stop();
    }
}
