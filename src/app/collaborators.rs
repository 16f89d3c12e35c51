use async_trait::async_trait;

use crate::error::SessionError;

/// A still frame, JPEG encoded.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame({} bytes)", self.bytes.len())
    }
}

/// Owns the camera device.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Acquire the device. Called once at startup.
    async fn initialize(&self) -> Result<(), SessionError>;

    /// Snapshot of the current frame, or `None` if no image is available.
    fn capture_frame(&self) -> Option<Frame>;
}

/// Remote vision-language model.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn query(&self, frame: Frame, instruction: String) -> Result<String, SessionError>;
}

/// Speech output and recognition.
#[async_trait]
pub trait VoiceIo: Send + Sync {
    /// Whether `listen` can work at all in this environment.
    fn recognition_available(&self) -> bool;

    /// Speak `text`, stopping whatever is playing first. Resolves once, when
    /// playback ends, fails, or is stopped by `cancel_speech`.
    async fn speak(&self, text: String);

    /// Stop the current utterance. Safe to call when nothing is playing.
    fn cancel_speech(&self);

    /// Capture one utterance. Recognition errors yield `None`.
    /// Dropping the future stops the capture.
    async fn listen(&self) -> Option<String>;
}
