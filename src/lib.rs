//! Camera-to-speech assistant for visually impaired users.
//!
//! A frame is captured, sent with an instruction to a vision-language model,
//! and the answer is spoken aloud. [`app::SessionController`] sequences the
//! three collaborators ([`app::FrameSource`], [`app::InferenceClient`],
//! [`app::VoiceIo`]) as a single-flight, cancellable session. The remaining
//! modules are the desktop implementations of those collaborators.

pub mod app;
pub mod audio_feedback;
pub mod camera;
pub mod config;
pub mod error;
pub mod recorder;
pub mod speech;
pub mod transcriber;
pub mod vision;
