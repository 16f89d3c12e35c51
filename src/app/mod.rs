mod collaborators;
mod controller;
mod event_handler;
mod intent;
mod pipeline;
mod state;

pub use collaborators::{Frame, FrameSource, InferenceClient, VoiceIo};
pub use controller::{Collaborators, SessionController, SessionHandle, SessionSettings};
pub use intent::{instruction_for, Intent, PipelineRun};
pub use state::{RequestId, Session, SessionEvent, SessionNotice, Snapshot, Status};
