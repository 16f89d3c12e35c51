use super::collaborators::Frame;
use super::state::RequestId;
use crate::config::PromptConfig;

/// A user-triggerable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    ReadText,
    DescribeScene,
    /// Asks a spoken question about the current frame.
    Converse,
}

impl Intent {
    /// One-shot intents capture immediately; `Converse` listens first.
    pub fn is_one_shot(self) -> bool {
        !matches!(self, Intent::Converse)
    }

    /// Button label.
    pub fn label(self) -> &'static str {
        match self {
            Intent::ReadText => "Leer Texto",
            Intent::DescribeScene => "Describir",
            Intent::Converse => "Preguntar",
        }
    }
}

/// Resolves the instruction sent with a frame.
///
/// `question` is only read for `Converse` and replaces `{question}` in the
/// template.
pub fn instruction_for(prompts: &PromptConfig, intent: Intent, question: Option<&str>) -> String {
    match intent {
        Intent::ReadText => prompts.read_text.clone(),
        Intent::DescribeScene => prompts.describe_scene.clone(),
        Intent::Converse => prompts
            .question
            .replace("{question}", question.unwrap_or_default()),
    }
}

/// One capture → inference → speech execution.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub intent: Intent,
    pub frame: Frame,
    pub instruction: String,
    pub request: RequestId,
}
