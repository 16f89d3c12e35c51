use thiserror::Error;

/// Shown when a collaborator fails without saying why.
pub const UNKNOWN_ERROR: &str = "Error desconocido";

/// Shown when the camera cannot be opened.
pub const CAMERA_ACCESS_MESSAGE: &str =
    "No se pudo acceder a la cámara. Por favor, verifica los permisos.";

/// Shown when the vision model cannot be reached or returns nothing usable.
pub const INFERENCE_MESSAGE: &str = "No se pudo obtener una respuesta del asistente de IA.";

/// Boxed error used inside the device and network adapters.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures surfaced to the user. `Display` is the text that is shown and spoken.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0}")]
    CameraInitFailed(String),

    #[error("No se pudo capturar la imagen de la cámara.")]
    FrameCaptureFailed,

    #[error("{}", inference_reason(.0))]
    InferenceFailed(Option<String>),

    /// Raised synchronously for `Converse`; never enters the `error` state.
    #[error("El reconocimiento de voz no está disponible en este equipo.")]
    VoiceUnsupported,
}

fn inference_reason(reason: &Option<String>) -> &str {
    match reason.as_deref().map(str::trim) {
        Some(r) if !r.is_empty() => r,
        _ => UNKNOWN_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_capture_message_is_spanish() {
        assert_eq!(
            SessionError::FrameCaptureFailed.to_string(),
            "No se pudo capturar la imagen de la cámara."
        );
    }

    #[test]
    fn inference_without_reason_falls_back() {
        assert_eq!(SessionError::InferenceFailed(None).to_string(), UNKNOWN_ERROR);
        assert_eq!(
            SessionError::InferenceFailed(Some("  ".into())).to_string(),
            UNKNOWN_ERROR
        );
    }

    #[test]
    fn inference_reason_is_passed_through() {
        let err = SessionError::InferenceFailed(Some(INFERENCE_MESSAGE.into()));
        assert_eq!(err.to_string(), INFERENCE_MESSAGE);
    }

    #[test]
    fn camera_reason_is_passed_through() {
        let err = SessionError::CameraInitFailed(CAMERA_ACCESS_MESSAGE.into());
        assert_eq!(err.to_string(), CAMERA_ACCESS_MESSAGE);
    }
}
