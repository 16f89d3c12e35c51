use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Gemini endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// Empty means "take it from the environment".
    pub api_key: String,
    pub model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash".into(),
        }
    }
}

/// Instruction templates sent along with the captured frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub read_text: String,
    pub describe_scene: String,
    /// `{question}` is replaced by the user's transcript.
    pub question: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            read_text: "Extrae y transcribe todo el texto visible en esta imagen, indicando su \
                        contenido y contexto si es posible. Lee el texto en voz alta y clara."
                .into(),
            describe_scene: "Describe detalladamente los objetos, personas y la escena que se \
                             ven en esta imagen, proporcionando contexto relevante para una \
                             persona con discapacidad visual."
                .into(),
            question: "Basado en la imagen, responde la siguiente pregunta: \"{question}\"".into(),
        }
    }
}

/// ffmpeg invocation used to read the camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub program: String,
    /// ffmpeg input format (`v4l2`, `avfoundation`, `dshow`).
    pub input_format: String,
    pub device: String,
    /// Frames per second pulled from the device.
    pub fps: u32,
    pub startup_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        #[cfg(target_os = "macos")]
        let (input_format, device) = ("avfoundation", "0");
        #[cfg(not(target_os = "macos"))]
        let (input_format, device) = ("v4l2", "/dev/video0");

        Self {
            program: "ffmpeg".into(),
            input_format: input_format.into(),
            device: device.into(),
            fps: 2,
            startup_timeout_ms: 10_000,
        }
    }
}

/// Text-to-speech command. The text is appended as the last argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        #[cfg(target_os = "macos")]
        let (program, args) = ("say", vec!["-v".to_string(), "Monica".to_string()]);
        #[cfg(not(target_os = "macos"))]
        let (program, args) = (
            "espeak-ng",
            vec!["-v".to_string(), "es".to_string(), "-s".to_string(), "160".to_string()],
        );

        Self {
            program: program.into(),
            args,
        }
    }
}

/// Voice capture and recognition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Whisper language code.
    pub language: String,
    /// Model file name under the models directory.
    pub model_file: String,
    /// RMS level above which a chunk counts as speech.
    pub speech_threshold: f32,
    /// Trailing silence that ends an utterance.
    pub silence_ms: u64,
    /// Give up if nothing is said within this window.
    pub no_speech_timeout_ms: u64,
    pub max_utterance_ms: u64,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            language: "es".into(),
            model_file: "ggml-base.bin".into(),
            speech_threshold: 0.02,
            silence_ms: 1_200,
            no_speech_timeout_ms: 6_000,
            max_utterance_ms: 15_000,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub prompts: PromptConfig,
    pub camera: CameraConfig,
    pub speech: SpeechConfig,
    pub listen: ListenConfig,
    /// Delay between the end of an error announcement and returning to ready.
    pub recovery_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini: GeminiConfig::default(),
            prompts: PromptConfig::default(),
            camera: CameraConfig::default(),
            speech: SpeechConfig::default(),
            listen: ListenConfig::default(),
            recovery_delay_ms: 2_000,
        }
    }
}

impl Config {
    /// Directory: ~/.config/sight-assist/
    fn dir() -> PathBuf {
        let mut p = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("sight-assist");
        p
    }

    fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from disk, returning defaults if file doesn't exist or is invalid.
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                log::warn!("Ignoring invalid config {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    /// The configured key, else `GEMINI_API_KEY`, else `API_KEY`.
    pub fn api_key(&self) -> String {
        if !self.gemini.api_key.is_empty() {
            return self.gemini.api_key.clone();
        }
        std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .unwrap_or_default()
    }

    pub fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery_delay_ms)
    }
}
