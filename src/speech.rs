use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::oneshot;
use whisper_rs::WhisperContext;

use crate::app::VoiceIo;
use crate::audio_feedback::{play_cue, Cue};
use crate::config::{ListenConfig, SpeechConfig};
use crate::recorder;
use crate::error::BoxError;

/// Raises the flag when dropped, stopping a blocking recording.
struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Whisper emits markers like `[BLANK_AUDIO]` or `(música)` for non-speech.
fn clean_transcript(raw: &str) -> Option<String> {
    let text = raw.trim();
    let is_marker = (text.starts_with('[') && text.ends_with(']'))
        || (text.starts_with('(') && text.ends_with(')'));
    (!text.is_empty() && !is_marker).then(|| text.to_string())
}

/// Speech through a local TTS command and recognition through whisper.
pub struct LocalVoice {
    speech: SpeechConfig,
    listen: ListenConfig,
    recognizer: Mutex<Option<Arc<WhisperContext>>>,
    /// Stops the utterance currently playing, tagged with its generation.
    playing: Mutex<Option<(u64, oneshot::Sender<()>)>>,
    generation: AtomicU64,
}

impl LocalVoice {
    pub fn new(speech: SpeechConfig, listen: ListenConfig) -> Self {
        Self {
            speech,
            listen,
            recognizer: Mutex::new(None),
            playing: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Enable `listen` once the whisper model is loaded.
    pub fn install_recognizer(&self, ctx: WhisperContext) {
        if let Ok(mut slot) = self.recognizer.lock() {
            *slot = Some(Arc::new(ctx));
            log::info!("Speech recognition ready");
        }
    }

    fn recognizer(&self) -> Option<Arc<WhisperContext>> {
        self.recognizer.lock().ok()?.clone()
    }

    async fn play(&self, text: &str, stop: oneshot::Receiver<()>) -> Result<(), BoxError> {
        let program = &self.speech.program;
        let mut child = Command::new(program)
            .args(&self.speech.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to spawn {program}: {e}"))?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if !status.success() {
                    return Err(format!("{program} exited with status {status}").into());
                }
            }
            _ = stop => {
                log::info!("Speech interrupted");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VoiceIo for LocalVoice {
    fn recognition_available(&self) -> bool {
        self.recognizer().is_some()
    }

    async fn speak(&self, text: String) {
        if text.trim().is_empty() {
            self.cancel_speech();
            return;
        }

        // Swap in our stop signal and stop the previous utterance in one step.
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (stop_tx, stop_rx) = oneshot::channel();
        let previous = self
            .playing
            .lock()
            .ok()
            .and_then(|mut slot| slot.replace((generation, stop_tx)));
        if let Some((_, stop)) = previous {
            let _ = stop.send(());
        }

        if let Err(e) = self.play(&text, stop_rx).await {
            log::warn!("Speech failed: {e}");
        }

        // Leave a newer utterance's signal in place.
        if let Ok(mut slot) = self.playing.lock() {
            if matches!(*slot, Some((current, _)) if current == generation) {
                *slot = None;
            }
        }
    }

    fn cancel_speech(&self) {
        let stop = self.playing.lock().ok().and_then(|mut slot| slot.take());
        if let Some((_, stop)) = stop {
            let _ = stop.send(());
        }
    }

    async fn listen(&self) -> Option<String> {
        let ctx = self.recognizer()?;
        let config = self.listen.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let _guard = StopOnDrop(stop.clone());

        play_cue(Cue::ListenStart);
        let result = tokio::task::spawn_blocking(move || -> Result<Option<String>, BoxError> {
            let recorded = recorder::record_utterance(&config, &stop)?;
            play_cue(Cue::ListenStop);
            let Some((samples, rate)) = recorded else {
                return Ok(None);
            };
            let samples = recorder::resample(&samples, rate, recorder::WHISPER_RATE);
            let text = crate::transcriber::transcribe(&ctx, &samples, &config.language)?;
            Ok(Some(text))
        })
        .await;

        match result {
            Ok(Ok(text)) => text.as_deref().and_then(clean_transcript),
            Ok(Err(e)) => {
                log::warn!("Speech recognition error: {e}");
                None
            }
            Err(e) => {
                log::warn!("Speech recognition task panicked: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn voice(program: &str, args: &[&str]) -> LocalVoice {
        LocalVoice::new(
            SpeechConfig {
                program: program.into(),
                args: args.iter().map(|a| a.to_string()).collect(),
            },
            ListenConfig::default(),
        )
    }

    #[test]
    fn markers_are_not_transcripts() {
        assert_eq!(clean_transcript("  [BLANK_AUDIO] "), None);
        assert_eq!(clean_transcript("(música)"), None);
        assert_eq!(clean_transcript("   "), None);
        assert_eq!(
            clean_transcript(" ¿Qué pone aquí? ").as_deref(),
            Some("¿Qué pone aquí?")
        );
    }

    #[tokio::test]
    async fn no_recognizer_means_no_listening() {
        let v = voice("true", &[]);
        assert!(!v.recognition_available());
        assert_eq!(v.listen().await, None);
    }

    #[tokio::test]
    async fn speak_completes_when_program_is_missing() {
        let v = voice("/nonexistent/tts-for-tests", &[]);
        v.speak("hola".into()).await;
    }

    #[test]
    fn cancel_without_speech_is_harmless() {
        let v = voice("true", &[]);
        v.cancel_speech();
        v.cancel_speech();
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn finished_utterance_keeps_newer_stop_signal() {
        let v = Arc::new(voice("sh", &["-c", "sleep \"$1\"", "tts"]));
        let first = {
            let v = v.clone();
            tokio::spawn(async move { v.speak("30".into()).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;

        let second = {
            let v = v.clone();
            tokio::spawn(async move { v.speak("30".into()).await })
        };

        // The first utterance is stopped by the second and finishes on its own.
        tokio::time::timeout(Duration::from_secs(5), first)
            .await
            .expect("first utterance should be interrupted")
            .unwrap();

        v.cancel_speech();
        tokio::time::timeout(Duration::from_secs(5), second)
            .await
            .expect("cancel should still reach the newer utterance")
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancel_interrupts_playback() {
        let v = Arc::new(voice("sh", &["-c", "sleep 30", "tts"]));
        let speaking = {
            let v = v.clone();
            tokio::spawn(async move { v.speak("hola".into()).await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        v.cancel_speech();

        tokio::time::timeout(Duration::from_secs(5), speaking)
            .await
            .expect("speech should stop after cancel")
            .unwrap();
    }
}
