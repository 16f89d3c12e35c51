use std::sync::Arc;

use sight_assist::app::SessionNotice;
use sight_assist::speech::LocalVoice;
use sight_assist::transcriber;

/// Events delivered to the GTK main thread.
#[derive(Debug, Clone)]
pub enum UiEvent {
    Session(SessionNotice),
    ModelDownloadProgress(u64, u64),
    ModelReady,
    ModelFailed(String),
}

/// Download the whisper model if missing, load it, and hand it to `voice`.
pub fn ensure_whisper_model(
    runtime: &tokio::runtime::Runtime,
    voice: Arc<LocalVoice>,
    model_file: String,
    sender: async_channel::Sender<UiEvent>,
) {
    runtime.spawn(async move {
        if !transcriber::model_exists(&model_file) {
            log::info!("Whisper model not found, starting download");
            let progress_sender = sender.clone();
            let result = transcriber::download_model(&model_file, move |downloaded, total| {
                let _ = progress_sender.try_send(UiEvent::ModelDownloadProgress(downloaded, total));
            })
            .await;

            if let Err(e) = result {
                let _ = sender
                    .send(UiEvent::ModelFailed(format!("Model download failed: {e}")))
                    .await;
                return;
            }
        }

        log::info!("Loading whisper model...");
        let loaded =
            tokio::task::spawn_blocking(move || transcriber::load_model(&model_file)).await;

        let event = match loaded {
            Ok(Ok(ctx)) => {
                voice.install_recognizer(ctx);
                UiEvent::ModelReady
            }
            Ok(Err(e)) => UiEvent::ModelFailed(format!("Failed to load model: {e}")),
            Err(e) => UiEvent::ModelFailed(format!("Model load panicked: {e}")),
        };
        let _ = sender.send(event).await;
    });
}
