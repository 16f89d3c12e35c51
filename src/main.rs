mod bootstrap;
mod ui;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gtk4::glib;
use gtk4::prelude::*;
use libadwaita::prelude::*;

use bootstrap::UiEvent;
use sight_assist::app::{
    Collaborators, Intent, SessionController, SessionHandle, SessionNotice, SessionSettings,
};
use sight_assist::camera::FfmpegCamera;
use sight_assist::config::Config;
use sight_assist::speech::LocalVoice;
use sight_assist::vision::GeminiClient;
use ui::window::MainWindow;

/// State owned by the GTK main thread.
struct AppContext {
    config: RefCell<Config>,
    api_key: Arc<Mutex<String>>,
    handle: SessionHandle,
    window: MainWindow,
    session_task: RefCell<Option<tokio::task::JoinHandle<()>>>,
    runtime: tokio::runtime::Runtime,
}

fn main() {
    env_logger::init();
    log::info!("Sight Assist starting");

    let application = libadwaita::Application::builder()
        .application_id("com.github.sight-assist")
        .build();

    application.connect_activate(on_activate);
    application.run();
}

fn on_activate(app: &libadwaita::Application) {
    let config = Config::load();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to create tokio runtime: {e}");
            app.quit();
            return;
        }
    };

    // Build collaborators and start the session
    let api_key = Arc::new(Mutex::new(config.api_key()));
    let voice = Arc::new(LocalVoice::new(config.speech.clone(), config.listen.clone()));
    let collaborators = Collaborators {
        frames: Arc::new(FfmpegCamera::new(config.camera.clone())),
        inference: Arc::new(GeminiClient::new(config.gemini.model.clone(), api_key.clone())),
        voice: voice.clone(),
    };
    let (controller, handle, notices) =
        SessionController::new(collaborators, SessionSettings::from_config(&config));
    let session_task = runtime.spawn(controller.run());

    let (ui_tx, ui_rx) = async_channel::unbounded::<UiEvent>();

    let window = ui::window::build_main_window(app, &config.gemini.api_key);
    bootstrap::ensure_whisper_model(
        &runtime,
        voice,
        config.listen.model_file.clone(),
        ui_tx.clone(),
    );

    let ctx = Rc::new(AppContext {
        config: RefCell::new(config),
        api_key,
        handle,
        window,
        session_task: RefCell::new(Some(session_task)),
        runtime,
    });

    // Wire up the action buttons
    for (button, intent) in [
        (&ctx.window.read_button, Intent::ReadText),
        (&ctx.window.describe_button, Intent::DescribeScene),
        (&ctx.window.converse_button, Intent::Converse),
    ] {
        let handle = ctx.handle.clone();
        button.connect_clicked(move |_| handle.trigger(intent));
    }

    // Wire up API key changes
    {
        let ctx_clone = ctx.clone();
        ctx.window
            .api_key_row
            .connect_changed(move |row: &libadwaita::PasswordEntryRow| {
                let mut config = ctx_clone.config.borrow_mut();
                config.gemini.api_key = row.text().to_string();
                if let Ok(mut key) = ctx_clone.api_key.lock() {
                    *key = config.api_key();
                }
                if let Err(e) = config.save() {
                    log::warn!("Failed to save config: {e}");
                }
            });
    }

    {
        let ctx_clone = ctx.clone();
        ctx.window.window.connect_close_request(move |_| {
            shutdown_session(&ctx_clone);
            glib::Propagation::Proceed
        });
    }

    // Forward session notices to the UI channel
    glib::spawn_future_local(async move {
        while let Ok(notice) = notices.recv().await {
            if ui_tx.send(UiEvent::Session(notice)).await.is_err() {
                break;
            }
        }
    });

    // Attach UI event handler
    {
        let ctx_clone = ctx.clone();
        glib::spawn_future_local(async move {
            while let Ok(event) = ui_rx.recv().await {
                handle_ui_event(&ctx_clone, event);
            }
        });
    }

    ctx.window.window.present();
}

/// Stop the session and wait briefly so the camera process is released.
fn shutdown_session(ctx: &AppContext) {
    ctx.handle.shutdown();
    if let Some(task) = ctx.session_task.borrow_mut().take() {
        let stopped = ctx
            .runtime
            .block_on(async { tokio::time::timeout(Duration::from_secs(2), task).await });
        if stopped.is_err() {
            log::warn!("Session did not stop in time");
        }
    }
}

fn handle_ui_event(ctx: &AppContext, event: UiEvent) {
    match event {
        UiEvent::Session(SessionNotice::Changed(snapshot)) => {
            ui::window::apply_snapshot(&ctx.window, &snapshot);
        }
        UiEvent::Session(SessionNotice::Alert(message)) => {
            ui::window::show_alert(&ctx.window, &message);
        }
        UiEvent::ModelDownloadProgress(downloaded, total) => {
            ui::window::show_download_progress(&ctx.window, downloaded, total);
        }
        UiEvent::ModelReady => {
            ui::window::hide_download_progress(&ctx.window);
            log::info!("Voice questions enabled");
        }
        UiEvent::ModelFailed(err) => {
            ui::window::hide_download_progress(&ctx.window);
            log::error!("Speech recognition unavailable: {err}");
        }
    }
}
