use gtk4::prelude::*;
use libadwaita::prelude::*;

use sight_assist::app::{Intent, Snapshot, Status};

/// Handles returned from building the main window.
pub struct MainWindow {
    pub window: libadwaita::ApplicationWindow,
    pub status_label: gtk4::Label,
    pub read_button: gtk4::Button,
    pub describe_button: gtk4::Button,
    pub converse_button: gtk4::Button,
    pub api_key_row: libadwaita::PasswordEntryRow,
    pub progress_bar: gtk4::ProgressBar,
}

/// Short status line shown when there is no message.
pub fn status_text(status: Status) -> &'static str {
    match status {
        Status::Idle => "",
        Status::Initializing => "Iniciando cámara...",
        Status::Ready => "Listo. Elige una opción.",
        Status::Capturing => "Capturando imagen...",
        Status::Listening => "Escuchando...",
        Status::Processing => "Procesando...",
        Status::Speaking => "Hablando...",
        Status::Error => "Error",
    }
}

/// Main text for a snapshot: errors always show their message, otherwise
/// a non-empty message wins over the status line.
pub fn display_text(snapshot: &Snapshot) -> String {
    if snapshot.status == Status::Error || !snapshot.message.is_empty() {
        snapshot.message.clone()
    } else {
        status_text(snapshot.status).to_string()
    }
}

/// Whether the control for `intent` can be pressed.
///
/// While busy only the running control and "Preguntar" stay live; pressing
/// them cancels.
pub fn control_enabled(intent: Intent, snapshot: &Snapshot) -> bool {
    match snapshot.status {
        Status::Ready => true,
        s if s.is_busy() => intent == Intent::Converse || snapshot.intent == Some(intent),
        _ => false,
    }
}

fn build_action_button(intent: Intent, icon: &str) -> gtk4::Button {
    let content = libadwaita::ButtonContent::builder()
        .icon_name(icon)
        .label(format!("_{}", intent.label()))
        .use_underline(true)
        .build();

    let button = gtk4::Button::builder()
        .child(&content)
        .hexpand(true)
        .height_request(96)
        .sensitive(false)
        .tooltip_text(intent.label())
        .build();
    button.add_css_class("suggested-action");
    button.add_css_class("pill");
    button
}

/// Build the main window.
pub fn build_main_window(app: &libadwaita::Application, initial_api_key: &str) -> MainWindow {
    let window = libadwaita::ApplicationWindow::builder()
        .application(app)
        .title("Sight Assist")
        .default_width(520)
        .default_height(560)
        .build();

    let toolbar_view = libadwaita::ToolbarView::new();
    let header = libadwaita::HeaderBar::new();
    toolbar_view.add_top_bar(&header);

    let content = gtk4::Box::new(gtk4::Orientation::Vertical, 12);
    content.set_margin_start(16);
    content.set_margin_end(16);
    content.set_margin_top(12);
    content.set_margin_bottom(12);

    // --- Status ---
    let status_label = gtk4::Label::new(Some(status_text(Status::Initializing)));
    status_label.add_css_class("title-2");
    status_label.set_wrap(true);
    status_label.set_selectable(true);
    status_label.set_justify(gtk4::Justification::Center);
    status_label.set_vexpand(true);
    status_label.set_valign(gtk4::Align::Start);
    content.append(&status_label);

    // --- Actions ---
    let actions = gtk4::Box::new(gtk4::Orientation::Horizontal, 8);
    actions.set_homogeneous(true);
    let read_button = build_action_button(Intent::ReadText, "format-justify-left-symbolic");
    let describe_button = build_action_button(Intent::DescribeScene, "camera-photo-symbolic");
    let converse_button =
        build_action_button(Intent::Converse, "audio-input-microphone-symbolic");
    actions.append(&read_button);
    actions.append(&describe_button);
    actions.append(&converse_button);
    content.append(&actions);

    content.append(&gtk4::Separator::new(gtk4::Orientation::Horizontal));

    // --- API Key group ---
    let api_group = libadwaita::PreferencesGroup::new();
    api_group.set_title("Gemini API");

    let api_key_row = libadwaita::PasswordEntryRow::builder()
        .title("Clave de API")
        .text(initial_api_key)
        .build();
    api_group.add(&api_key_row);
    content.append(&api_group);

    // --- Download progress bar ---
    let progress_bar = gtk4::ProgressBar::new();
    progress_bar.set_visible(false);
    progress_bar.set_show_text(true);
    progress_bar.set_text(Some("Descargando modelo de voz..."));
    content.append(&progress_bar);

    toolbar_view.set_content(Some(&content));
    window.set_content(Some(&toolbar_view));

    MainWindow {
        window,
        status_label,
        read_button,
        describe_button,
        converse_button,
        api_key_row,
        progress_bar,
    }
}

/// Render a session snapshot.
pub fn apply_snapshot(ui: &MainWindow, snapshot: &Snapshot) {
    ui.status_label.set_text(&display_text(snapshot));

    ui.read_button
        .set_sensitive(control_enabled(Intent::ReadText, snapshot));
    ui.describe_button
        .set_sensitive(control_enabled(Intent::DescribeScene, snapshot));
    ui.converse_button
        .set_sensitive(control_enabled(Intent::Converse, snapshot));
}

pub fn show_alert(ui: &MainWindow, message: &str) {
    let dialog = libadwaita::AlertDialog::new(Some("Aviso"), Some(message));
    dialog.add_response("ok", "Aceptar");
    dialog.present(Some(&ui.window));
}

pub fn show_download_progress(ui: &MainWindow, downloaded: u64, total: u64) {
    ui.progress_bar.set_visible(true);
    if total > 0 {
        ui.progress_bar
            .set_fraction(downloaded as f64 / total as f64);
        let mb_done = downloaded as f64 / 1_048_576.0;
        let mb_total = total as f64 / 1_048_576.0;
        ui.progress_bar.set_text(Some(&format!(
            "Descargando modelo de voz: {mb_done:.1} / {mb_total:.1} MB"
        )));
    } else {
        ui.progress_bar.pulse();
    }
}

pub fn hide_download_progress(ui: &MainWindow) {
    ui.progress_bar.set_visible(false);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(status: Status, message: &str, intent: Option<Intent>) -> Snapshot {
        Snapshot {
            status,
            message: message.into(),
            intent,
        }
    }

    #[test]
    fn message_wins_over_status_line() {
        assert_eq!(display_text(&snap(Status::Ready, "", None)), "Listo. Elige una opción.");
        assert_eq!(display_text(&snap(Status::Ready, "Hola", None)), "Hola");
        assert_eq!(display_text(&snap(Status::Error, "", None)), "");
    }

    #[test]
    fn ready_enables_everything() {
        let s = snap(Status::Ready, "", None);
        assert!(control_enabled(Intent::ReadText, &s));
        assert!(control_enabled(Intent::DescribeScene, &s));
        assert!(control_enabled(Intent::Converse, &s));
    }

    #[test]
    fn busy_keeps_running_control_and_converse() {
        let s = snap(Status::Processing, "", Some(Intent::ReadText));
        assert!(control_enabled(Intent::ReadText, &s));
        assert!(!control_enabled(Intent::DescribeScene, &s));
        assert!(control_enabled(Intent::Converse, &s));
    }

    #[test]
    fn error_and_startup_disable_controls() {
        for status in [Status::Initializing, Status::Error] {
            let s = snap(status, "x", None);
            assert!(!control_enabled(Intent::ReadText, &s));
            assert!(!control_enabled(Intent::Converse, &s));
        }
    }
}
