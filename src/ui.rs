use eframe::egui;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::bubble::{
    BubbleMachine, CapturePoll, PressOutcome, BUBBLE_SIZE, CAPTURE_POLL_MS, PANEL_H, PANEL_W,
};
use crate::clipboard::{ClipboardWatcher, DEFAULT_POLL_MS};
use crate::config::{Config, MODEL_PRESETS};
use crate::handoff::HandoffStore;
use crate::logger;
use crate::platform::Platform;
use crate::queue::{AppEvent, TranslationRequest, TrayAction, UiQueue};

const WINDOW_TITLE: &str = "ScholarTrans";

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Main window plus the floating bubble, all driven from the one UI thread.
/// Background threads only ever talk to this through the event queue and the
/// handoff store.
pub struct ShellApp {
    cfg: Arc<Mutex<Config>>,
    platform: Arc<dyn Platform>,
    handoff: Arc<HandoffStore>,
    queue: UiQueue,
    jobs: crossbeam_channel::Sender<TranslationRequest>,
    watcher: ClipboardWatcher,
    bubble: BubbleMachine,

    source: String,
    output: String,
    status_line: String,
    monitoring: bool,
    settings_open: bool,
    settings_draft: Config,
    fonts_set: bool,
    scroll_output_top: bool,
}

impl ShellApp {
    pub fn new(
        cfg: Arc<Mutex<Config>>,
        platform: Arc<dyn Platform>,
        handoff: Arc<HandoffStore>,
        queue: UiQueue,
        jobs: crossbeam_channel::Sender<TranslationRequest>,
    ) -> Self {
        let watcher = ClipboardWatcher::new(Arc::clone(&platform));
        Self {
            cfg,
            platform,
            handoff,
            queue,
            jobs,
            watcher,
            bubble: BubbleMachine::new(),
            source: String::new(),
            output: String::new(),
            status_line: "Ready".to_string(),
            monitoring: false,
            settings_open: false,
            settings_draft: Config::default(),
            fonts_set: false,
            scroll_output_top: false,
        }
    }

    fn setup_fonts(&mut self, ctx: &egui::Context) {
        if self.fonts_set {
            return;
        }
        self.fonts_set = true;
        let candidates = [
            r"C:\Windows\Fonts\msyh.ttc",
            r"C:\Windows\Fonts\msyh.ttf",
            r"C:\Windows\Fonts\simsun.ttc",
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
            "/System/Library/Fonts/PingFang.ttc",
        ];
        let mut loaded = None;
        for path in candidates {
            if let Ok(bytes) = fs::read(path) {
                logger::log(&format!("loaded CJK font: {path}"));
                loaded = Some(bytes);
                break;
            }
        }
        if let Some(bytes) = loaded {
            let mut fonts = egui::FontDefinitions::default();
            fonts.font_data.insert("cjk".to_owned(), egui::FontData::from_owned(bytes));
            fonts
                .families
                .entry(egui::FontFamily::Proportional)
                .or_default()
                .insert(0, "cjk".to_owned());
            fonts
                .families
                .entry(egui::FontFamily::Monospace)
                .or_default()
                .insert(0, "cjk".to_owned());
            ctx.set_fonts(fonts);
        } else {
            logger::log("no CJK font found; text may render as squares");
        }
    }

    fn submit_job(&mut self, request_id: u64, text: String) {
        if self.monitoring {
            self.platform.update_foreground_notification("Translating...");
        }
        self.status_line = "Translating, please wait...".to_string();
        self.output = "Translating...".to_string();
        let _ = self.jobs.send(TranslationRequest { request_id, source_text: text });
    }

    /// Panel-path translation: a fresh id, the busier badge, no handoff.
    fn translate_text(&mut self, text: String) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            self.platform.show_toast("No text to translate.");
            return;
        }
        let request_id = self.bubble.begin_background();
        self.submit_job(request_id, trimmed.to_string());
    }

    fn on_bubble_click(&mut self, now: u64) {
        let request_id = self.bubble.begin_click(now);
        self.platform.vibrate(50);
        match self.platform.launch_clipboard_helper(request_id) {
            Ok(()) => self.bubble.capture_launched(),
            Err(e) => {
                logger::log(&format!("capture launch failed: {e}"));
                self.bubble.capture_failed();
            }
        }
    }

    fn handle_event(&mut self, ctx: &egui::Context, event: AppEvent, now: u64) {
        match event {
            AppEvent::ClipboardChanged(text) => {
                let auto = self.cfg.lock().unwrap().auto_translate;
                self.source = text.clone();
                self.status_line = "New text detected!".to_string();
                self.platform.vibrate(30);
                self.platform.show_toast("Text detected, translating...");
                if auto {
                    self.translate_text(text);
                }
            }
            AppEvent::TranslationDone { request_id, result } => match result {
                Ok(text) => {
                    if self.bubble.render_result(request_id, &text) {
                        self.output = text;
                        self.scroll_output_top = true;
                        self.platform.vibrate(100);
                        self.platform.show_toast("Translation complete!");
                        if self.monitoring {
                            self.status_line = "Done! Monitoring...".to_string();
                            self.platform
                                .update_foreground_notification("Translation done! Monitoring...");
                        } else {
                            self.status_line = "Translation complete".to_string();
                        }
                    } else {
                        logger::log(&format!("discarded stale result for request {request_id}"));
                    }
                }
                Err(e) => {
                    if self.bubble.fail(request_id, now) {
                        let msg = format!("Error: {e}");
                        self.output = msg.clone();
                        self.status_line = msg.clone();
                        self.platform.show_toast(&msg);
                        self.platform.vibrate(30);
                        logger::log(&format!("translation failed: {e}"));
                    } else {
                        logger::log(&format!("discarded stale failure for request {request_id}"));
                    }
                }
            },
            AppEvent::Tray(action) => match action {
                TrayAction::ShowWindow => {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Visible(true));
                    ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
                }
                TrayAction::OpenSettings => {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Visible(true));
                    ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
                    self.open_settings();
                }
                TrayAction::Quit => {
                    logger::log("quit requested from tray");
                    self.watcher.stop_monitoring();
                    self.platform.stop_foreground_notification();
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            },
        }
    }

    /// The helper could not launch, so the main window plays helper: it is
    /// raised once, and once focused it does the read and publishes it under
    /// the round's id. The normal poll path takes it from there.
    fn service_fallback(&mut self, ctx: &egui::Context) {
        if self.bubble.take_fallback_raise() {
            ctx.send_viewport_cmd(egui::ViewportCommand::Visible(true));
            ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
        }
        if !self.bubble.pending_fallback() {
            return;
        }
        let focused = ctx.input(|i| i.viewport().focused.unwrap_or(true));
        if !focused {
            return;
        }
        if let Some(request_id) = self.bubble.take_pending_fallback() {
            let text = self.platform.read_clipboard();
            logger::log(&format!("fallback read serviced for request {request_id}"));
            self.handoff.publish(request_id, text);
        }
    }

    fn poll_capture(&mut self, now: u64) {
        match self.bubble.poll_capture(&self.handoff, now) {
            CapturePoll::Captured { request_id, text } => {
                if text.trim().is_empty() {
                    self.bubble.fail(request_id, now);
                    self.status_line = "Clipboard is empty".to_string();
                    self.platform.show_toast("Clipboard is empty.");
                    self.platform.vibrate(30);
                } else {
                    self.platform.vibrate(30);
                    self.source = text.clone();
                    self.bubble.translation_submitted();
                    self.submit_job(request_id, text);
                }
            }
            CapturePoll::TimedOut => {
                self.status_line = "Clipboard read timed out".to_string();
                self.platform.show_toast("Clipboard read timed out.");
                self.platform.vibrate(30);
            }
            CapturePoll::Waiting | CapturePoll::Idle => {}
        }
    }

    fn toggle_monitoring(&mut self) {
        if self.monitoring {
            self.watcher.stop_monitoring();
            self.monitoring = false;
            self.platform.stop_foreground_notification();
            self.platform.show_toast("Monitoring stopped");
            self.status_line = "Monitoring stopped".to_string();
            return;
        }
        let ui_handle = self.queue.handle();
        self.watcher.start_monitoring(DEFAULT_POLL_MS, move |snap| {
            ui_handle.post(AppEvent::ClipboardChanged(snap.text));
        });
        self.monitoring = true;
        self.platform.vibrate(50);
        self.platform
            .start_foreground_notification(WINDOW_TITLE, "Monitoring clipboard");
        self.platform.show_toast("Monitoring started - runs in background");
        self.status_line = "Monitoring clipboard...".to_string();
    }

    fn toggle_bubble(&mut self) {
        if self.bubble.visible() {
            self.bubble.set_visible(false);
            return;
        }
        if !self.platform.check_overlay_permission() {
            self.platform.request_overlay_permission();
            self.platform.show_toast("Overlay permission required.");
            return;
        }
        self.bubble.set_visible(true);
    }

    fn copy_output(&mut self) {
        if self.platform.write_clipboard(&self.output) {
            self.platform.vibrate(30);
            self.platform.show_toast("Copied!");
            self.status_line = "Copied to clipboard!".to_string();
        } else {
            self.platform.show_toast("Copy failed.");
        }
    }

    fn open_settings(&mut self) {
        self.settings_draft = self.cfg.lock().unwrap().clone();
        self.settings_open = true;
    }

    fn save_settings(&mut self) {
        {
            let mut cfg = self.cfg.lock().unwrap();
            *cfg = self.settings_draft.clone();
        }
        match self.settings_draft.save() {
            Ok(()) => {
                self.platform.show_toast("Settings saved.");
                logger::log("settings saved");
            }
            Err(e) => {
                self.platform.show_toast(&format!("Error: could not save settings: {e}"));
                logger::log(&format!("settings save failed: {e}"));
            }
        }
        self.settings_open = false;
    }

    fn settings_window(&mut self, ctx: &egui::Context) {
        if !self.settings_open {
            return;
        }
        let mut open = true;
        egui::Window::new("Settings")
            .open(&mut open)
            .resizable(false)
            .collapsible(false)
            .show(ctx, |ui| {
                egui::Grid::new("settings_grid").num_columns(2).show(ui, |ui| {
                    ui.label("API key");
                    ui.add(
                        egui::TextEdit::singleline(&mut self.settings_draft.api_key)
                            .password(true)
                            .desired_width(240.0),
                    );
                    ui.end_row();

                    ui.label("API URL");
                    ui.add(
                        egui::TextEdit::singleline(&mut self.settings_draft.api_url)
                            .desired_width(240.0),
                    );
                    ui.end_row();

                    ui.label("Model");
                    egui::ComboBox::from_id_source("model_combo")
                        .selected_text(self.settings_draft.model.clone())
                        .width(240.0)
                        .show_ui(ui, |ui| {
                            for &preset in MODEL_PRESETS {
                                ui.selectable_value(
                                    &mut self.settings_draft.model,
                                    preset.to_string(),
                                    preset,
                                );
                            }
                        });
                    ui.end_row();

                    ui.label("Target language");
                    egui::ComboBox::from_id_source("lang_combo")
                        .selected_text(self.settings_draft.target_lang.as_str())
                        .width(240.0)
                        .show_ui(ui, |ui| {
                            for lang in crate::config::TargetLang::ALL {
                                ui.selectable_value(
                                    &mut self.settings_draft.target_lang,
                                    lang,
                                    lang.as_str(),
                                );
                            }
                        });
                    ui.end_row();

                    ui.label("Auto translate");
                    ui.checkbox(&mut self.settings_draft.auto_translate, "translate on copy");
                    ui.end_row();
                });
                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Save").clicked() {
                        self.save_settings();
                    }
                    if ui.button("Cancel").clicked() {
                        self.settings_open = false;
                    }
                });
            });
        if !open {
            self.settings_open = false;
        }
    }

    /// Feed raw pointer state to the machine and draw the bubble and panel
    /// as floating foreground areas.
    fn bubble_overlay(&mut self, ctx: &egui::Context, now: u64) {
        if !self.bubble.visible() {
            return;
        }

        let pointer = ctx.input(|i| i.pointer.interact_pos());
        let pressed = ctx.input(|i| i.pointer.primary_pressed());
        let released = ctx.input(|i| i.pointer.primary_released());

        let (bx, by) = self.bubble.pos();
        let bubble_rect = egui::Rect::from_min_size(
            egui::pos2(bx, by),
            egui::vec2(BUBBLE_SIZE, BUBBLE_SIZE),
        );
        if pressed {
            if let Some(p) = pointer {
                if bubble_rect.contains(p) {
                    self.bubble.press_started(p.x, p.y);
                }
            }
        }
        if let Some(p) = pointer {
            self.bubble.pointer_moved(p.x, p.y);
        }
        if released {
            if self.bubble.press_finished() == Some(PressOutcome::Click) {
                self.on_bubble_click(now);
            }
        }

        let (bx, by) = self.bubble.pos();
        let status = self.bubble.status();
        egui::Area::new(egui::Id::new("bubble"))
            .fixed_pos(egui::pos2(bx, by))
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                let (rect, _) = ui.allocate_exact_size(
                    egui::vec2(BUBBLE_SIZE, BUBBLE_SIZE),
                    egui::Sense::hover(),
                );
                let (r, g, b) = status.color();
                ui.painter()
                    .circle_filled(rect.center(), BUBBLE_SIZE / 2.0, egui::Color32::from_rgb(r, g, b));
                ui.painter().text(
                    rect.center(),
                    egui::Align2::CENTER_CENTER,
                    status.label(),
                    egui::FontId::proportional(16.0),
                    egui::Color32::WHITE,
                );
            });

        if self.bubble.panel_open() {
            let screen = ctx.screen_rect();
            let (px, py) = self.bubble.panel_anchor(screen.width());
            let mut close_panel = false;
            let mut copy_text = None;
            egui::Area::new(egui::Id::new("bubble_panel"))
                .fixed_pos(egui::pos2(px, py))
                .order(egui::Order::Foreground)
                .show(ctx, |ui| {
                    egui::Frame::popup(ui.style()).show(ui, |ui| {
                        ui.set_min_size(egui::vec2(PANEL_W, PANEL_H));
                        ui.set_max_width(PANEL_W);
                        ui.horizontal(|ui| {
                            ui.label(egui::RichText::new("Translation").strong());
                            ui.with_layout(
                                egui::Layout::right_to_left(egui::Align::Center),
                                |ui| {
                                    if ui.small_button("x").clicked() {
                                        close_panel = true;
                                    }
                                    if ui.small_button("Copy").clicked() {
                                        copy_text = Some(self.bubble.panel_text().to_string());
                                    }
                                },
                            );
                        });
                        ui.separator();
                        egui::ScrollArea::vertical()
                            .max_height(PANEL_H - 48.0)
                            .show(ui, |ui| {
                                ui.label(self.bubble.panel_text());
                            });
                    });
                });
            if let Some(text) = copy_text {
                if self.platform.write_clipboard(&text) {
                    self.platform.vibrate(30);
                    self.platform.show_toast("Copied!");
                }
            }
            if close_panel {
                self.bubble.close_panel();
            }
        }
    }

    fn main_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading(WINDOW_TITLE);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Hide").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Visible(false));
                    }
                    if ui.button("Settings").clicked() {
                        self.open_settings();
                    }
                });
            });
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new(&self.status_line).weak());
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.label("Source");
            egui::ScrollArea::vertical()
                .id_source("source_scroll")
                .max_height(140.0)
                .show(ui, |ui| {
                    ui.add(
                        egui::TextEdit::multiline(&mut self.source)
                            .desired_rows(5)
                            .desired_width(f32::INFINITY),
                    );
                });
            ui.horizontal(|ui| {
                if ui.button("Paste").clicked() {
                    let text = self.platform.read_clipboard();
                    if text.trim().is_empty() {
                        self.platform.show_toast("Clipboard is empty.");
                    } else {
                        self.source = text;
                        self.status_line = "Text pasted".to_string();
                    }
                }
                if ui.button("Translate").clicked() {
                    let text = self.source.clone();
                    self.translate_text(text);
                }
                if ui
                    .button(if self.monitoring { "Stop monitoring" } else { "Start monitoring" })
                    .clicked()
                {
                    self.toggle_monitoring();
                }
                if ui
                    .button(if self.bubble.visible() { "Hide bubble" } else { "Show bubble" })
                    .clicked()
                {
                    self.toggle_bubble();
                }
            });

            ui.separator();
            ui.horizontal(|ui| {
                ui.label("Translation");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Top").clicked() {
                        self.scroll_output_top = true;
                    }
                    if ui.button("Copy").clicked() {
                        self.copy_output();
                    }
                });
            });
            let mut output_area = egui::ScrollArea::vertical()
                .id_source("output_scroll")
                .auto_shrink([false, false]);
            if self.scroll_output_top {
                output_area = output_area.vertical_scroll_offset(0.0);
                self.scroll_output_top = false;
            }
            output_area.show(ui, |ui| {
                ui.add(
                    egui::TextEdit::multiline(&mut self.output)
                        .desired_rows(10)
                        .desired_width(f32::INFINITY),
                );
            });
        });
    }
}

impl eframe::App for ShellApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.setup_fonts(ctx);
        let now = now_ms();

        for event in self.queue.drain() {
            self.handle_event(ctx, event, now);
        }
        self.service_fallback(ctx);
        self.poll_capture(now);
        self.bubble.tick(now);

        self.main_panel(ctx);
        self.settings_window(ctx);
        self.bubble_overlay(ctx, now);

        // Wake up often enough to poll the capture and the event queue even
        // without user input.
        let wake = if self.bubble.busy() {
            Duration::from_millis(CAPTURE_POLL_MS)
        } else {
            Duration::from_millis(250)
        };
        ctx.request_repaint_after(wake);
    }
}

/// Run the UI event loop on the main thread (blocking).
pub fn run(app: ShellApp) {
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size([560.0, 640.0])
            .with_always_on_top(),
        ..Default::default()
    };
    match eframe::run_native(WINDOW_TITLE, native_options, Box::new(|_cc| Box::new(app))) {
        Ok(_) => logger::log("UI event loop exited"),
        Err(e) => logger::log(&format!("UI error: {e}")),
    }
}
