#![cfg_attr(target_os = "windows", windows_subsystem = "windows")]

use std::sync::{Arc, Mutex};
use std::thread;

mod bubble;
mod clipboard;
mod config;
mod handoff;
mod logger;
mod platform;
mod queue;
mod translate;
mod tray;
mod ui;

use handoff::HandoffStore;
use platform::{DesktopPlatform, Platform};
use queue::{AppEvent, TranslationRequest, UiQueue, UiQueueHandle};
use translate::Translator;

/// One worker owns the runtime; jobs arrive over the channel, results go back
/// through the UI queue tagged with their request id.
fn spawn_translation_worker(
    cfg: Arc<Mutex<config::Config>>,
    jobs: crossbeam_channel::Receiver<TranslationRequest>,
    ui: UiQueueHandle,
) {
    thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("tokio rt");
        while let Ok(job) = jobs.recv() {
            let translator = {
                let c = cfg.lock().unwrap();
                Translator::from_config(&c)
            };
            logger::log(&format!(
                "translating {} chars (request {})",
                job.source_text.len(),
                job.request_id
            ));
            let result = rt.block_on(translator.translate(&job.source_text));
            ui.post(AppEvent::TranslationDone { request_id: job.request_id, result });
        }
        logger::log("translation worker stopped");
    });
}

fn main() {
    logger::init();
    logger::log("App starting");

    let mut cfg = config::Config::load();
    cfg.apply_env_overrides();
    logger::log("Config loaded from config.json");
    let cfg = Arc::new(Mutex::new(cfg));

    let handoff = Arc::new(HandoffStore::new());
    let queue = UiQueue::new();
    let (notify_tx, notify_rx) = crossbeam_channel::unbounded();
    let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded();

    let platform: Arc<dyn Platform> =
        Arc::new(DesktopPlatform::new(Arc::clone(&handoff), notify_tx));

    tray::run_tray_thread(queue.handle(), notify_rx);
    spawn_translation_worker(Arc::clone(&cfg), jobs_rx, queue.handle());

    if cfg.lock().unwrap().api_key.is_empty() {
        platform.show_toast("Set an API key in Settings.");
    }

    let app = ui::ShellApp::new(cfg, Arc::clone(&platform), handoff, queue, jobs_tx);

    // Blocks until the window closes.
    ui::run(app);
    platform.stop_foreground_notification();
    logger::log("App exiting");
}
