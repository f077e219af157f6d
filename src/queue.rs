use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::translate::TranslateError;

/// Menu and icon actions coming off the tray thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayAction {
    ShowWindow,
    OpenSettings,
    Quit,
}

/// Everything background threads may tell the UI thread. The UI drains these
/// once per frame and mutates its own state; no other thread touches UI state.
#[derive(Debug)]
pub enum AppEvent {
    ClipboardChanged(String),
    TranslationDone {
        request_id: u64,
        result: Result<String, TranslateError>,
    },
    Tray(TrayAction),
}

/// Job handed to the translation worker thread.
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub request_id: u64,
    pub source_text: String,
}

/// Cloneable producer side, handed to the watcher, worker and tray threads.
#[derive(Clone)]
pub struct UiQueueHandle {
    tx: Sender<AppEvent>,
}

impl UiQueueHandle {
    pub fn post(&self, event: AppEvent) {
        // Receiver only drops on shutdown, nothing left to notify then.
        let _ = self.tx.send(event);
    }
}

/// Consumer side, owned by the UI thread.
pub struct UiQueue {
    tx: Sender<AppEvent>,
    rx: Receiver<AppEvent>,
}

impl UiQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn handle(&self) -> UiQueueHandle {
        UiQueueHandle { tx: self.tx.clone() }
    }

    /// Pull everything queued since the last frame, oldest first.
    pub fn drain(&self) -> Vec<AppEvent> {
        self.rx.try_iter().collect()
    }
}

impl Default for UiQueue {
    fn default() -> Self {
        Self::new()
    }
}
