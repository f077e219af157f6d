use std::sync::Arc;

use crate::handoff::HandoffStore;
use crate::logger;
use crate::tray::NotifyCommand;

/// OS services the app touches. One object implements the lot so the core
/// never reaches for a global handle; everything takes an `Arc<dyn Platform>`
/// injected at startup.
pub trait Platform: Send + Sync {
    /// Best-effort clipboard read. Denied or unavailable reads come back as
    /// an empty string, never as a blocking call or an error.
    fn read_clipboard(&self) -> String;
    fn write_clipboard(&self, text: &str) -> bool;
    fn vibrate(&self, ms: u64);
    fn show_toast(&self, text: &str);
    fn check_overlay_permission(&self) -> bool;
    fn request_overlay_permission(&self);
    fn start_foreground_notification(&self, title: &str, text: &str);
    fn update_foreground_notification(&self, text: &str);
    fn stop_foreground_notification(&self);
    /// Kick off an out-of-band clipboard capture for `request_id`. The result
    /// never returns through this call; it lands in the handoff store.
    fn launch_clipboard_helper(&self, request_id: u64) -> anyhow::Result<()>;
}

#[cfg(windows)]
fn read_clipboard_text() -> String {
    clipboard_win::get_clipboard_string().unwrap_or_default()
}

#[cfg(not(windows))]
fn read_clipboard_text() -> String {
    String::new()
}

/// Desktop rendition of the platform services. Toasts and the foreground
/// notification ride on the tray thread; overlay permission is a given, so
/// the checks are trivially true.
pub struct DesktopPlatform {
    handoff: Arc<HandoffStore>,
    notify: crossbeam_channel::Sender<NotifyCommand>,
}

impl DesktopPlatform {
    pub fn new(
        handoff: Arc<HandoffStore>,
        notify: crossbeam_channel::Sender<NotifyCommand>,
    ) -> Self {
        Self { handoff, notify }
    }
}

impl Platform for DesktopPlatform {
    fn read_clipboard(&self) -> String {
        read_clipboard_text()
    }

    #[cfg(windows)]
    fn write_clipboard(&self, text: &str) -> bool {
        let ok = clipboard_win::set_clipboard_string(text).is_ok();
        if !ok {
            logger::log("clipboard write failed");
        }
        ok
    }

    #[cfg(not(windows))]
    fn write_clipboard(&self, _text: &str) -> bool {
        false
    }

    fn vibrate(&self, _ms: u64) {
        // No haptics on desktop.
    }

    #[cfg(windows)]
    fn show_toast(&self, text: &str) {
        let _ = winrt_notification::Toast::new("ScholarTrans")
            .title("ScholarTrans")
            .text1(text)
            .show();
    }

    #[cfg(not(windows))]
    fn show_toast(&self, text: &str) {
        logger::log(&format!("toast: {text}"));
    }

    fn check_overlay_permission(&self) -> bool {
        true
    }

    fn request_overlay_permission(&self) {}

    fn start_foreground_notification(&self, title: &str, text: &str) {
        let _ = self.notify.send(NotifyCommand::Start {
            title: title.to_string(),
            text: text.to_string(),
        });
    }

    fn update_foreground_notification(&self, text: &str) {
        let _ = self.notify.send(NotifyCommand::Update { text: text.to_string() });
    }

    fn stop_foreground_notification(&self) {
        let _ = self.notify.send(NotifyCommand::Stop);
    }

    /// Desktop needs no separate surface: a short-lived thread reads the
    /// clipboard and publishes straight into the handoff store, keeping the
    /// same id-correlated path the bubble polls.
    fn launch_clipboard_helper(&self, request_id: u64) -> anyhow::Result<()> {
        let handoff = Arc::clone(&self.handoff);
        std::thread::Builder::new()
            .name("clip-capture".to_string())
            .spawn(move || {
                let text = read_clipboard_text();
                handoff.publish(request_id, text);
            })
            .map_err(|e| anyhow::anyhow!("clipboard capture thread failed to start: {e}"))?;
        logger::log(&format!("clipboard capture launched for request {request_id}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn desktop() -> (DesktopPlatform, Arc<HandoffStore>) {
        let handoff = Arc::new(HandoffStore::new());
        let (tx, _rx) = crossbeam_channel::unbounded();
        (DesktopPlatform::new(Arc::clone(&handoff), tx), handoff)
    }

    #[test]
    fn helper_publishes_into_the_handoff_store() {
        let (platform, handoff) = desktop();
        platform.launch_clipboard_helper(42).expect("spawn");
        let mut captured = None;
        for _ in 0..100 {
            if let Some(text) = handoff.take_if(42) {
                captured = Some(text);
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(captured.is_some(), "capture thread never published");
    }

    #[test]
    fn notification_commands_flow_to_the_tray_channel() {
        let handoff = Arc::new(HandoffStore::new());
        let (tx, rx) = crossbeam_channel::unbounded();
        let platform = DesktopPlatform::new(handoff, tx);

        platform.start_foreground_notification("ScholarTrans", "Monitoring clipboard");
        platform.update_foreground_notification("Translating");
        platform.stop_foreground_notification();

        let commands: Vec<NotifyCommand> = rx.try_iter().collect();
        assert_eq!(commands.len(), 3);
        assert!(matches!(&commands[0], NotifyCommand::Start { title, .. } if title == "ScholarTrans"));
        assert!(matches!(&commands[1], NotifyCommand::Update { text } if text == "Translating"));
        assert!(matches!(commands[2], NotifyCommand::Stop));
    }

    #[test]
    fn overlay_permission_is_always_granted_on_desktop() {
        let (platform, _) = desktop();
        assert!(platform.check_overlay_permission());
        platform.request_overlay_permission();
    }
}
