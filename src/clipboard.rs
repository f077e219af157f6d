use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use crate::logger;
use crate::platform::Platform;

pub const DEFAULT_POLL_MS: u64 = 800;

/// Last thing seen on the clipboard. Only ever held as "last seen" for change
/// detection, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardSnapshot {
    pub text: String,
    pub observed_at_ms: u64,
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// New content means non-whitespace text that differs from the last observed
/// value. Whitespace-only reads never count and never update "last".
pub fn is_new_text(current: &str, last: &str) -> bool {
    !current.trim().is_empty() && current != last
}

/// Fixed-interval clipboard poller. The OS gives no reliable change event
/// once the app is backgrounded, so this stays a plain polling loop. The
/// worker sleeps in `recv_timeout` on a stop channel, so stopping wakes it
/// immediately instead of waiting out the rest of the interval.
pub struct ClipboardWatcher {
    platform: Arc<dyn Platform>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl ClipboardWatcher {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            platform,
            stop_tx: None,
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Spawn the poll thread. Change detection starts from an empty baseline,
    /// so text already sitting on the clipboard fires on the first tick.
    pub fn start_monitoring<F>(&mut self, interval_ms: u64, on_change: F)
    where
        F: Fn(ClipboardSnapshot) + Send + 'static,
    {
        if self.worker.is_some() {
            logger::log("clipboard watcher already running");
            return;
        }
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let platform = Arc::clone(&self.platform);
        let handle = std::thread::spawn(move || {
            logger::log(&format!("clipboard watcher started, every {interval_ms}ms"));
            let mut last = String::new();
            let interval = Duration::from_millis(interval_ms);
            loop {
                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                let current = platform.read_clipboard();
                if is_new_text(&current, &last) {
                    last = current.clone();
                    on_change(ClipboardSnapshot { text: current, observed_at_ms: epoch_ms() });
                }
            }
            logger::log("clipboard watcher stopped");
        });
        self.stop_tx = Some(stop_tx);
        self.worker = Some(handle);
    }

    /// Stop and join the poll thread. The stop message wakes a worker
    /// mid-sleep, so this returns promptly. Safe to call repeatedly; polling
    /// never resumes without another `start_monitoring`.
    pub fn stop_monitoring(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ClipboardWatcher {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    /// Test double with a scriptable clipboard. Everything else is inert.
    struct FakePlatform {
        content: Mutex<String>,
        reads: AtomicUsize,
    }

    impl FakePlatform {
        fn new(initial: &str) -> Arc<Self> {
            Arc::new(Self {
                content: Mutex::new(initial.to_string()),
                reads: AtomicUsize::new(0),
            })
        }

        fn set(&self, text: &str) {
            *self.content.lock().unwrap() = text.to_string();
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::Relaxed)
        }
    }

    impl Platform for FakePlatform {
        fn read_clipboard(&self) -> String {
            self.reads.fetch_add(1, Ordering::Relaxed);
            self.content.lock().unwrap().clone()
        }
        fn write_clipboard(&self, _text: &str) -> bool {
            true
        }
        fn vibrate(&self, _ms: u64) {}
        fn show_toast(&self, _text: &str) {}
        fn check_overlay_permission(&self) -> bool {
            true
        }
        fn request_overlay_permission(&self) {}
        fn start_foreground_notification(&self, _title: &str, _text: &str) {}
        fn update_foreground_notification(&self, _text: &str) {}
        fn stop_foreground_notification(&self) {}
        fn launch_clipboard_helper(&self, _request_id: u64) -> anyhow::Result<()> {
            anyhow::bail!("not available in tests")
        }
    }

    fn collect_changes(platform: Arc<FakePlatform>) -> (ClipboardWatcher, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut watcher = ClipboardWatcher::new(platform);
        watcher.start_monitoring(10, move |snap| {
            sink.lock().unwrap().push(snap.text);
        });
        (watcher, seen)
    }

    fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn fires_once_per_distinct_text() {
        let platform = FakePlatform::new("");
        let (mut watcher, seen) = collect_changes(Arc::clone(&platform));

        platform.set("first paragraph");
        wait_for(|| seen.lock().unwrap().len() == 1);
        // Same text again on later polls must not re-fire.
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(seen.lock().unwrap().len(), 1);

        platform.set("second paragraph");
        wait_for(|| seen.lock().unwrap().len() == 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first paragraph".to_string(), "second paragraph".to_string()]
        );
        watcher.stop_monitoring();
    }

    #[test]
    fn whitespace_only_content_never_fires() {
        let platform = FakePlatform::new("");
        let (mut watcher, seen) = collect_changes(Arc::clone(&platform));

        platform.set("   \n\t  ");
        std::thread::sleep(Duration::from_millis(80));
        assert!(seen.lock().unwrap().is_empty());

        // And it does not poison "last": real text afterwards still fires.
        platform.set("real text");
        wait_for(|| seen.lock().unwrap().len() == 1);
        watcher.stop_monitoring();
    }

    #[test]
    fn preexisting_content_fires_on_the_first_tick() {
        let platform = FakePlatform::new("already there");
        let (mut watcher, seen) = collect_changes(Arc::clone(&platform));
        wait_for(|| seen.lock().unwrap().len() == 1);
        assert_eq!(*seen.lock().unwrap(), vec!["already there".to_string()]);
        watcher.stop_monitoring();
    }

    #[test]
    fn stop_twice_is_harmless_and_polling_stays_stopped() {
        let platform = FakePlatform::new("");
        let (mut watcher, _seen) = collect_changes(Arc::clone(&platform));
        wait_for(|| platform.reads() > 1);

        watcher.stop_monitoring();
        watcher.stop_monitoring();
        assert!(!watcher.is_running());

        let after_stop = platform.reads();
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(platform.reads(), after_stop, "polling resumed without start");
    }

    #[test]
    fn stop_returns_promptly_even_mid_interval() {
        let platform = FakePlatform::new("");
        let mut watcher = ClipboardWatcher::new(platform);
        watcher.start_monitoring(60_000, |_| {});
        let asked = Instant::now();
        watcher.stop_monitoring();
        assert!(!watcher.is_running());
        assert!(
            asked.elapsed() < Duration::from_secs(5),
            "stop had to wait out the poll interval"
        );
    }

    #[test]
    fn restart_after_stop_polls_again() {
        let platform = FakePlatform::new("");
        let (mut watcher, seen) = collect_changes(Arc::clone(&platform));
        watcher.stop_monitoring();

        let sink = Arc::clone(&seen);
        watcher.start_monitoring(10, move |snap| {
            sink.lock().unwrap().push(snap.text);
        });
        assert!(watcher.is_running());
        platform.set("after restart");
        wait_for(|| seen.lock().unwrap().iter().any(|t| t == "after restart"));
        watcher.stop_monitoring();
    }

    #[test]
    fn change_detection_rules() {
        assert!(is_new_text("hello", ""));
        assert!(is_new_text("hello", "world"));
        assert!(!is_new_text("hello", "hello"));
        assert!(!is_new_text("", "hello"));
        assert!(!is_new_text(" \n ", "hello"));
    }

    #[test]
    fn snapshots_carry_a_plausible_timestamp() {
        let platform = FakePlatform::new("");
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&stamps);
        let mut watcher = ClipboardWatcher::new(platform.clone());
        watcher.start_monitoring(10, move |snap| {
            sink.lock().unwrap().push(snap.observed_at_ms);
        });
        let before = epoch_ms();
        platform.set("stamped");
        wait_for(|| !stamps.lock().unwrap().is_empty());
        watcher.stop_monitoring();
        let stamp = stamps.lock().unwrap()[0];
        assert!(stamp >= before, "stamp {stamp} predates start {before}");
        assert!(stamp <= epoch_ms(), "stamp {stamp} is in the future");
    }
}
