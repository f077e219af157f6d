use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_ID: AtomicU64 = AtomicU64::new(0);

/// Fresh id for a capture round. Wall-clock millis, bumped past the previous
/// id so two clicks in the same millisecond still get distinct increasing ids.
pub fn next_request_id() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let mut prev = LAST_ID.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_ID.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

#[derive(Debug)]
struct Capture {
    request_id: u64,
    text: String,
}

/// Single-slot mailbox between the clipboard capture thread and the UI poll.
/// Holds at most the newest capture; the UI either consumes it or, if it was
/// left over from a superseded click, throws it away.
#[derive(Debug, Default)]
pub struct HandoffStore {
    slot: Mutex<Option<Capture>>,
}

impl HandoffStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest capture wins; an unconsumed older capture is overwritten.
    pub fn publish(&self, request_id: u64, text: String) {
        let mut slot = self.slot.lock().unwrap();
        *slot = Some(Capture { request_id, text });
    }

    /// Empty the slot and return the text only when the capture answers
    /// `request_id`. A capture for any other id is stale and gets dropped so
    /// it can never satisfy a later click.
    pub fn take_if(&self, request_id: u64) -> Option<String> {
        let mut slot = self.slot.lock().unwrap();
        match slot.take() {
            Some(capture) if capture.request_id == request_id => Some(capture.text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn matching_take_consumes_the_capture() {
        let store = HandoffStore::new();
        store.publish(7, "copied".to_string());
        assert_eq!(store.take_if(7), Some("copied".to_string()));
        assert_eq!(store.take_if(7), None);
    }

    #[test]
    fn mismatched_take_discards_the_stale_capture() {
        let store = HandoffStore::new();
        store.publish(1, "old".to_string());
        assert_eq!(store.take_if(2), None);
        // The stale capture is gone, not waiting to ambush a later poll.
        assert_eq!(store.take_if(1), None);
    }

    #[test]
    fn later_publish_overwrites_unconsumed_capture() {
        let store = HandoffStore::new();
        store.publish(1, "old".to_string());
        store.publish(2, "new".to_string());
        assert_eq!(store.take_if(2), Some("new".to_string()));
    }

    #[test]
    fn ids_strictly_increase() {
        let mut prev = next_request_id();
        for _ in 0..200 {
            let id = next_request_id();
            assert!(id > prev, "{id} should be greater than {prev}");
            prev = id;
        }
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let seen: Arc<Mutex<HashSet<u64>>> = Arc::new(Mutex::new(HashSet::new()));
        let mut workers = Vec::new();
        for _ in 0..4 {
            let seen = Arc::clone(&seen);
            workers.push(thread::spawn(move || {
                for _ in 0..50 {
                    let id = next_request_id();
                    assert!(seen.lock().unwrap().insert(id), "duplicate id {id}");
                }
            }));
        }
        for w in workers {
            w.join().expect("id thread");
        }
        assert_eq!(seen.lock().unwrap().len(), 200);
    }
}
