use crate::handoff::{next_request_id, HandoffStore};

pub const BUBBLE_SIZE: f32 = 56.0;
pub const PANEL_W: f32 = 280.0;
pub const PANEL_H: f32 = 200.0;
pub const MARGIN: f32 = 8.0;
pub const CLICK_THRESHOLD: f32 = 10.0;
pub const INITIAL_POS: (f32, f32) = (16.0, 200.0);

/// How often the UI re-polls the handoff store while a capture is pending.
pub const CAPTURE_POLL_MS: u64 = 100;
/// A capture that produced nothing after this long is abandoned.
pub const CAPTURE_TIMEOUT_MS: u64 = 10_000;
/// How long the error badge stays before the bubble returns to idle.
pub const ERROR_DECAY_MS: u64 = 5_000;

/// Badge shown on the bubble. Step1 through Step5 trace the click-to-result
/// pipeline; Translating covers jobs started from the main panel or watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleStatus {
    Idle,
    Step1,
    Step2,
    Step3,
    Step4,
    Step5,
    Translating,
    Done,
    Fallback,
    Error,
}

impl BubbleStatus {
    pub fn label(self) -> &'static str {
        match self {
            BubbleStatus::Idle => "T",
            BubbleStatus::Step1 => "1",
            BubbleStatus::Step2 => "2",
            BubbleStatus::Step3 => "3",
            BubbleStatus::Step4 => "4",
            BubbleStatus::Step5 => "5",
            BubbleStatus::Translating => "...",
            BubbleStatus::Done => "OK",
            BubbleStatus::Fallback => "F",
            BubbleStatus::Error => "E",
        }
    }

    pub fn color(self) -> (u8, u8, u8) {
        match self {
            BubbleStatus::Idle => (33, 150, 243),
            BubbleStatus::Step1 => (255, 152, 0),
            BubbleStatus::Step2 => (255, 193, 7),
            BubbleStatus::Step3 => (76, 175, 80),
            BubbleStatus::Step4 => (156, 39, 176),
            BubbleStatus::Step5 => (0, 188, 212),
            BubbleStatus::Translating => (156, 39, 176),
            BubbleStatus::Done => (76, 175, 80),
            BubbleStatus::Fallback => (233, 30, 99),
            BubbleStatus::Error => (244, 67, 54),
        }
    }
}

/// What a finished press turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    Click,
    Drag,
}

/// Result of one handoff-store poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturePoll {
    Idle,
    Waiting,
    Captured { request_id: u64, text: String },
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingCapture { deadline_ms: u64 },
    Captured,
    AwaitingTranslation,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    request_id: u64,
    phase: Phase,
}

#[derive(Debug, Clone, Copy)]
struct Press {
    start: (f32, f32),
    origin: (f32, f32),
    dragging: bool,
}

/// Owns every visual decision for the floating bubble: drag versus click,
/// badge progression, panel placement, and which asynchronous result is still
/// welcome. Pure state, driven entirely from the UI thread; background work
/// reaches it only through request-id checked calls.
#[derive(Debug)]
pub struct BubbleMachine {
    visible: bool,
    status: BubbleStatus,
    pos: (f32, f32),
    press: Option<Press>,
    panel_open: bool,
    panel_text: String,
    in_flight: Option<InFlight>,
    pending_fallback_read: bool,
    fallback_raise: bool,
    error_since_ms: Option<u64>,
}

impl BubbleMachine {
    pub fn new() -> Self {
        Self {
            visible: false,
            status: BubbleStatus::Idle,
            pos: INITIAL_POS,
            press: None,
            panel_open: false,
            panel_text: String::new(),
            in_flight: None,
            pending_fallback_read: false,
            fallback_raise: false,
            error_since_ms: None,
        }
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if !visible {
            self.panel_open = false;
            self.press = None;
        }
    }

    pub fn status(&self) -> BubbleStatus {
        self.status
    }

    pub fn pos(&self) -> (f32, f32) {
        self.pos
    }

    pub fn panel_open(&self) -> bool {
        self.panel_open
    }

    pub fn panel_text(&self) -> &str {
        &self.panel_text
    }

    pub fn close_panel(&mut self) {
        self.panel_open = false;
    }

    pub fn awaiting_capture(&self) -> bool {
        matches!(
            self.in_flight,
            Some(InFlight { phase: Phase::AwaitingCapture { .. }, .. })
        )
    }

    pub fn busy(&self) -> bool {
        self.in_flight.is_some()
    }

    // ---- pointer handling -------------------------------------------------

    pub fn press_started(&mut self, x: f32, y: f32) {
        self.press = Some(Press { start: (x, y), origin: self.pos, dragging: false });
    }

    pub fn pointer_moved(&mut self, x: f32, y: f32) {
        let Some(press) = self.press.as_mut() else {
            return;
        };
        let dx = x - press.start.0;
        let dy = y - press.start.1;
        if !press.dragging && (dx * dx + dy * dy).sqrt() > CLICK_THRESHOLD {
            press.dragging = true;
            // Repositioning dismisses the panel.
            self.panel_open = false;
        }
        if press.dragging {
            self.pos = (
                (press.origin.0 + dx).max(0.0),
                (press.origin.1 + dy).max(0.0),
            );
        }
    }

    pub fn press_finished(&mut self) -> Option<PressOutcome> {
        let press = self.press.take()?;
        Some(if press.dragging { PressOutcome::Drag } else { PressOutcome::Click })
    }

    /// Panel x/y for the current bubble position: to the right when the
    /// screen still has room there, otherwise flipped to the left edge.
    pub fn panel_anchor(&self, screen_w: f32) -> (f32, f32) {
        let (x, y) = self.pos;
        if x + BUBBLE_SIZE + PANEL_W + 10.0 < screen_w {
            (x + BUBBLE_SIZE + MARGIN, y)
        } else {
            ((x - PANEL_W - MARGIN).max(MARGIN), y)
        }
    }

    // ---- capture and translation flow -------------------------------------

    /// A click closes any open panel and opens a new capture round, returning
    /// its request id. Issuing a new id orphans whatever round was still
    /// pending, so any late result gets discarded.
    pub fn begin_click(&mut self, now_ms: u64) -> u64 {
        self.panel_open = false;
        let request_id = next_request_id();
        self.in_flight = Some(InFlight {
            request_id,
            phase: Phase::AwaitingCapture { deadline_ms: now_ms + CAPTURE_TIMEOUT_MS },
        });
        self.status = BubbleStatus::Step1;
        self.error_since_ms = None;
        self.pending_fallback_read = false;
        self.fallback_raise = false;
        request_id
    }

    pub fn capture_launched(&mut self) {
        if self.status == BubbleStatus::Step1 {
            self.status = BubbleStatus::Step2;
        }
    }

    /// Helper surface refused to launch. The primary window takes over: it
    /// gets foregrounded by the shell and services the read on next focus.
    pub fn capture_failed(&mut self) {
        if self.awaiting_capture() {
            self.status = BubbleStatus::Fallback;
            self.pending_fallback_read = true;
            self.fallback_raise = true;
        }
    }

    /// True exactly once per fallback entry. The shell raises the main window
    /// on that one frame instead of re-sending viewport commands every frame.
    pub fn take_fallback_raise(&mut self) -> bool {
        let raise = self.fallback_raise;
        self.fallback_raise = false;
        raise
    }

    pub fn pending_fallback(&self) -> bool {
        self.pending_fallback_read
    }

    pub fn take_pending_fallback(&mut self) -> Option<u64> {
        if !self.pending_fallback_read {
            return None;
        }
        self.pending_fallback_read = false;
        self.in_flight.map(|f| f.request_id)
    }

    /// One poll of the handoff store. Consumes a capture published for the
    /// current round, keeps waiting otherwise, and abandons the round once
    /// the deadline passes.
    pub fn poll_capture(&mut self, store: &HandoffStore, now_ms: u64) -> CapturePoll {
        let Some(flight) = self.in_flight else {
            return CapturePoll::Idle;
        };
        let Phase::AwaitingCapture { deadline_ms } = flight.phase else {
            return CapturePoll::Idle;
        };
        if let Some(text) = store.take_if(flight.request_id) {
            self.status = BubbleStatus::Step3;
            self.in_flight = Some(InFlight { request_id: flight.request_id, phase: Phase::Captured });
            return CapturePoll::Captured { request_id: flight.request_id, text };
        }
        if now_ms >= deadline_ms {
            self.in_flight = None;
            self.pending_fallback_read = false;
            self.fallback_raise = false;
            self.enter_error(now_ms);
            return CapturePoll::TimedOut;
        }
        CapturePoll::Waiting
    }

    /// Captured text was handed to the worker.
    pub fn translation_submitted(&mut self) {
        if let Some(flight) = self.in_flight.as_mut() {
            if flight.phase == Phase::Captured {
                flight.phase = Phase::AwaitingTranslation;
                self.status = BubbleStatus::Step4;
            }
        }
    }

    /// A job that started from the main panel or the watcher, not from a
    /// bubble click. Same at-most-one-in-flight rule, busier-looking badge.
    pub fn begin_background(&mut self) -> u64 {
        let request_id = next_request_id();
        self.in_flight = Some(InFlight { request_id, phase: Phase::AwaitingTranslation });
        self.status = BubbleStatus::Translating;
        self.error_since_ms = None;
        self.pending_fallback_read = false;
        self.fallback_raise = false;
        request_id
    }

    /// Accept a finished translation if it answers the current round. Stale
    /// ids are dropped without touching any state. Returns whether the text
    /// was accepted.
    pub fn render_result(&mut self, request_id: u64, text: &str) -> bool {
        match self.in_flight {
            Some(flight) if flight.request_id == request_id => {
                self.in_flight = None;
                self.status = BubbleStatus::Step5;
                self.panel_text = text.to_string();
                if self.visible {
                    self.panel_open = true;
                }
                true
            }
            _ => false,
        }
    }

    /// Mark the current round failed. Stale ids are dropped the same way as
    /// in `render_result`. Returns whether the failure was for the current
    /// round (callers toast only in that case).
    pub fn fail(&mut self, request_id: u64, now_ms: u64) -> bool {
        match self.in_flight {
            Some(flight) if flight.request_id == request_id => {
                self.in_flight = None;
                self.pending_fallback_read = false;
                self.fallback_raise = false;
                self.enter_error(now_ms);
                true
            }
            _ => false,
        }
    }

    /// Frame upkeep: the one-frame Step5 badge settles into Done, and the
    /// error badge decays back to idle after a few seconds.
    pub fn tick(&mut self, now_ms: u64) {
        if self.status == BubbleStatus::Step5 {
            self.status = BubbleStatus::Done;
        }
        if let Some(since) = self.error_since_ms {
            if now_ms.saturating_sub(since) >= ERROR_DECAY_MS {
                self.status = BubbleStatus::Idle;
                self.error_since_ms = None;
            }
        }
    }

    fn enter_error(&mut self, now_ms: u64) {
        self.status = BubbleStatus::Error;
        self.error_since_ms = Some(now_ms);
    }
}

impl Default for BubbleMachine {
    fn default() -> Self {
        Self::new()
    }
}
