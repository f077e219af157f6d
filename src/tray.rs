use crossbeam_channel::Receiver;

use crate::logger;
use crate::queue::UiQueueHandle;
#[cfg(windows)]
use crate::queue::{AppEvent, TrayAction};

pub const TRAY_TOOLTIP: &str = "ScholarTrans";

/// Foreground-notification lifecycle, rendered as the tray tooltip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyCommand {
    Start { title: String, text: String },
    Update { text: String },
    Stop,
}

#[cfg(windows)]
pub struct TrayHandle {
    tray: tray_icon::TrayIcon,
    menu_event_rx: Receiver<tray_icon::menu::MenuEvent>,
    tray_event_rx: Receiver<tray_icon::TrayIconEvent>,
    settings_item: tray_icon::menu::MenuItem,
    quit_item: tray_icon::menu::MenuItem,
    ui: UiQueueHandle,
    notify_rx: Receiver<NotifyCommand>,
    title: String,
}

#[cfg(windows)]
impl TrayHandle {
    pub fn new(ui: UiQueueHandle, notify_rx: Receiver<NotifyCommand>) -> anyhow::Result<Self> {
        use tray_icon::menu::{Menu, MenuEvent, MenuItem, PredefinedMenuItem};
        use tray_icon::{Icon, TrayIconBuilder, TrayIconEvent};

        let menu = Menu::new();
        // Plain ASCII labels to avoid any shell/encoding quirks
        let settings = MenuItem::new("Settings...", true, None);
        let quit = MenuItem::new("Quit", true, None);
        let sep = PredefinedMenuItem::separator();
        menu.append_items(&[&settings, &sep, &quit])?;

        // tiny 16x16 dot in the bubble's idle blue
        let (icon_w, icon_h) = (16usize, 16usize);
        let mut rgba = vec![0u8; icon_w * icon_h * 4];
        for px in rgba.chunks_exact_mut(4) {
            px[0] = 33;
            px[1] = 150;
            px[2] = 243;
            px[3] = 0xFF;
        }
        let icon = Icon::from_rgba(rgba, icon_w as u32, icon_h as u32)?;

        let tray = TrayIconBuilder::new()
            .with_tooltip(TRAY_TOOLTIP)
            .with_menu(Box::new(menu))
            .with_icon(icon)
            .build()?;

        Ok(Self {
            tray,
            menu_event_rx: MenuEvent::receiver().clone(),
            tray_event_rx: TrayIconEvent::receiver().clone(),
            settings_item: settings,
            quit_item: quit,
            ui,
            notify_rx,
            title: TRAY_TOOLTIP.to_string(),
        })
    }

    /// Non-blocking poll of menu clicks, icon clicks and tooltip updates.
    pub fn pump(&mut self) {
        while let Ok(event) = self.menu_event_rx.try_recv() {
            let id = event.id;
            if id == self.quit_item.id() {
                logger::log("tray: Quit clicked");
                self.ui.post(AppEvent::Tray(TrayAction::Quit));
            } else if id == self.settings_item.id() {
                logger::log("tray: Settings clicked");
                self.ui.post(AppEvent::Tray(TrayAction::OpenSettings));
            }
        }
        while let Ok(event) = self.tray_event_rx.try_recv() {
            match event.click_type {
                tray_icon::ClickType::Left | tray_icon::ClickType::Double => {
                    logger::log("tray: left-click, showing window");
                    self.ui.post(AppEvent::Tray(TrayAction::ShowWindow));
                }
                _ => {}
            }
        }
        while let Ok(cmd) = self.notify_rx.try_recv() {
            match cmd {
                NotifyCommand::Start { title, text } => {
                    self.title = title;
                    let _ = self.tray.set_tooltip(Some(format!("{}\n{}", self.title, text)));
                }
                NotifyCommand::Update { text } => {
                    let _ = self.tray.set_tooltip(Some(format!("{}\n{}", self.title, text)));
                }
                NotifyCommand::Stop => {
                    self.title = TRAY_TOOLTIP.to_string();
                    let _ = self.tray.set_tooltip(Some(TRAY_TOOLTIP));
                }
            }
        }
    }
}

/// Tray icon and pump on a dedicated thread; the handle is not Send, so it
/// is created and driven entirely on that thread.
#[cfg(windows)]
pub fn run_tray_thread(ui: UiQueueHandle, notify_rx: Receiver<NotifyCommand>) {
    std::thread::spawn(move || {
        match TrayHandle::new(ui, notify_rx) {
            Ok(mut tray) => {
                logger::log("tray created");
                use windows::Win32::Foundation::HWND;
                use windows::Win32::UI::WindowsAndMessaging as wm;
                // Windows message pump on the tray thread so clicks and menus work
                loop {
                    unsafe {
                        let mut msg = wm::MSG::default();
                        while wm::PeekMessageW(&mut msg, HWND(std::ptr::null_mut()), 0, 0, wm::PM_REMOVE)
                            .into()
                        {
                            let _ = wm::TranslateMessage(&msg);
                            wm::DispatchMessageW(&msg);
                        }
                    }
                    tray.pump();
                    std::thread::sleep(std::time::Duration::from_millis(25));
                }
            }
            Err(e) => logger::log(&format!("tray failed: {e}")),
        }
    });
}

/// No tray off Windows. Keep draining tooltip updates so notification
/// senders never see a closed channel.
#[cfg(not(windows))]
pub fn run_tray_thread(_ui: UiQueueHandle, notify_rx: Receiver<NotifyCommand>) {
    logger::log("tray disabled on this platform");
    std::thread::spawn(move || while notify_rx.recv().is_ok() {});
}
