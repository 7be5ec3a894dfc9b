//! Popup window lifecycle control
//!
//! Opens a fixed-size child browser window at the provider's authorize URL,
//! detects the user closing it, and force-closes it on terminal transitions.
//! Browsers expose no reliable cross-origin "window closed" event, so closure
//! is detected by polling [`CLOSE_POLL_INTERVAL`]; that interval bounds how
//! long a cancelled attempt can linger.

use ab_types::{AppError, AppResult};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tracing::{debug, warn};

/// Popup window width in pixels
pub const POPUP_WIDTH: i32 = 600;

/// Popup window height in pixels
pub const POPUP_HEIGHT: i32 = 700;

/// How often the controller polls for a manually closed popup
pub const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Outer geometry of the opener window, used to center the popup
///
/// Centering uses the opener's own size and screen offset, not the popup's
/// geometry: the popup is blank until navigation completes and reports
/// nothing useful about itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenerMetrics {
    pub outer_width: i32,
    pub outer_height: i32,
    pub screen_x: i32,
    pub screen_y: i32,
}

/// Computed placement for the popup window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupGeometry {
    pub width: i32,
    pub height: i32,
    pub left: i32,
    pub top: i32,
}

impl PopupGeometry {
    /// Center a [`POPUP_WIDTH`]×[`POPUP_HEIGHT`] window over the opener.
    pub fn centered_on(opener: &OpenerMetrics) -> Self {
        Self {
            width: POPUP_WIDTH,
            height: POPUP_HEIGHT,
            left: opener.outer_width / 2 + opener.screen_x - POPUP_WIDTH / 2,
            top: opener.outer_height / 2 + opener.screen_y - POPUP_HEIGHT / 2,
        }
    }
}

/// A live popup window handle
pub trait PopupWindow: Send {
    /// Whether the window is gone or reports itself closed.
    fn is_closed(&mut self) -> bool;

    /// Force-close the window. Safe to call on an already-closed handle.
    fn close(&mut self);
}

/// Opens popup windows; injected into the orchestrator so tests can
/// substitute a double
pub trait PopupDriver: Send + Sync {
    /// Open a popup at `url` with the given placement.
    ///
    /// An error means the environment refused to open the window (the
    /// popup-blocked case) and must surface to the user, never fail silently.
    fn open(&self, url: &str, geometry: &PopupGeometry) -> AppResult<Box<dyn PopupWindow>>;
}

/// [`PopupDriver`] that spawns a browser child process in app-window mode
///
/// The child process doubles as the window handle: the process exiting is
/// the only portable signal that the user closed the window.
#[derive(Debug, Clone)]
pub struct BrowserPopupDriver {
    program: String,
    /// Argument templates; `{url}`, `{width}`, `{height}`, `{left}` and
    /// `{top}` are substituted at open time.
    args: Vec<String>,
}

impl BrowserPopupDriver {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Driver for Chromium-family browsers (`--app` strips the browser
    /// chrome, giving a plain popup window).
    pub fn chromium(program: impl Into<String>) -> Self {
        Self::new(
            program,
            vec![
                "--app={url}".to_string(),
                "--window-size={width},{height}".to_string(),
                "--window-position={left},{top}".to_string(),
            ],
        )
    }

    fn render_args(&self, url: &str, geometry: &PopupGeometry) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{url}", url)
                    .replace("{width}", &geometry.width.to_string())
                    .replace("{height}", &geometry.height.to_string())
                    .replace("{left}", &geometry.left.to_string())
                    .replace("{top}", &geometry.top.to_string())
            })
            .collect()
    }
}

impl PopupDriver for BrowserPopupDriver {
    fn open(&self, url: &str, geometry: &PopupGeometry) -> AppResult<Box<dyn PopupWindow>> {
        let args = self.render_args(url, geometry);
        debug!("Opening popup window: {} {:?}", self.program, args);

        let child = Command::new(&self.program)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AppError::Popup(format!("Failed to open popup window: {}", e)))?;

        Ok(Box::new(BrowserPopup { child }))
    }
}

struct BrowserPopup {
    child: Child,
}

impl PopupWindow for BrowserPopup {
    fn is_closed(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                // Cannot observe the process anymore; treat as closed so the
                // attempt terminates instead of hanging.
                warn!("Popup process state unavailable: {}", e);
                true
            }
        }
    }

    fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.child.kill() {
            warn!("Failed to close popup window: {}", e);
        }
        let _ = self.child.wait();
    }
}
