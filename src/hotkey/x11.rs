//! Global key monitoring on X11 via XInput2 raw events
//!
//! Raw key events are selected on the root window for every master
//! device, so they arrive regardless of which window has focus and are
//! never consumed. Raw events carry no modifier state; the hook derives
//! it from modifier key transitions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, info, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::{ConnectError, ReplyError};
use x11rb::protocol::xinput::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{
    AtomEnum, ClientMessageEvent, ConnectionExt as _, CreateWindowAux, EventMask, Window,
    WindowClass,
};
use x11rb::protocol::{ErrorKind, Event};
use x11rb::rust_connection::RustConnection;

use super::keys::{HeldModifiers, KeyCode};
use super::source::{EventSource, Hook, HookError, KeyEvent, StreamError};

/// XIAllMasterDevices
const ALL_MASTER_DEVICES: u16 = 1;

const REQUESTED_XI_VERSION: (u16, u16) = (2, 2);
const MIN_XI_VERSION: (u16, u16) = (2, 1);

/// Event source backed by an X11 display connection
#[derive(Debug, Clone, Default)]
pub struct X11Source {
    display: Option<String>,
}

impl X11Source {
    /// `None` connects to `$DISPLAY`
    pub fn new(display: Option<String>) -> Self {
        Self { display }
    }
}

impl EventSource for X11Source {
    fn name(&self) -> &'static str {
        "x11"
    }

    fn open(&mut self) -> Result<Arc<dyn Hook>, HookError> {
        let hook = X11Hook::connect(self.display.as_deref())?;
        Ok(Arc::new(hook))
    }
}

/// Keycode to keysym table from the server's keyboard mapping
#[derive(Debug, Clone, Default)]
struct Keymap {
    min_keycode: u8,
    keysyms_per_keycode: usize,
    keysyms: Vec<u32>,
}

impl Keymap {
    fn load(conn: &RustConnection) -> Result<Self, ReplyError> {
        let setup = conn.setup();
        let min_keycode = setup.min_keycode;
        let count = setup.max_keycode - min_keycode + 1;
        let reply = conn.get_keyboard_mapping(min_keycode, count)?.reply()?;

        Ok(Self {
            min_keycode,
            keysyms_per_keycode: usize::from(reply.keysyms_per_keycode),
            keysyms: reply.keysyms,
        })
    }

    /// First non-empty keysym of the key's unshifted levels, or 0 (NoSymbol)
    fn keysym(&self, keycode: u32) -> u32 {
        let Some(index) = keycode.checked_sub(u32::from(self.min_keycode)) else {
            return 0;
        };
        let start = index as usize * self.keysyms_per_keycode;
        self.keysyms
            .iter()
            .skip(start)
            .take(self.keysyms_per_keycode.min(2))
            .copied()
            .find(|&sym| sym != 0)
            .unwrap_or(0)
    }
}

struct Tracker {
    keymap: Keymap,
    held: HeldModifiers,
}

/// An installed XInput2 raw key hook
struct X11Hook {
    conn: RustConnection,
    /// Input-only window that receives the wake-up message on close
    wake_window: Window,
    closed: AtomicBool,
    tracker: Mutex<Tracker>,
}

impl X11Hook {
    fn connect(display: Option<&str>) -> Result<Self, HookError> {
        let (conn, screen_num) = x11rb::connect(display).map_err(|err| match err {
            ConnectError::SetupAuthenticate(_) | ConnectError::SetupFailed(_) => {
                HookError::PermissionDenied(format!("X server refused connection: {err}"))
            }
            other => HookError::Unsupported(format!("cannot connect to X11 display: {other}")),
        })?;

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| HookError::Unsupported(format!("no X11 screen {screen_num}")))?;

        let has_xinput = conn
            .extension_information(xinput::X11_EXTENSION_NAME)
            .map_err(|e| HookError::Unsupported(e.to_string()))?
            .is_some();
        if !has_xinput {
            return Err(HookError::Unsupported(
                "XInputExtension is not available".to_string(),
            ));
        }

        let version = conn
            .xinput_xi_query_version(REQUESTED_XI_VERSION.0, REQUESTED_XI_VERSION.1)
            .map_err(|e| HookError::Unsupported(e.to_string()))?
            .reply()
            .map_err(|e| HookError::Unsupported(e.to_string()))?;
        check_xinput_version(version.major_version, version.minor_version)?;

        let keymap = Keymap::load(&conn).map_err(|e| HookError::Unsupported(e.to_string()))?;

        let wake_window = conn
            .generate_id()
            .map_err(|e| HookError::Unsupported(e.to_string()))?;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            wake_window,
            root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new(),
        )
        .map_err(|e| HookError::Unsupported(e.to_string()))?
        .check()
        .map_err(classify_reply_error)?;

        let mask = xinput::EventMask {
            deviceid: ALL_MASTER_DEVICES,
            mask: vec![xinput::XIEventMask::RAW_KEY_PRESS | xinput::XIEventMask::RAW_KEY_RELEASE],
        };
        conn.xinput_xi_select_events(root, &[mask])
            .map_err(|e| HookError::Unsupported(e.to_string()))?
            .check()
            .map_err(classify_reply_error)?;

        info!(
            xinput_major = version.major_version,
            xinput_minor = version.minor_version,
            "X11 raw key hook installed"
        );

        Ok(Self {
            conn,
            wake_window,
            closed: AtomicBool::new(false),
            tracker: Mutex::new(Tracker {
                keymap,
                held: HeldModifiers::new(),
            }),
        })
    }

    fn translate(&self, keycode: u32, is_press: bool) -> KeyEvent {
        let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
        let keysym = tracker.keymap.keysym(keycode);
        let modifier_state = tracker.held.update(keycode, keysym, is_press);

        KeyEvent {
            key_code: KeyCode::from_keysym(keysym),
            is_press,
            modifier_state,
            timestamp: Instant::now(),
        }
    }

    fn refresh_keymap(&self) {
        match Keymap::load(&self.conn) {
            Ok(keymap) => {
                let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
                tracker.keymap = keymap;
                tracker.held.clear();
                debug!("keyboard mapping reloaded");
            }
            Err(e) => warn!(error = %e, "failed to reload keyboard mapping"),
        }
    }
}

impl Hook for X11Hook {
    fn read_next(&self) -> Result<KeyEvent, StreamError> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(StreamError::Closed);
            }

            let event = match self.conn.wait_for_event() {
                Ok(event) => event,
                Err(_) if self.closed.load(Ordering::SeqCst) => return Err(StreamError::Closed),
                Err(e) => return Err(StreamError::Other(e.to_string())),
            };

            match event {
                Event::XinputRawKeyPress(ev) => return Ok(self.translate(ev.detail, true)),
                Event::XinputRawKeyRelease(ev) => return Ok(self.translate(ev.detail, false)),
                Event::MappingNotify(_) => self.refresh_keymap(),
                Event::Error(e) => debug!(error = ?e, "X11 error on hook connection"),
                _ => {}
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let wake = ClientMessageEvent::new(32, self.wake_window, AtomEnum::NONE, [0u32; 5]);
        let sent = self
            .conn
            .send_event(false, self.wake_window, EventMask::NO_EVENT, wake)
            .and_then(|_| self.conn.flush());
        if let Err(e) = sent {
            // A dead connection has already unblocked the reader.
            debug!(error = %e, "failed to wake hook reader");
        }
    }
}

impl Drop for X11Hook {
    fn drop(&mut self) {
        let _ = self.conn.destroy_window(self.wake_window);
        let _ = self.conn.flush();
        debug!("X11 hook released");
    }
}

fn classify_reply_error(err: ReplyError) -> HookError {
    match err {
        ReplyError::X11Error(ref e) if e.error_kind == ErrorKind::Access => {
            HookError::PermissionDenied(format!("{err:?}"))
        }
        other => HookError::Unsupported(format!("{other:?}")),
    }
}

/// Raw events keep flowing during another client's grab only from XI 2.1 on
fn check_xinput_version(major: u16, minor: u16) -> Result<(), HookError> {
    if (major, minor) < MIN_XI_VERSION {
        return Err(HookError::Unsupported(format!(
            "XInput {major}.{minor} drops raw key events during grabs, need {}.{}",
            MIN_XI_VERSION.0, MIN_XI_VERSION.1
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::keys::keysyms;

    fn keymap() -> Keymap {
        // keycodes 8..=11, two levels each
        Keymap {
            min_keycode: 8,
            keysyms_per_keycode: 2,
            keysyms: vec![
                0x77, 0x57, // 8: w W
                keysyms::SUPER_L, 0, // 9
                0, 0x31, // 10: NoSymbol, 1
                0, 0, // 11: unmapped
            ],
        }
    }

    #[test]
    fn test_keymap_first_level() {
        let map = keymap();
        assert_eq!(map.keysym(8), 0x77);
        assert_eq!(map.keysym(9), keysyms::SUPER_L);
    }

    #[test]
    fn test_keymap_falls_back_to_second_level() {
        assert_eq!(keymap().keysym(10), 0x31);
    }

    #[test]
    fn test_keymap_out_of_range() {
        let map = keymap();
        assert_eq!(map.keysym(11), 0);
        assert_eq!(map.keysym(3), 0);
        assert_eq!(map.keysym(200), 0);
    }

    #[test]
    fn test_xinput_version_needs_grab_safe_raw_events() {
        assert!(check_xinput_version(2, 2).is_ok());
        assert!(check_xinput_version(2, 1).is_ok());
        assert!(check_xinput_version(3, 0).is_ok());

        for (major, minor) in [(2, 0), (1, 5)] {
            match check_xinput_version(major, minor) {
                Err(HookError::Unsupported(msg)) => assert!(msg.contains("2.1")),
                other => panic!("XInput {major}.{minor} accepted: {other:?}"),
            }
        }
    }

    #[test]
    fn test_open_without_display_is_unsupported() {
        let mut source = X11Source::new(Some("invalid-display-name".to_string()));
        match source.open() {
            Err(HookError::Unsupported(_)) | Err(HookError::PermissionDenied(_)) => {}
            Ok(_) => panic!("connected to a bogus display"),
        }
    }
}
