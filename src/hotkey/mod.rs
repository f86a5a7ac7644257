//! Hotkey module for global keyboard event listening
//!
//! Captures key transitions system-wide through a pluggable
//! [`EventSource`] and matches them against the registered
//! [`HotkeyCombination`].

mod keys;
mod matcher;
mod source;
mod x11;

#[cfg(test)]
pub(crate) mod scripted;

pub use keys::{
    keysyms, HeldModifiers, HotkeyCombination, KeyCode, Modifier, ModifierState,
    ParseHotkeyError,
};
pub use matcher::matches;
pub use source::{
    detect_source, EventSource, Hook, HookError, KeyEvent, StreamError, UnsupportedSource,
};
pub use x11::X11Source;
