//! Hotkey matching
//!
//! A combination fires on the press of its key while at least its
//! modifiers are held. Extra held modifiers are allowed: Super+Alt+W
//! still fires while Shift is also down. Releases never fire.

use super::keys::HotkeyCombination;
use super::source::KeyEvent;

/// Whether `event` completes `combination`
pub fn matches(combination: &HotkeyCombination, event: &KeyEvent) -> bool {
    event.is_press
        && event.key_code == combination.key_code()
        && event.modifier_state.contains(&combination.modifiers())
}
