//! Key and modifier definitions
//!
//! Provides the modifier set carried by every key event, the
//! layout-independent key code, and the registered hotkey combination
//! with its textual form (`super+alt+w`).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// X11 keysym values used for modifiers and named keys
pub mod keysyms {
    pub const SPACE: u32 = 0x0020;
    pub const TAB: u32 = 0xff09;
    pub const RETURN: u32 = 0xff0d;
    pub const ESCAPE: u32 = 0xff1b;
    pub const F1: u32 = 0xffbe;

    pub const SHIFT_L: u32 = 0xffe1;
    pub const SHIFT_R: u32 = 0xffe2;
    pub const CONTROL_L: u32 = 0xffe3;
    pub const CONTROL_R: u32 = 0xffe4;
    pub const META_L: u32 = 0xffe7;
    pub const META_R: u32 = 0xffe8;
    pub const ALT_L: u32 = 0xffe9;
    pub const ALT_R: u32 = 0xffea;
    pub const SUPER_L: u32 = 0xffeb;
    pub const SUPER_R: u32 = 0xffec;
}

/// A single modifier key class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Super,
    Alt,
    Shift,
    Control,
}

impl Modifier {
    /// All modifiers, in display order
    pub const ALL: [Modifier; 4] = [
        Modifier::Super,
        Modifier::Alt,
        Modifier::Shift,
        Modifier::Control,
    ];

    /// Classify a keysym as a modifier key, if it is one
    pub fn from_keysym(keysym: u32) -> Option<Self> {
        match keysym {
            keysyms::SUPER_L | keysyms::SUPER_R => Some(Modifier::Super),
            keysyms::ALT_L | keysyms::ALT_R | keysyms::META_L | keysyms::META_R => {
                Some(Modifier::Alt)
            }
            keysyms::SHIFT_L | keysyms::SHIFT_R => Some(Modifier::Shift),
            keysyms::CONTROL_L | keysyms::CONTROL_R => Some(Modifier::Control),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "super" | "win" | "mod4" | "logo" => Some(Modifier::Super),
            "alt" | "mod1" | "meta" => Some(Modifier::Alt),
            "shift" => Some(Modifier::Shift),
            "ctrl" | "control" => Some(Modifier::Control),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Modifier::Super => "super",
            Modifier::Alt => "alt",
            Modifier::Shift => "shift",
            Modifier::Control => "ctrl",
        }
    }
}

/// Tracks which modifier keys are currently held
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModifierState {
    /// Super/Windows key is held
    pub super_key: bool,
    /// Alt (or Meta) key is held
    pub alt: bool,
    /// Shift key is held
    pub shift: bool,
    /// Control key is held
    pub control: bool,
}

impl ModifierState {
    /// Build a state holding exactly the given modifiers
    pub fn of(modifiers: &[Modifier]) -> Self {
        let mut state = Self::default();
        for &modifier in modifiers {
            state.set(modifier, true);
        }
        state
    }

    pub fn is_held(&self, modifier: Modifier) -> bool {
        match modifier {
            Modifier::Super => self.super_key,
            Modifier::Alt => self.alt,
            Modifier::Shift => self.shift,
            Modifier::Control => self.control,
        }
    }

    pub fn set(&mut self, modifier: Modifier, held: bool) {
        match modifier {
            Modifier::Super => self.super_key = held,
            Modifier::Alt => self.alt = held,
            Modifier::Shift => self.shift = held,
            Modifier::Control => self.control = held,
        }
    }

    /// Check if all modifiers are released
    pub fn is_empty(&self) -> bool {
        !self.super_key && !self.alt && !self.shift && !self.control
    }

    /// True when every modifier held in `other` is also held here
    pub fn contains(&self, other: &ModifierState) -> bool {
        Modifier::ALL
            .iter()
            .all(|&m| !other.is_held(m) || self.is_held(m))
    }

    /// Held modifiers, in display order
    pub fn iter(&self) -> impl Iterator<Item = Modifier> + '_ {
        Modifier::ALL.into_iter().filter(|&m| self.is_held(m))
    }
}

/// Layout-independent key identity (the key's unshifted X11 keysym)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(u32);

impl KeyCode {
    /// Wrap a keysym, folding Latin capitals to lower case
    pub fn from_keysym(keysym: u32) -> Self {
        match keysym {
            0x41..=0x5a => Self(keysym + 0x20),
            _ => Self(keysym),
        }
    }

    pub fn keysym(self) -> u32 {
        self.0
    }

    /// Look up a key by its configuration name
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        let mut chars = name.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                return Some(Self(c as u32));
            }
        }

        let keysym = match name.as_str() {
            "space" => keysyms::SPACE,
            "tab" => keysyms::TAB,
            "return" | "enter" => keysyms::RETURN,
            "escape" | "esc" => keysyms::ESCAPE,
            _ => {
                let n: u32 = name.strip_prefix('f')?.parse().ok()?;
                if !(1..=12).contains(&n) {
                    return None;
                }
                keysyms::F1 + n - 1
            }
        };
        Some(Self(keysym))
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            k @ (0x30..=0x39 | 0x61..=0x7a) => write!(f, "{}", k as u8 as char),
            keysyms::SPACE => write!(f, "space"),
            keysyms::TAB => write!(f, "tab"),
            keysyms::RETURN => write!(f, "return"),
            keysyms::ESCAPE => write!(f, "escape"),
            k if (keysyms::F1..keysyms::F1 + 12).contains(&k) => {
                write!(f, "f{}", k - keysyms::F1 + 1)
            }
            k => write!(f, "0x{:x}", k),
        }
    }
}

/// Errors from parsing a hotkey string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseHotkeyError {
    #[error("hotkey is empty")]
    Empty,

    #[error("unknown key {0:?}")]
    UnknownKey(String),

    #[error("hotkey {0:?} has no non-modifier key")]
    MissingKey(String),

    #[error("hotkey {0:?} has more than one non-modifier key")]
    MultipleKeys(String),
}

/// A registered global hotkey: a modifier set plus one non-modifier key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HotkeyCombination {
    modifiers: ModifierState,
    key_code: KeyCode,
}

impl HotkeyCombination {
    pub fn new(modifiers: ModifierState, key_code: KeyCode) -> Self {
        Self {
            modifiers,
            key_code,
        }
    }

    pub fn modifiers(&self) -> ModifierState {
        self.modifiers
    }

    pub fn key_code(&self) -> KeyCode {
        self.key_code
    }
}

impl Default for HotkeyCombination {
    /// Super+Alt+W, the wallpaper manager's import hotkey
    fn default() -> Self {
        Self::new(
            ModifierState::of(&[Modifier::Super, Modifier::Alt]),
            KeyCode(0x77),
        )
    }
}

impl FromStr for HotkeyCombination {
    type Err = ParseHotkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<String> = s
            .split('+')
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            return Err(ParseHotkeyError::Empty);
        }

        let mut modifiers = ModifierState::default();
        let mut key_code = None;
        for part in &parts {
            if let Some(modifier) = Modifier::from_name(part) {
                modifiers.set(modifier, true);
                continue;
            }
            let key = KeyCode::from_name(part)
                .ok_or_else(|| ParseHotkeyError::UnknownKey(part.clone()))?;
            if key_code.replace(key).is_some() {
                return Err(ParseHotkeyError::MultipleKeys(s.to_string()));
            }
        }

        let key_code = key_code.ok_or_else(|| ParseHotkeyError::MissingKey(s.to_string()))?;
        Ok(Self::new(modifiers, key_code))
    }
}

impl fmt::Display for HotkeyCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in self.modifiers.iter() {
            write!(f, "{}+", modifier.name())?;
        }
        write!(f, "{}", self.key_code)
    }
}

/// Derives the held modifier set from a stream of raw key transitions
///
/// Keys are tracked by hardware keycode so that holding both Shift keys
/// and releasing one still leaves Shift held.
#[derive(Debug, Default)]
pub struct HeldModifiers {
    held: HashMap<u32, Modifier>,
}

impl HeldModifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a key transition and return the resulting modifier state
    pub fn update(&mut self, hardware_code: u32, keysym: u32, is_press: bool) -> ModifierState {
        if let Some(modifier) = Modifier::from_keysym(keysym) {
            if is_press {
                self.held.insert(hardware_code, modifier);
            } else {
                self.held.remove(&hardware_code);
            }
        }
        self.state()
    }

    pub fn state(&self) -> ModifierState {
        let mut state = ModifierState::default();
        for &modifier in self.held.values() {
            state.set(modifier, true);
        }
        state
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }
}
