//! Finger classification for physical keys.
//!
//! Maps a `KeyboardEvent.code`-style key identifier to one of the ten
//! logical hand/finger positions of standard QWERTY touch typing. The
//! classifier is a pure, total function with no state.

use serde::{Deserialize, Serialize};

/// One of the ten logical finger positions.
///
/// Naming convention follows the ingest endpoint: `{HAND}_{FINGER}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FingerPosition {
    /// Left pinky.
    LPinky,
    /// Left ring finger.
    LRing,
    /// Left middle finger.
    LMiddle,
    /// Left index finger.
    LIndex,
    /// Left thumb.
    LThumb,
    /// Right thumb.
    RThumb,
    /// Right index finger.
    RIndex,
    /// Right middle finger.
    RMiddle,
    /// Right ring finger.
    RRing,
    /// Right pinky.
    RPinky,
}

impl std::fmt::Display for FingerPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::LPinky => "L_PINKY",
            Self::LRing => "L_RING",
            Self::LMiddle => "L_MIDDLE",
            Self::LIndex => "L_INDEX",
            Self::LThumb => "L_THUMB",
            Self::RThumb => "R_THUMB",
            Self::RIndex => "R_INDEX",
            Self::RMiddle => "R_MIDDLE",
            Self::RRing => "R_RING",
            Self::RPinky => "R_PINKY",
        };
        write!(f, "{name}")
    }
}

impl FingerPosition {
    /// Classify a physical key code into a finger position.
    ///
    /// Uses the standard QWERTY touch-typing chart. Key codes with no
    /// assignment (media keys, numpad, anything exotic) are attributed to
    /// the right pinky, where most residual keys sit on a physical board.
    #[must_use]
    pub fn for_key_code(key_code: &str) -> Self {
        match key_code {
            "Backquote" | "Digit1" | "KeyQ" | "KeyA" | "KeyZ" | "Tab" | "CapsLock"
            | "ShiftLeft" | "ControlLeft" | "Escape" => Self::LPinky,

            "Digit2" | "KeyW" | "KeyS" | "KeyX" => Self::LRing,

            "Digit3" | "KeyE" | "KeyD" | "KeyC" => Self::LMiddle,

            "Digit4" | "Digit5" | "KeyR" | "KeyT" | "KeyF" | "KeyG" | "KeyV" | "KeyB" => {
                Self::LIndex
            }

            "AltLeft" | "MetaLeft" => Self::LThumb,

            "Space" | "AltRight" | "MetaRight" => Self::RThumb,

            "Digit6" | "Digit7" | "KeyY" | "KeyU" | "KeyH" | "KeyJ" | "KeyN" | "KeyM" => {
                Self::RIndex
            }

            "Digit8" | "KeyI" | "KeyK" | "Comma" => Self::RMiddle,

            "Digit9" | "KeyO" | "KeyL" | "Period" => Self::RRing,

            _ => Self::RPinky,
        }
    }
}
