//! Keyboard events delivered to a capture session.

use crate::combo::Modifiers;

/// A single key-down as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    /// Logical key name, e.g. `"h"`, `"Escape"` or `"Control"`.
    pub key: String,
    /// Modifiers held while the key went down.
    pub modifiers: Modifiers,
}

impl KeyEvent {
    /// Create an event with no modifiers held.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            modifiers: Modifiers::default(),
        }
    }

    /// Create an event with the given modifiers.
    pub fn with_modifiers(key: impl Into<String>, modifiers: Modifiers) -> Self {
        Self {
            key: key.into(),
            modifiers,
        }
    }
}

/// What the host should do with an event after the session has seen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The event was handled; the host must not interpret it any further.
    Consume,
    /// The event belongs to the host's normal key handling.
    PassThrough,
}

impl Disposition {
    pub fn is_consumed(self) -> bool {
        matches!(self, Disposition::Consume)
    }
}
