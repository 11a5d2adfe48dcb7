//! Classify key events and decide when a recording is complete.
//!
//! Both the capture session and the one-shot stop-key picker feed events
//! through a [`KeyRecorder`]; they differ only in their [`CommitRule`].

use crate::combo::{format_key_combo, join_combos, KeyCombo};
use crate::event::KeyEvent;
use crate::key::is_bare_modifier;

/// When a recording is considered finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitRule {
    /// Finish when this key is pressed. The key itself is not recorded.
    StopKey(String),
    /// Finish as soon as this many combos have been recorded.
    Count(usize),
}

/// Result of feeding one event to a recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A modifier pressed on its own. Nothing was recorded.
    Swallowed,
    /// A combo was recorded and the recording continues.
    Recorded(KeyCombo),
    /// The recording is complete.
    Commit,
}

/// Accumulates formatted combos until its commit rule fires.
#[derive(Debug, Clone)]
pub struct KeyRecorder {
    rule: CommitRule,
    combos: Vec<KeyCombo>,
    last_event: Option<KeyEvent>,
}

impl KeyRecorder {
    pub fn new(rule: CommitRule) -> Self {
        Self {
            rule,
            combos: Vec::new(),
            last_event: None,
        }
    }

    /// Recorder that finishes on `stop_key`.
    pub fn until_key(stop_key: impl Into<String>) -> Self {
        Self::new(CommitRule::StopKey(stop_key.into()))
    }

    /// Recorder that finishes after a single non-modifier key.
    pub fn single() -> Self {
        Self::new(CommitRule::Count(1))
    }

    pub fn rule(&self) -> &CommitRule {
        &self.rule
    }

    /// Classify one event.
    ///
    /// Bare modifiers are checked before the commit rule, so a stop key that
    /// names a modifier never fires.
    pub fn feed(&mut self, event: &KeyEvent) -> Step {
        if is_bare_modifier(&event.key) {
            return Step::Swallowed;
        }

        if let CommitRule::StopKey(stop) = &self.rule {
            if event.key == *stop {
                return Step::Commit;
            }
        }

        let combo = format_key_combo(event);
        self.combos.push(combo.clone());
        self.last_event = Some(event.clone());

        match self.rule {
            CommitRule::Count(n) if self.combos.len() >= n => Step::Commit,
            _ => Step::Recorded(combo),
        }
    }

    pub fn combos(&self) -> &[KeyCombo] {
        &self.combos
    }

    pub fn is_empty(&self) -> bool {
        self.combos.is_empty()
    }

    /// The most recent recorded event.
    pub fn last_event(&self) -> Option<&KeyEvent> {
        self.last_event.as_ref()
    }

    /// All recorded combos joined with `", "`.
    pub fn joined(&self) -> String {
        join_combos(&self.combos)
    }

    pub fn clear(&mut self) {
        self.combos.clear();
        self.last_event = None;
    }
}
