//! The capture session state machine.

use crate::combo::KeyCombo;
use crate::event::{Disposition, KeyEvent};
use crate::interceptor::{InputInterceptor, InterceptHandle};
use crate::key::{resolve_label, DEFAULT_STOP_KEY};
use crate::recorder::{KeyRecorder, Step};
use crate::sink::{Notifier, ResultSink, StatusDisplay};
use anyhow::{Context, Result};

const STATUS_PREFIX: &str = "🎹";
const NO_TARGET_NOTICE: &str = "No insertion target available";
const NOTHING_CAPTURED_NOTICE: &str = "No keys captured";

/// Lifecycle state of a [`CaptureSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
}

/// Intercepts the keyboard, records key combos and hands the joined result to
/// a [`ResultSink`] once the stop key is pressed.
///
/// The session owns the interception registration while capturing and gives
/// it back on every path out of [`CaptureState::Capturing`], including drop.
pub struct CaptureSession<I: InputInterceptor> {
    interceptor: I,
    status: Box<dyn StatusDisplay>,
    notifier: Box<dyn Notifier>,
    stop_key: String,
    state: CaptureState,
    recorder: KeyRecorder,
    handle: Option<InterceptHandle>,
    target: Option<Box<dyn ResultSink>>,
}

impl<I: InputInterceptor> CaptureSession<I> {
    /// Create an idle session that stops on the default stop key.
    pub fn new(
        interceptor: I,
        status: Box<dyn StatusDisplay>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            interceptor,
            status,
            notifier,
            stop_key: DEFAULT_STOP_KEY.to_string(),
            state: CaptureState::Idle,
            recorder: KeyRecorder::until_key(DEFAULT_STOP_KEY),
            handle: None,
            target: None,
        }
    }

    /// Use `stop_key` instead of the default.
    pub fn with_stop_key(mut self, stop_key: impl Into<String>) -> Self {
        self.set_stop_key(stop_key);
        self
    }

    /// Change the stop key. Takes effect at the next [`start`](Self::start).
    pub fn set_stop_key(&mut self, stop_key: impl Into<String>) {
        self.stop_key = stop_key.into();
    }

    pub fn stop_key(&self) -> &str {
        &self.stop_key
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state == CaptureState::Capturing
    }

    /// Combos recorded so far in the current session.
    pub fn tokens(&self) -> &[KeyCombo] {
        self.recorder.combos()
    }

    pub fn interceptor(&self) -> &I {
        &self.interceptor
    }

    /// Begin capturing into `target`.
    ///
    /// Does nothing if a capture is already running. Without a target the
    /// request is refused with a notice and the session stays idle. Fails only
    /// if the keyboard interception cannot be installed.
    pub fn start(&mut self, target: Option<Box<dyn ResultSink>>) -> Result<()> {
        if self.is_capturing() {
            log::debug!("Capture already running, ignoring start");
            return Ok(());
        }

        let Some(target) = target else {
            log::debug!("Refusing to capture without an insertion target");
            self.notifier.notice(NO_TARGET_NOTICE);
            return Ok(());
        };

        let handle = self
            .interceptor
            .install()
            .context("Failed to install keyboard interception")?;

        self.recorder = KeyRecorder::until_key(self.stop_key.clone());
        self.handle = Some(handle);
        self.target = Some(target);
        self.state = CaptureState::Capturing;
        log::info!("Capture started (stop key {:?})", self.stop_key);

        self.status
            .set_text(&format!("{} Capturing...", STATUS_PREFIX));
        self.notifier.notice(&format!(
            "Hotkey capture started. Press keys, then {} to finish.",
            resolve_label(&self.stop_key)
        ));
        Ok(())
    }

    /// Decide what happens to one key-down while interception is installed.
    pub fn on_key_event(&mut self, event: &KeyEvent) -> Disposition {
        if !self.is_capturing() {
            return Disposition::PassThrough;
        }

        match self.recorder.feed(event) {
            Step::Swallowed => {
                log::debug!("Swallowed bare modifier {:?}", event.key);
            }
            Step::Commit => self.stop(true),
            Step::Recorded(combo) => {
                log::debug!("Recorded {}", combo);
                self.status
                    .set_text(&format!("{} {}", STATUS_PREFIX, self.recorder.joined()));
            }
        }
        Disposition::Consume
    }

    /// End the capture. With `commit` the recorded combos are delivered to the
    /// target; without it they are discarded silently.
    pub fn stop(&mut self, commit: bool) {
        if !self.is_capturing() {
            return;
        }

        // Release the keyboard before anything else can go wrong.
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.interceptor.uninstall(handle) {
                log::warn!("Failed to uninstall keyboard interception: {:#}", e);
            }
        }

        self.status.set_text("");
        self.state = CaptureState::Idle;
        let target = self.target.take();
        log::info!("Capture stopped (commit: {})", commit);

        if commit {
            if self.recorder.is_empty() {
                self.notifier.notice(NOTHING_CAPTURED_NOTICE);
            } else {
                let result = self.recorder.joined();
                if let Some(mut target) = target {
                    match target.deliver(&result) {
                        Ok(()) => self.notifier.notice(&format!("Inserted: {}", result)),
                        Err(e) => log::error!("Failed to deliver {:?}: {:#}", result, e),
                    }
                }
            }
        }

        self.recorder.clear();
    }

    /// Tear the session down without committing. Safe to call at any time.
    pub fn shutdown(&mut self) {
        self.stop(false);
    }
}

impl<I: InputInterceptor> Drop for CaptureSession<I> {
    fn drop(&mut self) {
        self.shutdown();
    }
}


#[cfg(test)]
mod proptests {
    use super::tests::{session, sink};
    use super::*;
    use crate::combo::Modifiers;
    use crate::key::BARE_MODIFIERS;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_bare_modifier_never_records(idx in 0usize..4, extra in any::<bool>()) {
            let (mut session, journal) = session();
            session.start(sink(&journal)).unwrap();

            let key = BARE_MODIFIERS[idx];
            let mut mods = match idx {
                0 => Modifiers::ctrl(),
                1 => Modifiers::alt(),
                2 => Modifiers::shift(),
                _ => Modifiers::meta(),
            };
            if extra && idx != 2 {
                mods = mods.with_shift();
            }

            let disposition = session.on_key_event(&KeyEvent::with_modifiers(key, mods));
            prop_assert_eq!(disposition, Disposition::Consume);
            prop_assert!(session.tokens().is_empty());
        }

        #[test]
        fn prop_everything_consumed_while_capturing(
            keys in proptest::collection::vec("[a-zA-Z0-9]|F[1-9]|Tab|Enter|ArrowUp", 1..12),
        ) {
            let (mut session, journal) = session();
            session.start(sink(&journal)).unwrap();
            for key in &keys {
                prop_assert!(session.on_key_event(&KeyEvent::new(key.as_str())).is_consumed());
            }
            prop_assert_eq!(session.tokens().len(), keys.len());
        }
    }
}
