//! Capture keyboard combos and insert them as text.
//!
//! A [`CaptureSession`] takes over the keyboard, turns every key press into a
//! combo string like `Ctrl+Alt+H` and, once the stop key is pressed, hands the
//! joined result (`"Ctrl+Alt+H, A"`) to a [`ResultSink`] such as the cursor
//! of a text buffer.
//!
//! # Features
//!
//! - **Exclusive capture** - while capturing no other program sees the keys
//!   (evdev grab on Linux, event tap on macOS)
//! - **Canonical combos** - modifiers always in `Ctrl+Alt+Shift+Win` order
//! - **Bare modifiers swallowed** - holding Ctrl alone records nothing
//! - **Automatic cleanup** - the keyboard is released when the session stops,
//!   is shut down or is dropped
//! - **Testable core** - the session only talks to small traits
//!   ([`InputInterceptor`], [`ResultSink`], [`StatusDisplay`], [`Notifier`])
//!
//! # Example
//!
//! ```no_run
//! use hotkey_capture::{
//!     pump, CaptureSession, KeyboardInterceptor, StdoutSink, TerminalNotifier,
//!     TerminalStatus,
//! };
//! use std::sync::atomic::AtomicBool;
//!
//! fn main() -> anyhow::Result<()> {
//!     let (gate, stream) = KeyboardInterceptor::open()?.start()?;
//!     let mut session = CaptureSession::new(
//!         gate,
//!         Box::new(TerminalStatus),
//!         Box::new(TerminalNotifier),
//!     );
//!
//!     session.start(Some(Box::new(StdoutSink)))?;
//!     pump(&mut session, &stream, &AtomicBool::new(false))?;
//!     Ok(())
//! }
//! ```
//!
//! # Linux Requirements
//!
//! On Linux, the user must have permission to read from `/dev/input/event*` devices.
//! This typically means running as root or being a member of the `input` group.

mod combo;
mod config;
mod event;
mod interceptor;
mod key;
mod listener;
mod recorder;
mod session;
mod sink;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

pub use combo::{format_key_combo, join_combos, KeyCombo, Modifiers};
pub use config::Config;
pub use event::{Disposition, KeyEvent};
pub use interceptor::{InputInterceptor, InterceptHandle};
pub use key::{
    is_bare_modifier, normalize_key_name, resolve_label, BARE_MODIFIERS, DEFAULT_STOP_KEY,
};
pub use listener::{capture_single_key, pump, KeyStream, KeyboardGate, KeyboardInterceptor};
pub use recorder::{CommitRule, KeyRecorder, Step};
pub use session::{CaptureSession, CaptureState};
pub use sink::{
    CursorSink, InsertionTarget, Notifier, Position, ResultSink, StatusDisplay, StdoutSink,
    TerminalNotifier, TerminalStatus, TextBuffer,
};

#[cfg(target_os = "linux")]
pub use linux::find_keyboards;
