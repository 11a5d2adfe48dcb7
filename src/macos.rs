//! macOS implementation using rdev.
//!
//! The event tap is installed once and stays up for the life of the process;
//! "installing" interception flips it from passing key-downs through to
//! swallowing them and forwarding them to the capture session.

use crate::combo::Modifiers;
use crate::event::KeyEvent;
use crate::interceptor::InterceptHandle;
use anyhow::{anyhow, Result};
use rdev::{grab, Event, EventType};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

/// Translate an rdev key into a logical key name.
fn key_name(key: rdev::Key, typed: Option<&str>) -> String {
    use rdev::Key as K;
    let name = match key {
        K::KeyA => "a",
        K::KeyB => "b",
        K::KeyC => "c",
        K::KeyD => "d",
        K::KeyE => "e",
        K::KeyF => "f",
        K::KeyG => "g",
        K::KeyH => "h",
        K::KeyI => "i",
        K::KeyJ => "j",
        K::KeyK => "k",
        K::KeyL => "l",
        K::KeyM => "m",
        K::KeyN => "n",
        K::KeyO => "o",
        K::KeyP => "p",
        K::KeyQ => "q",
        K::KeyR => "r",
        K::KeyS => "s",
        K::KeyT => "t",
        K::KeyU => "u",
        K::KeyV => "v",
        K::KeyW => "w",
        K::KeyX => "x",
        K::KeyY => "y",
        K::KeyZ => "z",
        K::Num1 | K::Kp1 => "1",
        K::Num2 | K::Kp2 => "2",
        K::Num3 | K::Kp3 => "3",
        K::Num4 | K::Kp4 => "4",
        K::Num5 | K::Kp5 => "5",
        K::Num6 | K::Kp6 => "6",
        K::Num7 | K::Kp7 => "7",
        K::Num8 | K::Kp8 => "8",
        K::Num9 | K::Kp9 => "9",
        K::Num0 | K::Kp0 => "0",
        K::Minus | K::KpMinus => "-",
        K::Equal => "=",
        K::KpPlus => "+",
        K::KpMultiply => "*",
        K::KpDivide | K::Slash => "/",
        K::LeftBracket => "[",
        K::RightBracket => "]",
        K::SemiColon => ";",
        K::Quote => "'",
        K::BackQuote => "`",
        K::BackSlash | K::IntlBackslash => "\\",
        K::Comma => ",",
        K::Dot => ".",
        K::Space => " ",
        K::Escape => "Escape",
        K::Return | K::KpReturn => "Enter",
        K::Tab => "Tab",
        K::Backspace => "Backspace",
        K::Delete | K::KpDelete => "Delete",
        K::Insert => "Insert",
        K::Home => "Home",
        K::End => "End",
        K::PageUp => "PageUp",
        K::PageDown => "PageDown",
        K::UpArrow => "ArrowUp",
        K::DownArrow => "ArrowDown",
        K::LeftArrow => "ArrowLeft",
        K::RightArrow => "ArrowRight",
        K::F1 => "F1",
        K::F2 => "F2",
        K::F3 => "F3",
        K::F4 => "F4",
        K::F5 => "F5",
        K::F6 => "F6",
        K::F7 => "F7",
        K::F8 => "F8",
        K::F9 => "F9",
        K::F10 => "F10",
        K::F11 => "F11",
        K::F12 => "F12",
        K::CapsLock => "CapsLock",
        K::NumLock => "NumLock",
        K::ScrollLock => "ScrollLock",
        K::Pause => "Pause",
        K::PrintScreen => "PrintScreen",
        K::Function => "Fn",
        K::ControlLeft | K::ControlRight => "Control",
        K::Alt | K::AltGr => "Alt",
        K::ShiftLeft | K::ShiftRight => "Shift",
        K::MetaLeft | K::MetaRight => "Meta",
        other => {
            return match typed {
                Some(text) if !text.is_empty() => text.to_string(),
                _ => format!("{:?}", other),
            };
        }
    };
    name.to_string()
}

/// Update the held modifiers for a key transition.
fn track_modifier(mods: &mut Modifiers, key: rdev::Key, down: bool) {
    match key {
        rdev::Key::ControlLeft | rdev::Key::ControlRight => mods.ctrl = down,
        rdev::Key::Alt | rdev::Key::AltGr => mods.alt = down,
        rdev::Key::ShiftLeft | rdev::Key::ShiftRight => mods.shift = down,
        rdev::Key::MetaLeft | rdev::Key::MetaRight => mods.meta = down,
        _ => {}
    }
}

/// macOS keyboard interceptor using an rdev grab tap.
#[derive(Default)]
pub struct KeyboardInterceptor;

impl KeyboardInterceptor {
    pub fn new() -> Self {
        Self
    }

    /// Start the event tap in a background thread.
    /// Returns the gate and a receiver for intercepted key-downs.
    pub fn start(self, running: Arc<AtomicBool>) -> Result<(Gate, Receiver<KeyEvent>)> {
        let (tx, rx) = mpsc::channel();
        let active = Arc::new(AtomicBool::new(false));
        start_event_tap(Arc::clone(&active), running, tx);
        Ok((Gate { active, next_id: 0 }, rx))
    }
}

/// Switches the event tap between pass-through and swallowing.
pub struct Gate {
    active: Arc<AtomicBool>,
    next_id: u64,
}

impl Gate {
    pub fn install(&mut self) -> Result<InterceptHandle> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(anyhow!("Keyboard is already intercepted"));
        }
        self.next_id += 1;
        log::info!("Keyboard interception enabled");
        Ok(InterceptHandle::new(self.next_id))
    }

    pub fn uninstall(&mut self, handle: InterceptHandle) -> Result<()> {
        self.active.store(false, Ordering::SeqCst);
        log::info!("Keyboard interception disabled (registration {})", handle.id());
        Ok(())
    }
}

impl Drop for Gate {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

fn start_event_tap(active: Arc<AtomicBool>, running: Arc<AtomicBool>, tx: Sender<KeyEvent>) {
    thread::spawn(move || {
        let current_mods = Cell::new(Modifiers::default());
        let tap_running = Arc::clone(&running);

        let callback = move |event: Event| -> Option<Event> {
            let swallow = tap_running.load(Ordering::Relaxed) && active.load(Ordering::SeqCst);
            match event.event_type {
                EventType::KeyPress(key) => {
                    let mut mods = current_mods.get();
                    track_modifier(&mut mods, key, true);
                    current_mods.set(mods);

                    if swallow {
                        let name = key_name(key, event.name.as_deref());
                        let _ = tx.send(KeyEvent::with_modifiers(name, mods));
                        return None;
                    }
                    Some(event)
                }
                EventType::KeyRelease(key) => {
                    let mut mods = current_mods.get();
                    track_modifier(&mut mods, key, false);
                    current_mods.set(mods);
                    // Releases always pass so keys pressed before capture never stick.
                    Some(event)
                }
                _ => Some(event),
            }
        };

        if let Err(e) = grab(callback) {
            log::error!("Error grabbing keyboard events: {:?}", e);
            running.store(false, Ordering::SeqCst);
        }
    });
}
