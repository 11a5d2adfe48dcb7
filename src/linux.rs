//! Linux implementation using evdev.
//!
//! Interception is an exclusive `EVIOCGRAB` on every keyboard device, which
//! hides key events from X11, Wayland compositors and the console alike.

use crate::combo::Modifiers;
use crate::event::KeyEvent;
use crate::interceptor::InterceptHandle;
use anyhow::{anyhow, Context, Result};
use evdev::{Device, Key};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Minimum interval between keyboard rescans after a read error.
const RESCAN_INTERVAL: Duration = Duration::from_secs(3);

/// How long `install` waits for keys that are still held to be released.
const RELEASE_TIMEOUT: Duration = Duration::from_secs(1);

/// Translate an evdev key into a logical key name.
fn key_name(key: Key) -> String {
    let name = match key {
        Key::KEY_A => "a",
        Key::KEY_B => "b",
        Key::KEY_C => "c",
        Key::KEY_D => "d",
        Key::KEY_E => "e",
        Key::KEY_F => "f",
        Key::KEY_G => "g",
        Key::KEY_H => "h",
        Key::KEY_I => "i",
        Key::KEY_J => "j",
        Key::KEY_K => "k",
        Key::KEY_L => "l",
        Key::KEY_M => "m",
        Key::KEY_N => "n",
        Key::KEY_O => "o",
        Key::KEY_P => "p",
        Key::KEY_Q => "q",
        Key::KEY_R => "r",
        Key::KEY_S => "s",
        Key::KEY_T => "t",
        Key::KEY_U => "u",
        Key::KEY_V => "v",
        Key::KEY_W => "w",
        Key::KEY_X => "x",
        Key::KEY_Y => "y",
        Key::KEY_Z => "z",
        Key::KEY_1 | Key::KEY_KP1 => "1",
        Key::KEY_2 | Key::KEY_KP2 => "2",
        Key::KEY_3 | Key::KEY_KP3 => "3",
        Key::KEY_4 | Key::KEY_KP4 => "4",
        Key::KEY_5 | Key::KEY_KP5 => "5",
        Key::KEY_6 | Key::KEY_KP6 => "6",
        Key::KEY_7 | Key::KEY_KP7 => "7",
        Key::KEY_8 | Key::KEY_KP8 => "8",
        Key::KEY_9 | Key::KEY_KP9 => "9",
        Key::KEY_0 | Key::KEY_KP0 => "0",
        Key::KEY_MINUS | Key::KEY_KPMINUS => "-",
        Key::KEY_EQUAL => "=",
        Key::KEY_KPPLUS => "+",
        Key::KEY_KPASTERISK => "*",
        Key::KEY_LEFTBRACE => "[",
        Key::KEY_RIGHTBRACE => "]",
        Key::KEY_SEMICOLON => ";",
        Key::KEY_APOSTROPHE => "'",
        Key::KEY_GRAVE => "`",
        Key::KEY_BACKSLASH => "\\",
        Key::KEY_COMMA => ",",
        Key::KEY_DOT | Key::KEY_KPDOT => ".",
        Key::KEY_SLASH | Key::KEY_KPSLASH => "/",
        Key::KEY_SPACE => " ",
        Key::KEY_ESC => "Escape",
        Key::KEY_ENTER | Key::KEY_KPENTER => "Enter",
        Key::KEY_TAB => "Tab",
        Key::KEY_BACKSPACE => "Backspace",
        Key::KEY_DELETE => "Delete",
        Key::KEY_INSERT => "Insert",
        Key::KEY_HOME => "Home",
        Key::KEY_END => "End",
        Key::KEY_PAGEUP => "PageUp",
        Key::KEY_PAGEDOWN => "PageDown",
        Key::KEY_UP => "ArrowUp",
        Key::KEY_DOWN => "ArrowDown",
        Key::KEY_LEFT => "ArrowLeft",
        Key::KEY_RIGHT => "ArrowRight",
        Key::KEY_F1 => "F1",
        Key::KEY_F2 => "F2",
        Key::KEY_F3 => "F3",
        Key::KEY_F4 => "F4",
        Key::KEY_F5 => "F5",
        Key::KEY_F6 => "F6",
        Key::KEY_F7 => "F7",
        Key::KEY_F8 => "F8",
        Key::KEY_F9 => "F9",
        Key::KEY_F10 => "F10",
        Key::KEY_F11 => "F11",
        Key::KEY_F12 => "F12",
        Key::KEY_CAPSLOCK => "CapsLock",
        Key::KEY_NUMLOCK => "NumLock",
        Key::KEY_SCROLLLOCK => "ScrollLock",
        Key::KEY_PAUSE => "Pause",
        Key::KEY_SYSRQ => "PrintScreen",
        Key::KEY_COMPOSE => "ContextMenu",
        Key::KEY_LEFTCTRL | Key::KEY_RIGHTCTRL => "Control",
        Key::KEY_LEFTALT | Key::KEY_RIGHTALT => "Alt",
        Key::KEY_LEFTSHIFT | Key::KEY_RIGHTSHIFT => "Shift",
        Key::KEY_LEFTMETA | Key::KEY_RIGHTMETA => "Meta",
        other => {
            let debug = format!("{:?}", other);
            return debug.trim_start_matches("KEY_").to_string();
        }
    };
    name.to_string()
}

/// Update the held modifiers for a key transition.
fn track_modifier(mods: &mut Modifiers, key: Key, down: bool) {
    match key {
        Key::KEY_LEFTCTRL | Key::KEY_RIGHTCTRL => mods.ctrl = down,
        Key::KEY_LEFTALT | Key::KEY_RIGHTALT => mods.alt = down,
        Key::KEY_LEFTSHIFT | Key::KEY_RIGHTSHIFT => mods.shift = down,
        Key::KEY_LEFTMETA | Key::KEY_RIGHTMETA => mods.meta = down,
        _ => {}
    }
}

/// Modifier state implied by a set of held keys.
fn held_modifiers(keys: impl IntoIterator<Item = Key>) -> Modifiers {
    let mut mods = Modifiers::default();
    for key in keys {
        track_modifier(&mut mods, key, true);
    }
    mods
}

/// Find all keyboard devices in /dev/input.
pub fn find_keyboards() -> Result<Vec<Device>> {
    let mut keyboards = Vec::new();

    for entry in std::fs::read_dir("/dev/input")? {
        let entry = entry?;
        let path = entry.path();

        if !path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false)
        {
            continue;
        }

        if let Ok(device) = Device::open(&path) {
            // Check if device supports keyboard keys
            if device
                .supported_keys()
                .map(|keys| keys.contains(Key::KEY_A))
                .unwrap_or(false)
            {
                log::debug!("Found keyboard: {:?} at {:?}", device.name(), path);
                keyboards.push(device);
            }
        }
    }

    if keyboards.is_empty() {
        Err(anyhow!(
            "No keyboards found. Make sure you're in the 'input' group or running as root."
        ))
    } else {
        Ok(keyboards)
    }
}

/// Set non-blocking mode on keyboard devices.
fn set_nonblocking(keyboards: &[Device]) -> Result<()> {
    for device in keyboards {
        let fd = device.as_raw_fd();
        let flags = fcntl(fd, FcntlArg::F_GETFL).context("Failed to get fd flags")?;
        let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
        fcntl(fd, FcntlArg::F_SETFL(flags)).context("Failed to set non-blocking")?;
    }
    Ok(())
}

fn would_block(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::EAGAIN) || e.raw_os_error() == Some(libc::EWOULDBLOCK)
}

/// Drain any stale events from keyboards and verify they're readable.
/// This is especially important for Bluetooth keyboards after reconnection.
fn drain_events(keyboards: &mut [Device]) {
    for device in keyboards.iter_mut() {
        let device_name = device.name().map(String::from);
        loop {
            match device.fetch_events() {
                Ok(events) => {
                    let count = events.count();
                    if count == 0 {
                        break;
                    }
                    log::debug!("Drained {} stale events from {:?}", count, device_name);
                }
                Err(e) => {
                    if !would_block(&e) {
                        log::debug!("Error draining events from {:?}: {}", device_name, e);
                    }
                    break;
                }
            }
        }
    }
}

/// Wait until no key is held on any device, so the compositor has seen every
/// release before we take the devices away from it.
fn wait_for_release(keyboards: &[Device]) {
    let deadline = Instant::now() + RELEASE_TIMEOUT;
    while Instant::now() < deadline {
        let held = keyboards.iter().any(|device| {
            device
                .get_key_state()
                .map(|keys| keys.iter().next().is_some())
                .unwrap_or(false)
        });
        if !held {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    log::debug!("Keys still held after {:?}, grabbing anyway", RELEASE_TIMEOUT);
}

/// Grab every device, undoing partial grabs on failure.
fn grab_all(keyboards: &mut [Device]) -> Result<()> {
    for idx in 0..keyboards.len() {
        if let Err(e) = keyboards[idx].grab() {
            for device in keyboards[..idx].iter_mut() {
                let _ = device.ungrab();
            }
            let name = keyboards[idx].name().unwrap_or("unknown").to_string();
            return Err(e).with_context(|| format!("Failed to grab keyboard {:?}", name));
        }
    }
    Ok(())
}

/// State shared between the gate and the reader thread.
struct Shared {
    keyboards: Mutex<Vec<Device>>,
    grabbed: AtomicBool,
    /// Set when queued events were discarded; the reader rebuilds its
    /// modifier state from the devices before reading on.
    resync: AtomicBool,
}

impl Shared {
    fn keyboards(&self) -> MutexGuard<'_, Vec<Device>> {
        // Recover the devices even if the reader panicked while holding the lock.
        self.keyboards
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Linux keyboard interceptor using evdev.
pub struct KeyboardInterceptor {
    keyboards: Vec<Device>,
}

impl KeyboardInterceptor {
    /// Create a new interceptor over the given keyboards.
    pub fn new(keyboards: Vec<Device>) -> Self {
        Self { keyboards }
    }

    /// Start reading keyboards in a background thread.
    /// Returns the gate and a receiver for intercepted key-downs.
    pub fn start(self, running: Arc<AtomicBool>) -> Result<(Gate, Receiver<KeyEvent>)> {
        let (tx, rx) = mpsc::channel();
        set_nonblocking(&self.keyboards)?;
        let shared = Arc::new(Shared {
            keyboards: Mutex::new(self.keyboards),
            grabbed: AtomicBool::new(false),
            resync: AtomicBool::new(false),
        });
        start_keyboard_reader(Arc::clone(&shared), running, tx);
        Ok((Gate { shared, next_id: 0 }, rx))
    }
}

/// Grabs and releases all keyboards.
pub struct Gate {
    shared: Arc<Shared>,
    next_id: u64,
}

impl Gate {
    pub fn install(&mut self) -> Result<InterceptHandle> {
        if self.shared.grabbed.load(Ordering::SeqCst) {
            return Err(anyhow!("Keyboards are already grabbed"));
        }

        let mut keyboards = self.shared.keyboards();
        wait_for_release(&keyboards);
        grab_all(&mut keyboards)?;
        // Keys pressed while waiting already reached the compositor.
        drain_events(&mut keyboards);
        self.shared.resync.store(true, Ordering::SeqCst);
        self.shared.grabbed.store(true, Ordering::SeqCst);

        self.next_id += 1;
        log::info!("Grabbed {} keyboard(s)", keyboards.len());
        Ok(InterceptHandle::new(self.next_id))
    }

    pub fn uninstall(&mut self, handle: InterceptHandle) -> Result<()> {
        // Clear the flag first so a rescan cannot re-grab behind our back.
        self.shared.grabbed.store(false, Ordering::SeqCst);

        let mut keyboards = self.shared.keyboards();
        let mut first_error = None;
        for device in keyboards.iter_mut() {
            if let Err(e) = device.ungrab() {
                log::debug!("Failed to ungrab {:?}: {}", device.name(), e);
                first_error.get_or_insert(e);
            }
        }
        log::info!("Released keyboards (registration {})", handle.id());

        match first_error {
            Some(e) => Err(e).context("Failed to release keyboard grab"),
            None => Ok(()),
        }
    }
}

impl Drop for Gate {
    fn drop(&mut self) {
        if self.shared.grabbed.swap(false, Ordering::SeqCst) {
            for device in self.shared.keyboards().iter_mut() {
                let _ = device.ungrab();
            }
        }
    }
}

fn start_keyboard_reader(shared: Arc<Shared>, running: Arc<AtomicBool>, tx: Sender<KeyEvent>) {
    thread::spawn(move || {
        let mut current_mods = Modifiers::default();
        let mut last_rescan = Instant::now();
        let mut had_error = false;

        while running.load(Ordering::Relaxed) {
            // Check if we need to rescan keyboards (after error and interval passed)
            if had_error && last_rescan.elapsed() >= RESCAN_INTERVAL {
                log::info!("Keyboard error detected, rescanning devices...");
                match find_keyboards() {
                    Ok(mut new_keyboards) => {
                        // Give devices time to fully initialize (especially important for BT keyboards)
                        thread::sleep(Duration::from_millis(100));

                        match set_nonblocking(&new_keyboards) {
                            Ok(()) => {
                                log::info!(
                                    "Keyboards reconnected: found {} device(s)",
                                    new_keyboards.len()
                                );
                                drain_events(&mut new_keyboards);

                                let mut keyboards = shared.keyboards();
                                // Drop old keyboards explicitly before replacing
                                keyboards.clear();
                                if shared.grabbed.load(Ordering::SeqCst) {
                                    if let Err(e) = grab_all(&mut new_keyboards) {
                                        log::warn!("Failed to re-grab keyboards: {:#}", e);
                                    }
                                }
                                *keyboards = new_keyboards;
                                current_mods = Modifiers::default();
                                had_error = false;
                            }
                            Err(e) => {
                                log::warn!("Failed to set non-blocking on new keyboards: {}", e);
                            }
                        }
                    }
                    Err(e) => {
                        log::warn!("Failed to rescan keyboards: {}", e);
                    }
                }
                last_rescan = Instant::now();
            }

            let mut any_error = false;
            {
                let mut keyboards = shared.keyboards();
                let grabbed = shared.grabbed.load(Ordering::SeqCst);
                if shared.resync.swap(false, Ordering::SeqCst) {
                    current_mods = held_modifiers(keyboards.iter().flat_map(|device| {
                        device
                            .get_key_state()
                            .map(|keys| keys.iter().collect::<Vec<_>>())
                            .unwrap_or_default()
                    }));
                }

                for device in keyboards.iter_mut() {
                    match device.fetch_events() {
                        Ok(events) => {
                            for event in events {
                                if let evdev::InputEventKind::Key(key) = event.kind() {
                                    // 0 = release, 1 = press, 2 = auto-repeat
                                    let down = event.value() != 0;
                                    track_modifier(&mut current_mods, key, down);

                                    if grabbed && down {
                                        let key_event = KeyEvent::with_modifiers(
                                            key_name(key),
                                            current_mods,
                                        );
                                        if tx.send(key_event).is_err() {
                                            return;
                                        }
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            if !would_block(&e) {
                                log::debug!("Keyboard read error: {}", e);
                                any_error = true;
                            }
                        }
                    }
                }
            }

            if any_error {
                had_error = true;
            }

            thread::sleep(Duration::from_millis(10));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::key::is_bare_modifier;
    use crate::listener::{capture_single_key, KeyStream};
    use crate::session::tests::FakeInterceptor;

    #[test]
    fn test_key_names() {
        assert_eq!(key_name(Key::KEY_H), "h");
        assert_eq!(key_name(Key::KEY_KP7), "7");
        assert_eq!(key_name(Key::KEY_SPACE), " ");
        assert_eq!(key_name(Key::KEY_ESC), "Escape");
        assert_eq!(key_name(Key::KEY_UP), "ArrowUp");
        assert_eq!(key_name(Key::KEY_RIGHTMETA), "Meta");
    }

    #[test]
    fn test_unknown_key_uses_evdev_name() {
        assert_eq!(key_name(Key::KEY_MUTE), "MUTE");
    }

    #[test]
    fn test_held_modifiers() {
        assert_eq!(held_modifiers(std::iter::empty()), Modifiers::default());
        assert_eq!(
            held_modifiers([Key::KEY_RIGHTSHIFT, Key::KEY_Q, Key::KEY_LEFTMETA]),
            Modifiers::shift().with_meta()
        );
    }

    #[test]
    fn test_every_key_name_survives_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cancel = AtomicBool::new(false);

        for code in 0..0x300u16 {
            let name = key_name(Key::new(code));
            if is_bare_modifier(&name) {
                continue;
            }

            let (tx, rx) = mpsc::channel();
            let stream = KeyStream::from_receiver(rx);
            tx.send(KeyEvent::new(name.clone())).unwrap();
            let picked = capture_single_key(&mut FakeInterceptor::default(), &stream, &cancel)
                .unwrap()
                .unwrap();

            let mut config = Config::default();
            config.set_stop_key(&picked.key);
            config.save_to(&path).unwrap();
            assert_eq!(
                Config::load_from(&path).unwrap().stop_key,
                name,
                "key code {:#x}",
                code
            );
        }
    }

    #[test]
    fn test_track_modifiers() {
        let mut mods = Modifiers::default();
        track_modifier(&mut mods, Key::KEY_LEFTCTRL, true);
        track_modifier(&mut mods, Key::KEY_RIGHTALT, true);
        track_modifier(&mut mods, Key::KEY_A, true);
        assert_eq!(mods, Modifiers::ctrl().with_alt());

        track_modifier(&mut mods, Key::KEY_LEFTCTRL, false);
        assert_eq!(mods, Modifiers::alt());
    }
}
