//! Platform-agnostic keyboard interception and the loops that drive a session.

use crate::event::KeyEvent;
use crate::interceptor::{InputInterceptor, InterceptHandle};
use crate::recorder::{KeyRecorder, Step};
use crate::session::CaptureSession;
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

/// How often the driving loops wake up to check for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Access to the system keyboards, not yet reading.
pub struct KeyboardInterceptor {
    #[cfg(target_os = "linux")]
    inner: crate::linux::KeyboardInterceptor,
    #[cfg(target_os = "macos")]
    inner: crate::macos::KeyboardInterceptor,
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    inner: (),
}

impl KeyboardInterceptor {
    /// Find the keyboards to intercept.
    #[cfg(target_os = "linux")]
    pub fn open() -> Result<Self> {
        let keyboards = crate::linux::find_keyboards()?;
        Ok(Self {
            inner: crate::linux::KeyboardInterceptor::new(keyboards),
        })
    }

    /// Prepare the event tap.
    #[cfg(target_os = "macos")]
    pub fn open() -> Result<Self> {
        Ok(Self {
            inner: crate::macos::KeyboardInterceptor::new(),
        })
    }

    /// Open the keyboards (unsupported platform stub).
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    pub fn open() -> Result<Self> {
        anyhow::bail!("Keyboard interception is not supported on this platform")
    }

    /// Start reading key-downs in a background thread.
    ///
    /// Returns the [`KeyboardGate`] a capture session installs itself through
    /// and the [`KeyStream`] the events arrive on. The background thread stops
    /// when the stream is dropped.
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    pub fn start(self) -> Result<(KeyboardGate, KeyStream)> {
        let running = Arc::new(AtomicBool::new(true));
        let (gate, rx) = self.inner.start(Arc::clone(&running))?;
        Ok((KeyboardGate { inner: gate }, KeyStream { running, rx }))
    }

    /// Start reading (unsupported platform stub).
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    pub fn start(self) -> Result<(KeyboardGate, KeyStream)> {
        let _ = self.inner;
        anyhow::bail!("Keyboard interception is not supported on this platform")
    }
}

/// Installs and removes exclusive keyboard interception.
///
/// On Linux installing grabs every keyboard device so no other program sees
/// key events; on macOS the event tap starts swallowing key-downs.
pub struct KeyboardGate {
    #[cfg(target_os = "linux")]
    inner: crate::linux::Gate,
    #[cfg(target_os = "macos")]
    inner: crate::macos::Gate,
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    inner: (),
}

impl InputInterceptor for KeyboardGate {
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    fn install(&mut self) -> Result<InterceptHandle> {
        self.inner.install()
    }

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    fn uninstall(&mut self, handle: InterceptHandle) -> Result<()> {
        self.inner.uninstall(handle)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    fn install(&mut self) -> Result<InterceptHandle> {
        let _ = self.inner;
        anyhow::bail!("Keyboard interception is not supported on this platform")
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    fn uninstall(&mut self, _handle: InterceptHandle) -> Result<()> {
        Ok(())
    }
}

/// Receives key-downs from the background reader.
///
/// The reader thread stops automatically when this stream is dropped.
pub struct KeyStream {
    running: Arc<AtomicBool>,
    rx: Receiver<KeyEvent>,
}

impl KeyStream {
    /// Build a stream over an existing channel.
    pub fn from_receiver(rx: Receiver<KeyEvent>) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            rx,
        }
    }

    /// Block until the next key-down.
    pub fn recv(&self) -> Result<KeyEvent, RecvError> {
        self.rx.recv()
    }

    /// Wait for the next key-down with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<KeyEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// Try to receive a key-down without blocking.
    pub fn try_recv(&self) -> Result<KeyEvent, TryRecvError> {
        self.rx.try_recv()
    }

    /// Check if the reader is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Manually stop the reader.
    ///
    /// This is called automatically when the stream is dropped.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Wait for the next event, giving up early if `cancel` gets set.
    fn next_event(&self, cancel: &AtomicBool) -> Result<Option<KeyEvent>> {
        loop {
            if cancel.load(Ordering::SeqCst) {
                return Ok(None);
            }
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(event) => return Ok(Some(event)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("Keyboard reader stopped unexpectedly"))
                }
            }
        }
    }
}

impl Drop for KeyStream {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Route key-downs from `stream` into `session` until it goes idle.
///
/// Setting `cancel` tears the session down without committing. If the reader
/// dies the session is torn down the same way and an error is returned.
pub fn pump<I: InputInterceptor>(
    session: &mut CaptureSession<I>,
    stream: &KeyStream,
    cancel: &AtomicBool,
) -> Result<()> {
    while session.is_capturing() {
        match stream.next_event(cancel) {
            Ok(Some(event)) => {
                session.on_key_event(&event);
            }
            Ok(None) => {
                log::info!("Capture cancelled");
                session.shutdown();
            }
            Err(e) => {
                session.shutdown();
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Wait for exactly one non-modifier key while holding the keyboard and
/// return it. Bare modifiers are swallowed; any other key, including the
/// current stop key, ends the wait.
///
/// Returns `Ok(None)` if `cancel` gets set first.
pub fn capture_single_key<I: InputInterceptor>(
    interceptor: &mut I,
    stream: &KeyStream,
    cancel: &AtomicBool,
) -> Result<Option<KeyEvent>> {
    let handle = interceptor.install()?;
    let mut recorder = KeyRecorder::single();

    let outcome = loop {
        match stream.next_event(cancel) {
            Ok(Some(event)) => match recorder.feed(&event) {
                Step::Commit => break Ok(recorder.last_event().cloned()),
                Step::Swallowed | Step::Recorded(_) => continue,
            },
            Ok(None) => break Ok(None),
            Err(e) => break Err(e),
        }
    };

    if let Err(e) = interceptor.uninstall(handle) {
        log::warn!("Failed to uninstall keyboard interception: {:#}", e);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combo::Modifiers;
    use crate::session::tests::{session, sink, Entry, FakeInterceptor};
    use std::sync::mpsc;

    #[test]
    fn test_pump_runs_until_stop_key() {
        let (tx, rx) = mpsc::channel();
        let stream = KeyStream::from_receiver(rx);
        let (mut session, journal) = session();
        session.start(sink(&journal)).unwrap();

        tx.send(KeyEvent::with_modifiers("h", Modifiers::ctrl().with_alt()))
            .unwrap();
        tx.send(KeyEvent::new("Escape")).unwrap();
        tx.send(KeyEvent::new("left-over")).unwrap();

        pump(&mut session, &stream, &AtomicBool::new(false)).unwrap();

        assert!(!session.is_capturing());
        assert!(journal
            .borrow()
            .contains(&Entry::Deliver("Ctrl+Alt+H".to_string())));
        assert_eq!(stream.try_recv().unwrap().key, "left-over");
    }

    #[test]
    fn test_pump_waits_for_late_events() {
        let (tx, rx) = mpsc::channel();
        let stream = KeyStream::from_receiver(rx);
        let (mut session, journal) = session();
        session.start(sink(&journal)).unwrap();

        let sender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            tx.send(KeyEvent::new("y")).unwrap();
            tx.send(KeyEvent::new("Escape")).unwrap();
        });

        pump(&mut session, &stream, &AtomicBool::new(false)).unwrap();
        sender.join().unwrap();

        assert!(journal.borrow().contains(&Entry::Deliver("Y".to_string())));
    }

    #[test]
    fn test_pump_cancel_discards() {
        let (_tx, rx) = mpsc::channel::<KeyEvent>();
        let stream = KeyStream::from_receiver(rx);
        let (mut session, journal) = session();
        session.start(sink(&journal)).unwrap();

        pump(&mut session, &stream, &AtomicBool::new(true)).unwrap();

        assert!(!session.is_capturing());
        assert_eq!(session.interceptor().active, None);
        assert!(!journal
            .borrow()
            .iter()
            .any(|e| matches!(e, Entry::Deliver(_))));
    }

    #[test]
    fn test_pump_reader_gone_tears_down() {
        let (tx, rx) = mpsc::channel::<KeyEvent>();
        drop(tx);
        let stream = KeyStream::from_receiver(rx);
        let (mut session, journal) = session();
        session.start(sink(&journal)).unwrap();

        assert!(pump(&mut session, &stream, &AtomicBool::new(false)).is_err());
        assert!(!session.is_capturing());
        assert_eq!(session.interceptor().active, None);
    }

    #[test]
    fn test_single_key_skips_modifiers() {
        let (tx, rx) = mpsc::channel();
        let stream = KeyStream::from_receiver(rx);
        let mut interceptor = FakeInterceptor::default();
        let sender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            tx.send(KeyEvent::with_modifiers("Shift", Modifiers::shift()))
                .unwrap();
            tx.send(KeyEvent::new("F9")).unwrap();
            tx.send(KeyEvent::new("q")).unwrap();
        });

        let key = capture_single_key(&mut interceptor, &stream, &AtomicBool::new(false))
            .unwrap()
            .unwrap();
        sender.join().unwrap();

        assert_eq!(key.key, "F9");
        assert_eq!(interceptor.active, None);
        assert_eq!(
            *interceptor.journal.borrow(),
            vec![Entry::Install(1), Entry::Uninstall(1)]
        );
    }

    #[test]
    fn test_single_key_cancel_uninstalls() {
        let (_tx, rx) = mpsc::channel::<KeyEvent>();
        let stream = KeyStream::from_receiver(rx);
        let mut interceptor = FakeInterceptor::default();

        let key = capture_single_key(&mut interceptor, &stream, &AtomicBool::new(true)).unwrap();

        assert!(key.is_none());
        assert_eq!(interceptor.active, None);
    }

    #[test]
    fn test_stream_stop_flag() {
        let (_tx, rx) = mpsc::channel::<KeyEvent>();
        let stream = KeyStream::from_receiver(rx);
        assert!(stream.is_running());
        stream.stop();
        assert!(!stream.is_running());
    }
}
